//! Configuration register codec.
//!
//! ```text
//!  15  | 14..12   | 11..9 | 8..6   | 5..3     | 2..0
//! RST  | reserved | AVG   | VBUSCT | VSHCT    | MODE
//! ```

use crate::register::DEFAULT_CONFIGURATION;

const AVG_SHIFT: u16 = 9;
const BUS_TIME_SHIFT: u16 = 6;
const SHUNT_TIME_SHIFT: u16 = 3;
const FIELD_MASK: u16 = 0b111;
const RESERVED_MASK: u16 = 0x7000;

/// Number of samples averaged per reported value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Averaging {
    Avg1 = 0,
    Avg4 = 1,
    Avg16 = 2,
    Avg64 = 3,
    Avg128 = 4,
    Avg256 = 5,
    Avg512 = 6,
    Avg1024 = 7,
}

impl Averaging {
    const ALL: [Averaging; 8] = [
        Averaging::Avg1,
        Averaging::Avg4,
        Averaging::Avg16,
        Averaging::Avg64,
        Averaging::Avg128,
        Averaging::Avg256,
        Averaging::Avg512,
        Averaging::Avg1024,
    ];

    /// The largest supported count not above `count`. `None` for 0.
    pub fn from_count(count: u16) -> Option<Self> {
        Self::ALL.iter().rev().copied().find(|a| a.count() <= count)
    }

    pub const fn count(self) -> u16 {
        match self {
            Averaging::Avg1 => 1,
            Averaging::Avg4 => 4,
            Averaging::Avg16 => 16,
            Averaging::Avg64 => 64,
            Averaging::Avg128 => 128,
            Averaging::Avg256 => 256,
            Averaging::Avg512 => 512,
            Averaging::Avg1024 => 1024,
        }
    }

    fn from_selector(bits: u16) -> Self {
        Self::ALL[(bits & FIELD_MASK) as usize]
    }
}

/// Per-channel ADC conversion time.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConversionTime {
    Us140 = 0,
    Us204 = 1,
    Us332 = 2,
    Us588 = 3,
    Us1100 = 4,
    Us2116 = 5,
    Us4156 = 6,
    Us8244 = 7,
}

impl ConversionTime {
    const ALL: [ConversionTime; 8] = [
        ConversionTime::Us140,
        ConversionTime::Us204,
        ConversionTime::Us332,
        ConversionTime::Us588,
        ConversionTime::Us1100,
        ConversionTime::Us2116,
        ConversionTime::Us4156,
        ConversionTime::Us8244,
    ];

    /// The longest supported time not above `us`. `None` below 140 µs.
    pub fn from_micros(us: u32) -> Option<Self> {
        Self::ALL.iter().rev().copied().find(|t| t.micros() <= us)
    }

    pub const fn micros(self) -> u32 {
        match self {
            ConversionTime::Us140 => 140,
            ConversionTime::Us204 => 204,
            ConversionTime::Us332 => 332,
            ConversionTime::Us588 => 588,
            ConversionTime::Us1100 => 1100,
            ConversionTime::Us2116 => 2116,
            ConversionTime::Us4156 => 4156,
            ConversionTime::Us8244 => 8244,
        }
    }

    fn from_selector(bits: u16) -> Self {
        Self::ALL[(bits & FIELD_MASK) as usize]
    }
}

/// Operating mode.
///
/// Triggered modes perform one conversion per configuration write, continuous
/// modes free-run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    PowerDown,
    TriggeredShunt,
    TriggeredBus,
    TriggeredBoth,
    ContinuousShunt,
    ContinuousBus,
    ContinuousBoth,
}

impl Mode {
    pub const fn selector(self) -> u16 {
        match self {
            Mode::TriggeredShunt => 0b001,
            Mode::TriggeredBus => 0b010,
            Mode::TriggeredBoth => 0b011,
            Mode::PowerDown => 0b100,
            Mode::ContinuousShunt => 0b101,
            Mode::ContinuousBus => 0b110,
            Mode::ContinuousBoth => 0b111,
        }
    }

    /// 0b000 and 0b100 both select power-down.
    pub fn from_selector(bits: u16) -> Self {
        match bits & FIELD_MASK {
            0b001 => Mode::TriggeredShunt,
            0b010 => Mode::TriggeredBus,
            0b011 => Mode::TriggeredBoth,
            0b101 => Mode::ContinuousShunt,
            0b110 => Mode::ContinuousBus,
            0b111 => Mode::ContinuousBoth,
            _ => Mode::PowerDown,
        }
    }

    pub fn is_triggered(self) -> bool {
        matches!(
            self,
            Mode::TriggeredShunt | Mode::TriggeredBus | Mode::TriggeredBoth
        )
    }

    pub fn is_continuous(self) -> bool {
        matches!(
            self,
            Mode::ContinuousShunt | Mode::ContinuousBus | Mode::ContinuousBoth
        )
    }

    pub fn samples_bus(self) -> bool {
        matches!(
            self,
            Mode::TriggeredBus | Mode::TriggeredBoth | Mode::ContinuousBus | Mode::ContinuousBoth
        )
    }

    pub fn samples_shunt(self) -> bool {
        matches!(
            self,
            Mode::TriggeredShunt
                | Mode::TriggeredBoth
                | Mode::ContinuousShunt
                | Mode::ContinuousBoth
        )
    }
}

/// Decoded configuration register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Configuration {
    pub averaging: Averaging,
    pub bus_conversion_time: ConversionTime,
    pub shunt_conversion_time: ConversionTime,
    pub mode: Mode,
    reserved: u16,
    /// Power-down selector as read from the device, 0b000 or 0b100.
    power_down_selector: u16,
}

impl Configuration {
    /// Decodes a raw register value. The reset bit is dropped.
    pub fn from_bits(bits: u16) -> Self {
        Self {
            averaging: Averaging::from_selector(bits >> AVG_SHIFT),
            bus_conversion_time: ConversionTime::from_selector(bits >> BUS_TIME_SHIFT),
            shunt_conversion_time: ConversionTime::from_selector(bits >> SHUNT_TIME_SHIFT),
            mode: Mode::from_selector(bits),
            reserved: bits & RESERVED_MASK,
            power_down_selector: match bits & FIELD_MASK {
                0b000 => 0b000,
                _ => Mode::PowerDown.selector(),
            },
        }
    }

    pub fn bits(&self) -> u16 {
        self.reserved
            | (self.averaging as u16) << AVG_SHIFT
            | (self.bus_conversion_time as u16) << BUS_TIME_SHIFT
            | (self.shunt_conversion_time as u16) << SHUNT_TIME_SHIFT
            | self.mode_selector()
    }

    fn mode_selector(&self) -> u16 {
        match self.mode {
            Mode::PowerDown => self.power_down_selector,
            mode => mode.selector(),
        }
    }

    /// Nominal duration of one complete, averaged conversion in the current mode.
    pub fn conversion_period_us(&self) -> u32 {
        let mut per_sample = 0;
        if self.mode.samples_bus() {
            per_sample += self.bus_conversion_time.micros();
        }
        if self.mode.samples_shunt() {
            per_sample += self.shunt_conversion_time.micros();
        }
        per_sample * self.averaging.count() as u32
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::from_bits(DEFAULT_CONFIGURATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_decodes_to_power_up_settings() {
        let config = Configuration::default();
        assert_eq!(config.averaging, Averaging::Avg1);
        assert_eq!(config.bus_conversion_time, ConversionTime::Us1100);
        assert_eq!(config.shunt_conversion_time, ConversionTime::Us1100);
        assert_eq!(config.mode, Mode::ContinuousBoth);
        assert_eq!(config.bits(), 0x4127);
    }

    #[test]
    fn averaging_rounds_down() {
        assert_eq!(Averaging::from_count(0), None);
        assert_eq!(Averaging::from_count(1), Some(Averaging::Avg1));
        assert_eq!(Averaging::from_count(3), Some(Averaging::Avg1));
        assert_eq!(Averaging::from_count(100), Some(Averaging::Avg64));
        assert_eq!(Averaging::from_count(128), Some(Averaging::Avg128));
        assert_eq!(Averaging::from_count(u16::MAX), Some(Averaging::Avg1024));
    }

    #[test]
    fn conversion_time_rounds_down() {
        assert_eq!(ConversionTime::from_micros(139), None);
        assert_eq!(ConversionTime::from_micros(140), Some(ConversionTime::Us140));
        assert_eq!(ConversionTime::from_micros(1000), Some(ConversionTime::Us588));
        assert_eq!(ConversionTime::from_micros(2116), Some(ConversionTime::Us2116));
        assert_eq!(ConversionTime::from_micros(100_000), Some(ConversionTime::Us8244));
    }

    #[test]
    fn fields_do_not_overlap() {
        let mut config = Configuration::default();
        config.averaging = Averaging::Avg1024;
        assert_eq!(config.bits(), 0x4F27);

        config.bus_conversion_time = ConversionTime::Us140;
        assert_eq!(config.bits(), 0x4E27);

        config.shunt_conversion_time = ConversionTime::Us8244;
        assert_eq!(config.bits(), 0x4E3F);

        config.mode = Mode::TriggeredBus;
        assert_eq!(config.bits(), 0x4E3A);

        let decoded = Configuration::from_bits(config.bits());
        assert_eq!(decoded, config);
    }

    #[test]
    fn reset_bit_is_dropped() {
        let config = Configuration::from_bits(0x8000 | 0x4127);
        assert_eq!(config.bits(), 0x4127);
    }

    #[test]
    fn both_power_down_encodings_decode() {
        assert_eq!(Mode::from_selector(0b000), Mode::PowerDown);
        assert_eq!(Mode::from_selector(0b100), Mode::PowerDown);
        assert_eq!(Mode::PowerDown.selector(), 0b100);
    }

    #[test]
    fn power_down_selector_survives_other_field_changes() {
        let mut config = Configuration::from_bits(0x4120);
        assert_eq!(config.mode, Mode::PowerDown);
        config.averaging = Averaging::Avg4;
        assert_eq!(config.bits(), 0x4320);

        let mut config = Configuration::from_bits(0x4124);
        config.averaging = Averaging::Avg4;
        assert_eq!(config.bits(), 0x4324);

        let mut config = Configuration::default();
        config.mode = Mode::PowerDown;
        assert_eq!(config.bits(), 0x4124);
    }

    #[test]
    fn conversion_period_follows_enabled_channels() {
        let mut config = Configuration::default();
        assert_eq!(config.conversion_period_us(), 2200);

        config.mode = Mode::TriggeredShunt;
        config.averaging = Averaging::Avg16;
        config.shunt_conversion_time = ConversionTime::Us140;
        assert_eq!(config.conversion_period_us(), 16 * 140);

        config.mode = Mode::PowerDown;
        assert_eq!(config.conversion_period_us(), 0);
    }
}
