use bitflags::bitflags;

/// INA226 register addresses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    Configuration = 0x00,
    ShuntVoltage = 0x01,
    BusVoltage = 0x02,
    Power = 0x03,
    Current = 0x04,
    Calibration = 0x05,
    MaskEnable = 0x06,
    AlertLimit = 0x07,
    ManufacturerId = 0xFE,
    DieId = 0xFF,
}

impl Register {
    pub const fn addr(self) -> u8 {
        self as u8
    }
}

/// Writing this to the configuration register resets every register to its power-up value.
pub const RESET_COMMAND: u16 = 0x8000;

/// Configuration register contents after power-up or reset.
pub const DEFAULT_CONFIGURATION: u16 = 0x4127;

pub const MANUFACTURER_ID: u16 = 0x5449;
pub const DIE_ID: u16 = 0x2260;

/// 1.25 mV per count, expressed as 125 / 100 mV.
pub const BUS_VOLTAGE_LSB_CENTI_MV: u32 = 125;
/// 2.5 µV per count, expressed as 25 / 10 µV.
pub const SHUNT_VOLTAGE_LSB_DECI_UV: i32 = 25;

bitflags! {
    /// Mask/Enable register bits.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct MaskEnable: u16 {
        const SHUNT_OVER_VOLTAGE = 1 << 15;
        const SHUNT_UNDER_VOLTAGE = 1 << 14;
        const BUS_OVER_VOLTAGE = 1 << 13;
        const BUS_UNDER_VOLTAGE = 1 << 12;
        const POWER_OVER_LIMIT = 1 << 11;
        /// Route the conversion-ready signal to the alert pin.
        const CONVERSION_READY_ALERT = 1 << 10;
        const ALERT_FUNCTION_FLAG = 1 << 4;
        /// Set once all conversions, averaging and multiplications are complete.
        /// Cleared by reading this register or writing the configuration register.
        const CONVERSION_READY_FLAG = 1 << 3;
        const MATH_OVERFLOW_FLAG = 1 << 2;
        const ALERT_POLARITY = 1 << 1;
        const ALERT_LATCH_ENABLE = 1 << 0;
    }
}

impl MaskEnable {
    /// Read-only status bits, never written back.
    pub const STATUS_FLAGS: MaskEnable = MaskEnable::ALERT_FUNCTION_FLAG
        .union(MaskEnable::CONVERSION_READY_FLAG)
        .union(MaskEnable::MATH_OVERFLOW_FLAG);

    pub fn conversion_ready(self) -> bool {
        self.contains(MaskEnable::CONVERSION_READY_FLAG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_map_matches_hardware() {
        assert_eq!(Register::Configuration.addr(), 0x00);
        assert_eq!(Register::ShuntVoltage.addr(), 0x01);
        assert_eq!(Register::BusVoltage.addr(), 0x02);
        assert_eq!(Register::Power.addr(), 0x03);
        assert_eq!(Register::Current.addr(), 0x04);
        assert_eq!(Register::Calibration.addr(), 0x05);
        assert_eq!(Register::MaskEnable.addr(), 0x06);
    }

    #[test]
    fn conversion_ready_is_bit_three() {
        assert!(MaskEnable::from_bits_retain(0x0008).conversion_ready());
        assert!(!MaskEnable::from_bits_retain(0x0400).conversion_ready());
        assert!(MaskEnable::from_bits_retain(0xFFFF).conversion_ready());
    }
}
