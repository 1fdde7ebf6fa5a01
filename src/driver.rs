use crate::calibration::{Calibration, CalibrationError};
use crate::config::{Averaging, Configuration, ConversionTime, Mode};
use crate::register::{
    MaskEnable, Register, BUS_VOLTAGE_LSB_CENTI_MV, DEFAULT_CONFIGURATION, RESET_COMMAND,
    SHUNT_VOLTAGE_LSB_DECI_UV,
};
use core::ops::RangeInclusive;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

/// Addresses selectable with the A0/A1 strap pins.
pub const ADDRESS_RANGE: RangeInclusive<u8> = 0x40..=0x4F;

const RESET_DELAY_MS: u32 = 10;
const POLL_INTERVAL_US: u32 = 100;
const TIMEOUT_MARGIN_US: u32 = 1_000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum INA226Error<I2C> {
    /// The bus transaction failed, usually because nothing acknowledged.
    DeviceUnreachable(I2C),
    InvalidParameter,
    /// The requested calibration does not fit the calibration register.
    OutOfRange,
    /// Current or power requested before `initialize`, or after `reset`.
    NotInitialized,
    ConversionTimeout,
    /// A device answered but does not report the INA226 power-up configuration.
    Connect,
}

impl<I2C> From<CalibrationError> for INA226Error<I2C> {
    fn from(err: CalibrationError) -> Self {
        match err {
            CalibrationError::InvalidParameter => INA226Error::InvalidParameter,
            CalibrationError::OutOfRange => INA226Error::OutOfRange,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct INA226InitConfig {
    /// Largest expected bus current, in amps
    pub max_expected_current: f32,
    /// Shunt resistance, in ohms
    pub shunt_resistance: f32,
    pub averaging: Averaging,
    pub bus_conversion_time: ConversionTime,
    pub shunt_conversion_time: ConversionTime,
    pub mode: Mode,
    /// Drive the alert pin when a conversion completes
    pub alert_on_conversion: bool,
}

impl INA226InitConfig {
    /// Calibration for the given shunt, all other settings at their power-up values.
    pub fn new(max_expected_current: f32, shunt_resistance: f32) -> Self {
        let defaults = Configuration::default();
        Self {
            max_expected_current,
            shunt_resistance,
            averaging: defaults.averaging,
            bus_conversion_time: defaults.bus_conversion_time,
            shunt_conversion_time: defaults.shunt_conversion_time,
            mode: defaults.mode,
            alert_on_conversion: false,
        }
    }
}

/// Resets whatever answers at `address` and checks it comes back with the INA226
/// power-up configuration.
pub fn probe_address<I2C, Delay>(
    i2c: &mut I2C,
    delay: &mut Delay,
    address: u8,
) -> Result<bool, INA226Error<I2C::Error>>
where
    I2C: I2c,
    Delay: DelayNs,
{
    write_word_at(i2c, address, Register::Configuration, RESET_COMMAND)?;
    delay.delay_ms(RESET_DELAY_MS);
    Ok(read_word_at(i2c, address, Register::Configuration)? == DEFAULT_CONFIGURATION)
}

/// Returns the first address in [`ADDRESS_RANGE`] that probes as an INA226.
///
/// Every device that acknowledges in that range receives a reset command.
pub fn discover_address<I2C, Delay>(
    i2c: &mut I2C,
    delay: &mut Delay,
) -> Result<u8, INA226Error<I2C::Error>>
where
    I2C: I2c,
    Delay: DelayNs,
{
    for address in ADDRESS_RANGE {
        match probe_address(i2c, delay, address) {
            Ok(true) => {
                debug!("INA226 found at address {}", address);
                return Ok(address);
            }
            Ok(false) | Err(INA226Error::DeviceUnreachable(_)) => continue,
            Err(err) => return Err(err),
        }
    }

    Err(INA226Error::Connect)
}

fn write_word_at<I2C: I2c>(
    i2c: &mut I2C,
    address: u8,
    register: Register,
    data: u16,
) -> Result<(), INA226Error<I2C::Error>> {
    let [hi, lo] = data.to_be_bytes();
    i2c.write(address, &[register.addr(), hi, lo])
        .map_err(INA226Error::DeviceUnreachable)
}

fn read_word_at<I2C: I2c>(
    i2c: &mut I2C,
    address: u8,
    register: Register,
) -> Result<u16, INA226Error<I2C::Error>> {
    let mut read_buffer = [0u8; 2];
    i2c.write_read(address, &[register.addr()], &mut read_buffer)
        .map_err(INA226Error::DeviceUnreachable)?;

    Ok(u16::from_be_bytes(read_buffer))
}

/// A session with one INA226. Owns the bus handle; register read-modify-write
/// sequences are not atomic, so the bus must not be shared without external locking.
pub struct INA226Driver<I2C, Delay> {
    i2c: I2C,
    delay: Delay,
    address: u8,
    calibration: Option<Calibration>,
    configuration: Configuration,
    conversion_timeout_us: Option<u32>,
    retrigger_after_read: bool,
}

impl<I2C, Delay> INA226Driver<I2C, Delay>
where
    I2C: I2c,
    Delay: DelayNs,
{
    ///
    ///
    /// # Arguments
    ///
    /// * `i2c`: The i2c bus.
    /// * `delay`: Used for the post-reset wait and conversion polling.
    /// * `address`: 7-bit device address.
    /// * `init_config`: If provided, the device is reset, verified, calibrated and
    /// configured. Otherwise no bus access happens and `initialize` must be called
    /// before reading current or power.
    ///
    /// returns: Result<INA226Driver<I2C, Delay>, INA226Error<<I2C as ErrorType>::Error>>
    pub fn new(
        i2c: I2C,
        delay: Delay,
        address: u8,
        init_config: Option<INA226InitConfig>,
    ) -> Result<Self, INA226Error<I2C::Error>> {
        let mut driver = Self {
            i2c,
            delay,
            address,
            calibration: None,
            configuration: Configuration::default(),
            conversion_timeout_us: None,
            retrigger_after_read: false,
        };

        if let Some(config) = init_config {
            let calibration =
                Calibration::new(config.max_expected_current, config.shunt_resistance)?;

            driver.reset()?;

            if driver.read_word(Register::Configuration)? != DEFAULT_CONFIGURATION {
                return Err(INA226Error::Connect);
            }

            driver.apply_calibration(calibration)?;

            let mut configuration = Configuration::default();
            configuration.averaging = config.averaging;
            configuration.bus_conversion_time = config.bus_conversion_time;
            configuration.shunt_conversion_time = config.shunt_conversion_time;
            configuration.mode = config.mode;
            driver.write_configuration(configuration)?;

            if config.alert_on_conversion {
                driver.set_alert_pin_on_conversion(true)?;
            }
        }

        Ok(driver)
    }

    /// Scans [`ADDRESS_RANGE`] for the device, then behaves like [`Self::new`].
    pub fn discover(
        mut i2c: I2C,
        mut delay: Delay,
        init_config: Option<INA226InitConfig>,
    ) -> Result<Self, INA226Error<I2C::Error>> {
        let address = discover_address(&mut i2c, &mut delay)?;
        Self::new(i2c, delay, address, init_config)
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Gives back the bus and delay.
    pub fn release(self) -> (I2C, Delay) {
        (self.i2c, self.delay)
    }

    /// Computes and writes the calibration register for the given shunt.
    ///
    /// Inputs are validated before any bus access. The stored scaling factors only
    /// change once the calibration register write has succeeded.
    pub fn initialize(
        &mut self,
        max_expected_current: f32,
        shunt_resistance: f32,
    ) -> Result<Calibration, INA226Error<I2C::Error>> {
        let calibration = Calibration::new(max_expected_current, shunt_resistance)?;
        self.apply_calibration(calibration)?;
        Ok(calibration)
    }

    fn apply_calibration(&mut self, calibration: Calibration) -> Result<(), INA226Error<I2C::Error>> {
        self.write_word(Register::Calibration, calibration.register)?;

        debug!(
            "INA226 calibration {} (current LSB {} A)",
            calibration.register, calibration.current_lsb
        );
        self.calibration = Some(calibration);
        Ok(())
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Amps per count of the current register.
    pub fn current_lsb(&self) -> Result<f32, INA226Error<I2C::Error>> {
        Ok(self.calibrated()?.current_lsb)
    }

    /// Watts per count of the power register.
    pub fn power_lsb(&self) -> Result<f32, INA226Error<I2C::Error>> {
        Ok(self.calibrated()?.power_lsb)
    }

    fn calibrated(&self) -> Result<&Calibration, INA226Error<I2C::Error>> {
        self.calibration.as_ref().ok_or(INA226Error::NotInitialized)
    }

    /// Last configuration written to or read from the device.
    pub fn configuration(&self) -> Configuration {
        self.configuration
    }

    pub fn mode(&self) -> Mode {
        self.configuration.mode
    }

    /// Reads the configuration register and refreshes the cached copy.
    pub fn read_configuration(&mut self) -> Result<Configuration, INA226Error<I2C::Error>> {
        let configuration = Configuration::from_bits(self.read_word(Register::Configuration)?);
        self.configuration = configuration;
        Ok(configuration)
    }

    /// Writes all configuration fields at once. In a triggered mode this starts a conversion.
    pub fn write_configuration(
        &mut self,
        configuration: Configuration,
    ) -> Result<(), INA226Error<I2C::Error>> {
        self.write_word(Register::Configuration, configuration.bits())?;
        self.configuration = configuration;
        Ok(())
    }

    /// Read-modify-write of the configuration register. Fields `f` leaves alone keep
    /// the value the device reported.
    pub fn modify_configuration<F>(&mut self, f: F) -> Result<Configuration, INA226Error<I2C::Error>>
    where
        F: FnOnce(&mut Configuration),
    {
        let mut configuration =
            Configuration::from_bits(self.read_word(Register::Configuration)?);
        f(&mut configuration);
        self.write_configuration(configuration)?;
        Ok(configuration)
    }

    /// Selects the largest supported averaging count not above `count`.
    pub fn set_averaging(&mut self, count: u16) -> Result<Averaging, INA226Error<I2C::Error>> {
        let averaging = Averaging::from_count(count).ok_or(INA226Error::InvalidParameter)?;
        self.modify_configuration(|c| c.averaging = averaging)?;
        Ok(averaging)
    }

    pub fn set_default_averaging(&mut self) -> Result<(), INA226Error<I2C::Error>> {
        let averaging = Configuration::default().averaging;
        self.modify_configuration(|c| c.averaging = averaging)?;
        Ok(())
    }

    /// Selects the longest supported bus conversion time not above `micros`.
    pub fn set_bus_conversion_time(
        &mut self,
        micros: u32,
    ) -> Result<ConversionTime, INA226Error<I2C::Error>> {
        let time = ConversionTime::from_micros(micros).ok_or(INA226Error::InvalidParameter)?;
        self.modify_configuration(|c| c.bus_conversion_time = time)?;
        Ok(time)
    }

    pub fn set_default_bus_conversion_time(&mut self) -> Result<(), INA226Error<I2C::Error>> {
        let time = Configuration::default().bus_conversion_time;
        self.modify_configuration(|c| c.bus_conversion_time = time)?;
        Ok(())
    }

    /// Selects the longest supported shunt conversion time not above `micros`.
    pub fn set_shunt_conversion_time(
        &mut self,
        micros: u32,
    ) -> Result<ConversionTime, INA226Error<I2C::Error>> {
        let time = ConversionTime::from_micros(micros).ok_or(INA226Error::InvalidParameter)?;
        self.modify_configuration(|c| c.shunt_conversion_time = time)?;
        Ok(time)
    }

    pub fn set_default_shunt_conversion_time(&mut self) -> Result<(), INA226Error<I2C::Error>> {
        let time = Configuration::default().shunt_conversion_time;
        self.modify_configuration(|c| c.shunt_conversion_time = time)?;
        Ok(())
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), INA226Error<I2C::Error>> {
        self.modify_configuration(|c| c.mode = mode)?;
        Ok(())
    }

    /// Starts the next conversion in a triggered mode by rewriting the configuration.
    pub fn trigger(&mut self) -> Result<(), INA226Error<I2C::Error>> {
        self.modify_configuration(|_| {})?;
        Ok(())
    }

    /// When enabled, reading a voltage the triggered mode samples starts the next conversion.
    pub fn set_retrigger_after_read(&mut self, enabled: bool) {
        self.retrigger_after_read = enabled;
    }

    /// Resets every register to its power-up value. The calibration register is cleared
    /// by the device, so current and power are unavailable until `initialize` runs again.
    pub fn reset(&mut self) -> Result<(), INA226Error<I2C::Error>> {
        self.write_word(Register::Configuration, RESET_COMMAND)?;

        info!("INA226 at {} reset", self.address);
        self.calibration = None;
        self.configuration = Configuration::default();
        self.delay.delay_ms(RESET_DELAY_MS);
        Ok(())
    }

    pub fn mask_enable(&mut self) -> Result<MaskEnable, INA226Error<I2C::Error>> {
        Ok(MaskEnable::from_bits_retain(
            self.read_word(Register::MaskEnable)?,
        ))
    }

    pub fn set_alert_pin_on_conversion(
        &mut self,
        enabled: bool,
    ) -> Result<(), INA226Error<I2C::Error>> {
        let mut mask = self.mask_enable()?.difference(MaskEnable::STATUS_FLAGS);
        mask.set(MaskEnable::CONVERSION_READY_ALERT, enabled);
        self.write_word(Register::MaskEnable, mask.bits())
    }

    /// Overrides the bound used by [`Self::wait_for_conversion`]. `None` derives it from the
    /// cached configuration.
    pub fn set_conversion_timeout(&mut self, timeout_us: Option<u32>) {
        self.conversion_timeout_us = timeout_us;
    }

    /// Bound used by [`Self::wait_for_conversion`]: twice the nominal conversion period
    /// plus a millisecond unless overridden.
    pub fn conversion_timeout_us(&self) -> u32 {
        self.conversion_timeout_us.unwrap_or_else(|| {
            self.configuration
                .conversion_period_us()
                .saturating_mul(2)
                .saturating_add(TIMEOUT_MARGIN_US)
        })
    }

    pub fn wait_for_conversion(&mut self) -> Result<(), INA226Error<I2C::Error>> {
        let timeout_us = self.conversion_timeout_us();
        self.wait_for_conversion_within(timeout_us)
    }

    /// Polls the conversion-ready flag until it sets or `timeout_us` elapses. The flag is
    /// always checked at least once.
    pub fn wait_for_conversion_within(
        &mut self,
        timeout_us: u32,
    ) -> Result<(), INA226Error<I2C::Error>> {
        let mut waited_us = 0;
        loop {
            if self.mask_enable()?.conversion_ready() {
                return Ok(());
            }

            if waited_us >= timeout_us {
                warn!("INA226 conversion not ready after {} us", timeout_us);
                return Err(INA226Error::ConversionTimeout);
            }

            let step = POLL_INTERVAL_US.min(timeout_us - waited_us);
            self.delay.delay_us(step);
            waited_us += step;
        }
    }

    pub fn get_bus_millivolts(&mut self, wait: bool) -> Result<u32, INA226Error<I2C::Error>> {
        if wait {
            self.wait_for_conversion()?;
        }

        let raw = self.read_word(Register::BusVoltage)?;
        let millivolts = raw as u32 * BUS_VOLTAGE_LSB_CENTI_MV / 100;

        let mode = self.configuration.mode;
        if self.retrigger_after_read && mode.is_triggered() && mode.samples_bus() {
            self.trigger()?;
        }

        Ok(millivolts)
    }

    pub fn get_shunt_microvolts(&mut self, wait: bool) -> Result<i32, INA226Error<I2C::Error>> {
        if wait {
            self.wait_for_conversion()?;
        }

        let raw = self.read_word(Register::ShuntVoltage)? as i16;
        let microvolts = raw as i32 * SHUNT_VOLTAGE_LSB_DECI_UV / 10;

        let mode = self.configuration.mode;
        if self.retrigger_after_read && mode.is_triggered() && mode.samples_shunt() {
            self.trigger()?;
        }

        Ok(microvolts)
    }

    pub fn get_bus_microamps(&mut self) -> Result<i64, INA226Error<I2C::Error>> {
        let calibration = *self.calibrated()?;
        let raw = self.read_word(Register::Current)? as i16;
        Ok(calibration.current_micro_amps(raw))
    }

    pub fn get_bus_microwatts(&mut self) -> Result<u64, INA226Error<I2C::Error>> {
        let calibration = *self.calibrated()?;
        let raw = self.read_word(Register::Power)?;
        Ok(calibration.power_micro_watts(raw))
    }

    pub fn manufacturer_id(&mut self) -> Result<u16, INA226Error<I2C::Error>> {
        self.read_word(Register::ManufacturerId)
    }

    pub fn die_id(&mut self) -> Result<u16, INA226Error<I2C::Error>> {
        self.read_word(Register::DieId)
    }

    pub fn read_byte(&mut self, register: Register) -> Result<u8, INA226Error<I2C::Error>> {
        let mut read_buffer = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register.addr()], &mut read_buffer)
            .map_err(INA226Error::DeviceUnreachable)?;

        Ok(read_buffer[0])
    }

    pub fn read_word(&mut self, register: Register) -> Result<u16, INA226Error<I2C::Error>> {
        read_word_at(&mut self.i2c, self.address, register)
    }

    pub fn write_byte(
        &mut self,
        register: Register,
        data: u8,
    ) -> Result<(), INA226Error<I2C::Error>> {
        self.i2c
            .write(self.address, &[register.addr(), data])
            .map_err(INA226Error::DeviceUnreachable)
    }

    pub fn write_word(
        &mut self,
        register: Register,
        data: u16,
    ) -> Result<(), INA226Error<I2C::Error>> {
        trace!("INA226 write {} <- {}", register.addr(), data);
        write_word_at(&mut self.i2c, self.address, register, data)
    }
}

#[cfg(feature = "std")]
impl<I2C> std::fmt::Display for INA226Error<I2C>
where
    I2C: std::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            INA226Error::DeviceUnreachable(i2c) => write!(f, "I2C Error: {i2c:?}"),
            INA226Error::InvalidParameter => write!(f, "Invalid parameter"),
            INA226Error::OutOfRange => write!(f, "Calibration out of range"),
            INA226Error::NotInitialized => write!(f, "INA226 not calibrated"),
            INA226Error::ConversionTimeout => write!(f, "Timed out waiting for conversion"),
            INA226Error::Connect => write!(f, "Unable to connect to INA226"),
        }
    }
}

#[cfg(feature = "std")]
impl<I2C> std::error::Error for INA226Error<I2C>
where
    I2C: std::fmt::Debug,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
