use micromath::F32Ext;

/// Internal scaling constant from the datasheet calibration equation.
const CALIBRATION_SCALE: f32 = 0.00512;

/// Full-scale current maps onto the signed 15-bit range of the current register.
const CURRENT_LSB_DIVISOR: f32 = 32768.0;

const POWER_LSB_RATIO: f32 = 20.0;

/// f32 values at or above 2^24 have no fractional part.
const INTEGRAL_THRESHOLD: f32 = 16_777_216.0;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationError {
    /// Current or shunt resistance is zero, negative, or not finite.
    InvalidParameter,
    /// The calibration value does not fit the 16-bit register, or full-scale
    /// readings would not fit the measurement result types.
    OutOfRange,
}

/// Calibration register value and the scaling factors derived with it.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    /// Value for the calibration register.
    pub register: u16,
    /// Amps per count of the current register.
    pub current_lsb: f32,
    /// Watts per count of the power register.
    pub power_lsb: f32,
}

impl Calibration {
    /// Derives the calibration register and scaling factors for a shunt.
    ///
    /// # Arguments
    ///
    /// * `max_expected_current`: Largest current to be measured, in amps.
    /// * `shunt_resistance`: Shunt resistor value, in ohms.
    ///
    /// returns: Result<Calibration, CalibrationError>
    pub fn new(max_expected_current: f32, shunt_resistance: f32) -> Result<Self, CalibrationError> {
        if !is_positive(max_expected_current) || !is_positive(shunt_resistance) {
            return Err(CalibrationError::InvalidParameter);
        }

        let current_lsb = max_expected_current / CURRENT_LSB_DIVISOR;
        let power_lsb = POWER_LSB_RATIO * current_lsb;
        let register = register_value(CALIBRATION_SCALE / (current_lsb * shunt_resistance))?;

        if u16::MAX as f32 * power_lsb * 1_000_000.0 >= u64::MAX as f32 {
            return Err(CalibrationError::OutOfRange);
        }

        Ok(Self {
            register,
            current_lsb,
            power_lsb,
        })
    }

    /// Current register reading in µA.
    pub fn current_micro_amps(&self, raw: i16) -> i64 {
        let micro_amps = round_half_away(raw as f32 * self.current_lsb * 1_000_000.0);
        micro_amps as i64
    }

    /// Power register reading in µW.
    pub fn power_micro_watts(&self, raw: u16) -> u64 {
        let micro_watts = round_half_away(raw as f32 * self.power_lsb * 1_000_000.0);
        micro_watts as u64
    }
}

fn register_value(exact: f32) -> Result<u16, CalibrationError> {
    if !exact.is_finite() || exact >= u16::MAX as f32 + 0.5 {
        return Err(CalibrationError::OutOfRange);
    }

    match round_half_away(exact) as u16 {
        0 => Err(CalibrationError::OutOfRange),
        register => Ok(register),
    }
}

fn round_half_away(value: f32) -> f32 {
    if value.abs() >= INTEGRAL_THRESHOLD {
        return value;
    }

    let whole = value.trunc();
    if (value - whole).abs() >= 0.5 {
        whole + 1.0f32.copysign(value)
    } else {
        whole
    }
}

fn is_positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f32, expected: f32) {
        let diff = if actual > expected {
            actual - expected
        } else {
            expected - actual
        };
        assert!(
            diff <= expected * 1e-5,
            "{actual} is not close to {expected}"
        );
    }

    #[test]
    fn three_point_two_amps_through_two_milliohms() {
        let cal = Calibration::new(3.2, 0.002).unwrap();
        assert_eq!(cal.register, 26214);
        assert_eq!(cal.register, 0x6666);
        assert_close(cal.current_lsb, 0.000_097_656_25);
        assert_close(cal.power_lsb, 20.0 * 0.000_097_656_25);
    }

    #[test]
    fn matches_calibration_equation() {
        for &(current, shunt) in &[(1.0f32, 0.1f32), (10.0, 0.01), (0.5, 0.5), (20.0, 0.001)] {
            let cal = Calibration::new(current, shunt).unwrap();
            let lsb = current / 32768.0;
            let exact = 0.00512 / (lsb * shunt);
            assert_close(cal.current_lsb, lsb);
            assert!((cal.register as f32 - exact) <= 0.5);
            assert!((exact - cal.register as f32) <= 0.5);
        }
    }

    #[test]
    fn rejects_non_positive_inputs() {
        assert_eq!(
            Calibration::new(0.0, 0.1),
            Err(CalibrationError::InvalidParameter)
        );
        assert_eq!(
            Calibration::new(-1.0, 0.1),
            Err(CalibrationError::InvalidParameter)
        );
        assert_eq!(
            Calibration::new(1.0, 0.0),
            Err(CalibrationError::InvalidParameter)
        );
        assert_eq!(
            Calibration::new(f32::NAN, 0.1),
            Err(CalibrationError::InvalidParameter)
        );
        assert_eq!(
            Calibration::new(1.0, f32::INFINITY),
            Err(CalibrationError::InvalidParameter)
        );
    }

    #[test]
    fn rejects_calibration_that_overflows_register() {
        // 0.00512 / (0.1 / 32768 * 0.0001) ~= 16.7 million
        assert_eq!(
            Calibration::new(0.1, 0.0001),
            Err(CalibrationError::OutOfRange)
        );
    }

    #[test]
    fn rejects_calibration_that_rounds_to_zero() {
        assert_eq!(
            Calibration::new(1000.0, 100.0),
            Err(CalibrationError::OutOfRange)
        );
    }

    #[test]
    fn register_rounds_at_the_half() {
        assert_eq!(register_value(0.499_999_97), Err(CalibrationError::OutOfRange));
        assert_eq!(register_value(0.5), Ok(1));
        assert_eq!(register_value(26_214.4), Ok(26_214));
        assert_eq!(register_value(26_214.5), Ok(26_215));
        assert_eq!(register_value(65_535.4), Ok(65_535));
        assert_eq!(register_value(65_535.5), Err(CalibrationError::OutOfRange));
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_half_away(0.499_999_97), 0.0);
        assert_eq!(round_half_away(2.5), 3.0);
        assert_eq!(round_half_away(-2.5), -3.0);
        assert_eq!(round_half_away(-0.499_999_97), 0.0);
        assert_eq!(round_half_away(-97.656_25), -98.0);
    }

    #[test]
    fn high_current_power_does_not_saturate() {
        let cal = Calibration::new(200.0, 0.0001).unwrap();
        let power = cal.power_micro_watts(35_389);
        assert!(power > u32::MAX as u64);
        // 35389 * 20 * 200 / 32768 W
        assert!(power > 4_319_000_000 && power < 4_321_000_000);

        assert!(cal.current_micro_amps(i16::MAX) > 199_000_000);
        assert!(cal.current_micro_amps(i16::MIN) == -200_000_000);
    }

    #[test]
    fn rejects_scaling_beyond_result_range() {
        assert_eq!(
            Calibration::new(1.0e15, 1.0e-16),
            Err(CalibrationError::OutOfRange)
        );
    }

    #[test]
    fn scales_signed_current() {
        let cal = Calibration::new(3.2, 0.002).unwrap();
        assert_eq!(cal.current_micro_amps(0), 0);
        assert_eq!(cal.current_micro_amps(1024), 100_000);
        assert_eq!(cal.current_micro_amps(-1024), -100_000);
        assert_eq!(cal.current_micro_amps(1), 98);
    }

    #[test]
    fn scales_power() {
        let cal = Calibration::new(3.2, 0.002).unwrap();
        assert_eq!(cal.power_micro_watts(0), 0);
        assert_eq!(cal.power_micro_watts(512), 1_000_000);
    }
}
