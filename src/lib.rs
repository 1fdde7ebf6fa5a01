//!
//! A platform-agnostic driver for the INA226 bidirectional current and power monitor. Built using embedded-hal.
//!
//! The driver computes the calibration register from the shunt resistor and the largest expected
//! current, manages the averaging, conversion time and operating mode fields of the configuration
//! register, and reports bus voltage, shunt voltage, current and power in integer micro/milli units.
//!
//! ```rust,no_run
//! use embedded_hal_mock::eh1::delay::NoopDelay;
//! use embedded_hal_mock::eh1::i2c::Mock;
//! use ina226::{INA226Driver, INA226InitConfig};
//!
//! let i2c = Mock::new(&[]);
//! let mut config = INA226InitConfig::new(3.2, 0.002);
//! config.averaging = ina226::Averaging::Avg16;
//!
//! let mut ina = INA226Driver::new(i2c, NoopDelay, 0x40, Some(config)).unwrap();
//! let bus_mv = ina.get_bus_millivolts(true).unwrap();
//! let current_ua = ina.get_bus_microamps().unwrap();
//! ```
//!

#![cfg_attr(not(feature = "std"), no_std)]

#[macro_use]
mod fmt;

pub mod calibration;
pub mod config;
pub mod driver;
pub mod register;

pub use calibration::{Calibration, CalibrationError};
pub use config::{Averaging, Configuration, ConversionTime, Mode};
pub use driver::*;
pub use register::{MaskEnable, Register};
