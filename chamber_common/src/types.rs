//! Process-variable types shared by the controller and the drivers.
//!
//! Register words exchanged with the PLC are 16 bits wide. Process values
//! can be negative (the chamber goes down to -40 °C), so they travel as
//! two's complement `i16` words. Ramp arithmetic runs in `f64` and is only
//! rounded at the register boundary.

use crate::port::PortError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A controlled process variable of the chamber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessVariable {
    /// Chamber air temperature.
    Temperature,
    /// Chamber relative humidity.
    Humidity,
}

impl ProcessVariable {
    /// Both variables, in the order a session ramps them.
    pub const ALL: [ProcessVariable; 2] = [ProcessVariable::Temperature, ProcessVariable::Humidity];

    /// Engineering unit of this variable.
    pub const fn unit(self) -> Unit {
        match self {
            ProcessVariable::Temperature => Unit::Celsius,
            ProcessVariable::Humidity => Unit::PercentRh,
        }
    }

    /// Lowercase name used in log fields and prompts.
    pub const fn as_str(self) -> &'static str {
        match self {
            ProcessVariable::Temperature => "temperature",
            ProcessVariable::Humidity => "humidity",
        }
    }
}

impl fmt::Display for ProcessVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engineering unit of a process variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Degrees Celsius.
    Celsius,
    /// Percent relative humidity.
    PercentRh,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Celsius => f.write_str("°C"),
            Unit::PercentRh => f.write_str("%RH"),
        }
    }
}

/// Safety envelope for one process variable.
///
/// Rates are magnitudes of change per ramp interval.
///
/// # TOML Example
///
/// ```toml
/// [bounds.temperature]
/// min_setpoint = -40.0
/// max_setpoint = 150.0
/// min_rate = 0.0
/// max_rate = 5.0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Bounds {
    /// Lowest accepted setpoint (inclusive).
    pub min_setpoint: f64,
    /// Highest accepted setpoint (inclusive).
    pub max_setpoint: f64,
    /// Lowest accepted rate magnitude (inclusive). Zero rates are rejected regardless.
    #[serde(default)]
    pub min_rate: f64,
    /// Highest accepted rate magnitude (inclusive).
    pub max_rate: f64,
}

impl Bounds {
    /// Check internal consistency of the envelope.
    ///
    /// Returns a human readable description of the first violation.
    pub fn check(&self) -> Result<(), String> {
        let all = [self.min_setpoint, self.max_setpoint, self.min_rate, self.max_rate];
        if all.iter().any(|v| !v.is_finite()) {
            return Err("bounds must be finite numbers".to_string());
        }
        if self.min_setpoint > self.max_setpoint {
            return Err(format!(
                "min_setpoint {} is greater than max_setpoint {}",
                self.min_setpoint, self.max_setpoint
            ));
        }
        if self.min_setpoint < f64::from(i16::MIN) || self.max_setpoint > f64::from(i16::MAX) {
            return Err(format!(
                "setpoint range [{}, {}] does not fit a 16-bit register",
                self.min_setpoint, self.max_setpoint
            ));
        }
        if self.min_rate < 0.0 {
            return Err(format!("min_rate {} must not be negative", self.min_rate));
        }
        if self.max_rate <= 0.0 {
            return Err(format!("max_rate {} must be greater than 0", self.max_rate));
        }
        if self.min_rate > self.max_rate {
            return Err(format!(
                "min_rate {} is greater than max_rate {}",
                self.min_rate, self.max_rate
            ));
        }
        Ok(())
    }
}

/// Round a process value to the register word the PLC expects.
///
/// # Errors
/// `PortError::ValueOutOfRange` when the rounded value does not fit `i16`
/// or is not finite.
pub fn encode_value(value: f64) -> Result<u16, PortError> {
    let rounded = value.round();
    if !rounded.is_finite() || rounded < f64::from(i16::MIN) || rounded > f64::from(i16::MAX) {
        return Err(PortError::ValueOutOfRange(value));
    }
    Ok((rounded as i16) as u16)
}

/// Interpret a register word as a signed process value.
#[inline]
pub fn decode_word(word: u16) -> f64 {
    f64::from(word as i16)
}
