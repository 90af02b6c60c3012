//! Bounds validation for setpoints and ramp rates.
//!
//! Pure functions over the configured envelopes. Nothing here touches the
//! device: callers must not write until a request is accepted.
//!
//! Verdicts:
//! - `Accepted` - the value may be used
//! - `Rejected(reason)` - the value violates an envelope
//! - `NotApplicable` - the humidity policy excludes humidity control for the
//!   requested temperature; this is never encoded as a zero setpoint

use crate::error::ControlError;
use crate::ramp::RampRequest;
use chamber_common::config::{BoundsConfig, ChamberConfig, HumidityPolicy};
use chamber_common::types::{Bounds, ProcessVariable};
use std::time::Duration;
use thiserror::Error;

/// Why a value was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    /// NaN or infinite input.
    #[error("{variable} value {value} is not a finite number")]
    NotFinite {
        /// Variable concerned.
        variable: ProcessVariable,
        /// Offending value.
        value: f64,
    },

    /// Setpoint outside `[min, max]`.
    #[error("{variable} setpoint {value} outside [{min}, {max}]")]
    SetpointOutOfRange {
        /// Variable concerned.
        variable: ProcessVariable,
        /// Requested setpoint.
        value: f64,
        /// Lowest accepted setpoint.
        min: f64,
        /// Highest accepted setpoint.
        max: f64,
    },

    /// Zero or negative rate; such a ramp never converges.
    #[error("{variable} ramp rate {rate} must be greater than 0")]
    RateNotPositive {
        /// Variable concerned.
        variable: ProcessVariable,
        /// Requested rate.
        rate: f64,
    },

    /// Rate magnitude outside `[min, max]`.
    #[error("{variable} ramp rate {rate} outside [{min}, {max}] per interval")]
    RateOutOfRange {
        /// Variable concerned.
        variable: ProcessVariable,
        /// Requested rate.
        rate: f64,
        /// Lowest accepted rate magnitude.
        min: f64,
        /// Highest accepted rate magnitude.
        max: f64,
    },

    /// Transition duration zero, negative or not finite.
    #[error("ramp duration {duration} must be greater than 0")]
    DurationNotPositive {
        /// Requested duration.
        duration: f64,
    },
}

/// Outcome of a validation check.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Value within its envelope.
    Accepted,
    /// Value violates its envelope.
    Rejected(RejectReason),
    /// Humidity control does not apply to the requested temperature.
    NotApplicable,
}

impl Verdict {
    /// True only for `Accepted`.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    fn from_check(check: Result<(), RejectReason>) -> Self {
        match check {
            Ok(()) => Verdict::Accepted,
            Err(reason) => Verdict::Rejected(reason),
        }
    }
}

/// Validator over the process-wide envelopes.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundsValidator {
    bounds: BoundsConfig,
    humidity_policy: HumidityPolicy,
}

impl BoundsValidator {
    /// Create a validator from explicit envelopes.
    pub fn new(bounds: BoundsConfig, humidity_policy: HumidityPolicy) -> Self {
        Self {
            bounds,
            humidity_policy,
        }
    }

    /// Create a validator from the loaded configuration.
    pub fn from_config(config: &ChamberConfig) -> Self {
        Self::new(config.bounds.clone(), config.humidity_policy)
    }

    /// Envelope of a variable.
    pub fn bounds(&self, variable: ProcessVariable) -> &Bounds {
        self.bounds.for_variable(variable)
    }

    /// Check a setpoint against the inclusive `[min_setpoint, max_setpoint]`.
    pub fn validate_setpoint(&self, variable: ProcessVariable, value: f64) -> Verdict {
        Verdict::from_check(self.check_setpoint(variable, value))
    }

    /// Check a rate: positive, finite, magnitude within `[min_rate, max_rate]`.
    pub fn validate_rate(&self, variable: ProcessVariable, rate: f64) -> Verdict {
        Verdict::from_check(self.check_rate(variable, rate))
    }

    /// Derive a rate from a transition duration, then validate it.
    ///
    /// `duration` is measured in ramp intervals. The duration is rejected
    /// before any division when it is zero, negative or not finite. The
    /// returned rate is a magnitude; the ramp controller infers direction.
    pub fn derive_rate(
        &self,
        variable: ProcessVariable,
        current: f64,
        target: f64,
        duration: f64,
    ) -> Result<f64, RejectReason> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(RejectReason::DurationNotPositive { duration });
        }
        check_finite(variable, current)?;
        check_finite(variable, target)?;

        let rate = (target - current).abs() / duration;
        self.check_rate(variable, rate)?;
        Ok(rate)
    }

    /// Whether humidity control applies to a temperature target.
    pub fn humidity_applicability(&self, temperature_target: f64) -> Verdict {
        if let Err(reason) = check_finite(ProcessVariable::Temperature, temperature_target) {
            return Verdict::Rejected(reason);
        }
        match self.humidity_policy {
            HumidityPolicy::Always => Verdict::Accepted,
            HumidityPolicy::TemperatureWindow {
                min_temperature,
                max_temperature,
            } => {
                if (min_temperature..=max_temperature).contains(&temperature_target) {
                    Verdict::Accepted
                } else {
                    Verdict::NotApplicable
                }
            }
        }
    }

    /// Validate setpoint and rate together and build the immutable request.
    ///
    /// # Errors
    /// `ControlError::ValidationRejected` with the first violated envelope.
    pub fn approve(
        &self,
        variable: ProcessVariable,
        target: f64,
        rate: f64,
        interval: Duration,
    ) -> Result<RampRequest, ControlError> {
        self.check_setpoint(variable, target)?;
        self.check_rate(variable, rate)?;
        Ok(RampRequest::new(variable, target, rate, interval))
    }

    fn check_setpoint(&self, variable: ProcessVariable, value: f64) -> Result<(), RejectReason> {
        check_finite(variable, value)?;
        let bounds = self.bounds(variable);
        if value < bounds.min_setpoint || value > bounds.max_setpoint {
            return Err(RejectReason::SetpointOutOfRange {
                variable,
                value,
                min: bounds.min_setpoint,
                max: bounds.max_setpoint,
            });
        }
        Ok(())
    }

    fn check_rate(&self, variable: ProcessVariable, rate: f64) -> Result<(), RejectReason> {
        check_finite(variable, rate)?;
        if rate <= 0.0 {
            return Err(RejectReason::RateNotPositive { variable, rate });
        }
        let bounds = self.bounds(variable);
        let magnitude = rate.abs();
        if magnitude < bounds.min_rate || magnitude > bounds.max_rate {
            return Err(RejectReason::RateOutOfRange {
                variable,
                rate,
                min: bounds.min_rate,
                max: bounds.max_rate,
            });
        }
        Ok(())
    }
}

fn check_finite(variable: ProcessVariable, value: f64) -> Result<(), RejectReason> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RejectReason::NotFinite { variable, value })
    }
}
