//! Control session: one operator adjust request, end to end.
//!
//! ```text
//! fresh read ──► humidity policy ──► validate both ──► ramp T ──► ramp RH
//! ```
//!
//! Current values are re-read from the PLC for every request and never
//! carried over from a previous session. Both variables are validated before
//! the first write, so a rejected humidity request leaves the temperature
//! untouched as well. Ramps run one after the other.

use crate::bounds::{BoundsValidator, RejectReason, Verdict};
use crate::cancel::CancelToken;
use crate::error::ControlError;
use crate::probe::{ChamberProbe, ProcessSnapshot};
use crate::ramp::{RampController, RampOutcome, RampRequest, RampStatus, Sleeper};
use chamber_common::config::ChamberConfig;
use chamber_common::port::SharedPort;
use chamber_common::types::ProcessVariable;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the operator expressed the pace of a change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateSpec {
    /// Step magnitude per ramp interval.
    PerInterval(f64),
    /// Total transition time in minutes; the rate is derived.
    Duration {
        /// Requested transition time.
        minutes: f64,
    },
}

/// Operator request for new setpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustRequest {
    /// Temperature target [°C].
    pub temperature: f64,
    /// Temperature pace.
    pub temperature_rate: RateSpec,
    /// Humidity target [%RH] and pace, `None` to leave humidity alone.
    pub humidity: Option<(f64, RateSpec)>,
}

/// What a session will do with one variable.
#[derive(Debug, Clone, PartialEq)]
pub enum VariablePlan {
    /// Ramp from `current` per the approved request.
    Ramp {
        /// Freshly read value.
        current: f64,
        /// Approved request.
        request: RampRequest,
    },
    /// Target equals the current value; nothing to write.
    AtTarget(f64),
    /// Humidity control does not apply to the temperature target.
    NotApplicable,
    /// No target requested.
    Unchanged,
}

/// Validated plan for both variables. No device write has happened yet.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustPlan {
    /// Temperature plan.
    pub temperature: VariablePlan,
    /// Humidity plan.
    pub humidity: VariablePlan,
}

/// What a session did with one variable.
#[derive(Debug)]
pub enum VariableOutcome {
    /// A ramp ran (completed, cancelled or cut off by a lost connection).
    Ramped(RampOutcome),
    /// Not attempted because the device was lost during the previous ramp.
    Skipped,
    /// Already at target; nothing written.
    AtTarget(f64),
    /// Humidity control does not apply to the temperature target.
    NotApplicable,
    /// No target requested.
    Unchanged,
}

/// Per-variable result of an adjust request.
#[derive(Debug)]
pub struct AdjustReport {
    /// Temperature result.
    pub temperature: VariableOutcome,
    /// Humidity result.
    pub humidity: VariableOutcome,
}

/// Orchestrates validation and ramps over the shared port.
#[derive(Debug)]
pub struct ControlSession {
    validator: BoundsValidator,
    probe: ChamberProbe,
    interval: Duration,
    temperature: RampController,
    humidity: RampController,
}

impl ControlSession {
    /// Session over `port` using the loaded configuration.
    pub fn from_config(port: SharedPort, config: &ChamberConfig) -> Self {
        let registers = &config.registers;
        Self {
            validator: BoundsValidator::from_config(config),
            probe: ChamberProbe::new(port.clone(), registers),
            interval: config.ramp.interval(),
            temperature: RampController::new(
                port.clone(),
                ProcessVariable::Temperature,
                registers.temperature,
            ),
            humidity: RampController::new(port, ProcessVariable::Humidity, registers.humidity),
        }
    }

    /// Replace the wall-clock sleeper of both ramp controllers.
    pub fn with_sleeper<S: Sleeper + Clone + 'static>(mut self, sleeper: S) -> Self {
        self.temperature = self.temperature.with_sleeper(sleeper.clone());
        self.humidity = self.humidity.with_sleeper(sleeper);
        self
    }

    /// Validator in use.
    pub fn validator(&self) -> &BoundsValidator {
        &self.validator
    }

    /// Probe over the same port.
    pub fn probe(&self) -> &ChamberProbe {
        &self.probe
    }

    /// Fresh read of both process values.
    pub fn snapshot(&self) -> Result<ProcessSnapshot, ControlError> {
        self.probe.snapshot()
    }

    /// Turn a rate spec into a validated step magnitude per interval.
    ///
    /// Durations are given in minutes and converted to ramp intervals.
    ///
    /// # Errors
    /// `ControlError::ValidationRejected` if the rate or duration is rejected.
    pub fn resolve_rate(
        &self,
        variable: ProcessVariable,
        current: f64,
        target: f64,
        spec: RateSpec,
    ) -> Result<f64, ControlError> {
        match spec {
            RateSpec::PerInterval(rate) => match self.validator.validate_rate(variable, rate) {
                Verdict::Rejected(reason) => Err(reason.into()),
                _ => Ok(rate),
            },
            RateSpec::Duration { minutes } => {
                let interval_secs = self.interval.as_secs_f64();
                if !minutes.is_finite() || minutes <= 0.0 || interval_secs <= 0.0 {
                    return Err(RejectReason::DurationNotPositive { duration: minutes }.into());
                }
                let intervals = minutes * 60.0 / interval_secs;
                let rate = self.validator.derive_rate(variable, current, target, intervals)?;
                debug!(%variable, minutes, intervals, rate, "Derived ramp rate");
                Ok(rate)
            }
        }
    }

    /// Validate a request against a snapshot. Touches nothing on the device.
    ///
    /// # Errors
    /// The first validation failure, temperature first.
    pub fn plan(
        &self,
        request: &AdjustRequest,
        snapshot: &ProcessSnapshot,
    ) -> Result<AdjustPlan, ControlError> {
        let temperature = self.plan_variable(
            ProcessVariable::Temperature,
            snapshot.temperature,
            request.temperature,
            request.temperature_rate,
        )?;

        let humidity = match self.validator.humidity_applicability(request.temperature) {
            Verdict::NotApplicable => VariablePlan::NotApplicable,
            Verdict::Rejected(reason) => return Err(reason.into()),
            Verdict::Accepted => match request.humidity {
                None => VariablePlan::Unchanged,
                Some((target, spec)) => self.plan_variable(
                    ProcessVariable::Humidity,
                    snapshot.humidity,
                    target,
                    spec,
                )?,
            },
        };

        Ok(AdjustPlan {
            temperature,
            humidity,
        })
    }

    /// Run a validated plan: temperature first, then humidity.
    ///
    /// A cancellation during the temperature ramp also stops the humidity
    /// ramp before its first step. A connection lost during the temperature
    /// ramp skips humidity entirely.
    pub fn execute(
        &mut self,
        plan: AdjustPlan,
        cancel: &CancelToken,
    ) -> Result<AdjustReport, ControlError> {
        let temperature = run_plan(&mut self.temperature, plan.temperature, cancel)?;
        let humidity = match &temperature {
            VariableOutcome::Ramped(ramp) if ramp.status == RampStatus::DeviceLost => {
                warn!("Device lost during temperature ramp, humidity not attempted");
                VariableOutcome::Skipped
            }
            _ => run_plan(&mut self.humidity, plan.humidity, cancel)?,
        };
        Ok(AdjustReport {
            temperature,
            humidity,
        })
    }

    /// Fresh read, validation, then sequential ramps.
    pub fn adjust(
        &mut self,
        request: &AdjustRequest,
        cancel: &CancelToken,
    ) -> Result<AdjustReport, ControlError> {
        let snapshot = self.snapshot()?;
        info!(
            temperature = snapshot.temperature,
            humidity = snapshot.humidity,
            "Session started from fresh device values"
        );
        let plan = self.plan(request, &snapshot)?;
        self.execute(plan, cancel)
    }

    fn plan_variable(
        &self,
        variable: ProcessVariable,
        current: f64,
        target: f64,
        spec: RateSpec,
    ) -> Result<VariablePlan, ControlError> {
        if let Verdict::Rejected(reason) = self.validator.validate_setpoint(variable, target) {
            return Err(reason.into());
        }
        if current == target {
            return Ok(VariablePlan::AtTarget(current));
        }
        let rate = self.resolve_rate(variable, current, target, spec)?;
        let request = self.validator.approve(variable, target, rate, self.interval)?;
        Ok(VariablePlan::Ramp { current, request })
    }
}

fn run_plan(
    controller: &mut RampController,
    plan: VariablePlan,
    cancel: &CancelToken,
) -> Result<VariableOutcome, ControlError> {
    Ok(match plan {
        VariablePlan::Ramp { current, request } => {
            VariableOutcome::Ramped(controller.run(current, &request, cancel)?)
        }
        VariablePlan::AtTarget(value) => VariableOutcome::AtTarget(value),
        VariablePlan::NotApplicable => {
            info!(
                variable = %controller.variable(),
                "Humidity control not applicable at this temperature"
            );
            VariableOutcome::NotApplicable
        }
        VariablePlan::Unchanged => VariableOutcome::Unchanged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chamber_common::config::{LogLevel, SharedConfig};
    use chamber_hal::{SimulationDriver, SimulationHandle};

    #[derive(Clone, Copy)]
    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&mut self, _duration: Duration, _cancel: &CancelToken) {}
    }

    fn session(temperature: f64, humidity: f64) -> (ControlSession, SimulationHandle) {
        let config = ChamberConfig {
            shared: SharedConfig {
                log_level: LogLevel::Info,
                service_name: "test".to_string(),
            },
            device: Default::default(),
            registers: Default::default(),
            bounds: Default::default(),
            ramp: Default::default(),
            humidity_policy: Default::default(),
        };
        let driver = SimulationDriver::connected();
        let handle = driver.handle();
        handle.seed_value(config.registers.temperature, temperature).unwrap();
        handle.seed_value(config.registers.humidity, humidity).unwrap();
        let session = ControlSession::from_config(SharedPort::from_driver(driver), &config)
            .with_sleeper(NoSleep);
        (session, handle)
    }

    #[test]
    fn duration_converted_to_intervals() {
        let (session, _) = session(20.0, 50.0);
        // 60 s interval: 3 minutes = 3 intervals
        let rate = session
            .resolve_rate(
                ProcessVariable::Temperature,
                20.0,
                26.0,
                RateSpec::Duration { minutes: 3.0 },
            )
            .unwrap();
        assert_eq!(rate, 2.0);
    }

    #[test]
    fn zero_duration_rejected() {
        let (session, _) = session(20.0, 50.0);
        let err = session
            .resolve_rate(
                ProcessVariable::Temperature,
                20.0,
                26.0,
                RateSpec::Duration { minutes: 0.0 },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ControlError::ValidationRejected(RejectReason::DurationNotPositive { .. })
        ));
    }

    #[test]
    fn humidity_outside_window_is_not_applicable() {
        let (session, _) = session(20.0, 50.0);
        let snapshot = session.snapshot().unwrap();
        let request = AdjustRequest {
            temperature: 90.0,
            temperature_rate: RateSpec::PerInterval(5.0),
            humidity: Some((60.0, RateSpec::PerInterval(1.0))),
        };
        let plan = session.plan(&request, &snapshot).unwrap();
        assert_eq!(plan.humidity, VariablePlan::NotApplicable);
        assert!(matches!(plan.temperature, VariablePlan::Ramp { .. }));
    }

    #[test]
    fn rejected_humidity_blocks_temperature_write() {
        let (mut session, handle) = session(20.0, 50.0);
        let request = AdjustRequest {
            temperature: 26.0,
            temperature_rate: RateSpec::PerInterval(2.0),
            humidity: Some((95.0, RateSpec::PerInterval(1.0))),
        };
        let err = session.adjust(&request, &CancelToken::new()).unwrap_err();
        assert!(err.is_input_error());
        assert!(handle.writes().is_empty());
    }

    #[test]
    fn adjust_ramps_temperature_then_humidity() {
        let (mut session, handle) = session(20.0, 50.0);
        let request = AdjustRequest {
            temperature: 26.0,
            temperature_rate: RateSpec::PerInterval(2.0),
            humidity: Some((47.0, RateSpec::PerInterval(2.0))),
        };
        let report = session.adjust(&request, &CancelToken::new()).unwrap();

        assert_eq!(handle.writes(), vec![(1, 22), (1, 24), (1, 26), (2, 48), (2, 47)]);
        match report.humidity {
            VariableOutcome::Ramped(outcome) => {
                assert_eq!(outcome.status, RampStatus::Completed);
                assert_eq!(outcome.final_value, 47.0);
            }
            other => panic!("unexpected humidity outcome: {other:?}"),
        }
    }

    #[test]
    fn unchanged_target_skips_rate() {
        let (mut session, handle) = session(24.0, 50.0);
        let request = AdjustRequest {
            temperature: 24.0,
            temperature_rate: RateSpec::Duration { minutes: 10.0 },
            humidity: None,
        };
        let report = session.adjust(&request, &CancelToken::new()).unwrap();
        assert!(matches!(report.temperature, VariableOutcome::AtTarget(v) if v == 24.0));
        assert!(matches!(report.humidity, VariableOutcome::Unchanged));
        assert!(handle.writes().is_empty());
    }

    #[test]
    fn each_session_rereads_device() {
        let (mut session, handle) = session(20.0, 50.0);
        let request = AdjustRequest {
            temperature: 24.0,
            temperature_rate: RateSpec::PerInterval(2.0),
            humidity: None,
        };
        session.adjust(&request, &CancelToken::new()).unwrap();

        // PLC changed behind our back
        handle.seed_value(1, 30.0).unwrap();
        handle.clear_writes();
        session.adjust(&request, &CancelToken::new()).unwrap();
        assert_eq!(handle.writes_to(1), vec![28, 26, 24]);
    }

    /// Takes the simulated PLC offline on the first pause.
    #[derive(Clone)]
    struct Unplug(SimulationHandle);

    impl Sleeper for Unplug {
        fn sleep(&mut self, _duration: Duration, _cancel: &CancelToken) {
            self.0.set_reachable(false);
        }
    }

    #[test]
    fn lost_device_skips_humidity() {
        let (session, handle) = session(20.0, 50.0);
        let mut session = session.with_sleeper(Unplug(handle.clone()));
        let request = AdjustRequest {
            temperature: 26.0,
            temperature_rate: RateSpec::PerInterval(2.0),
            humidity: Some((47.0, RateSpec::PerInterval(2.0))),
        };
        let report = session.adjust(&request, &CancelToken::new()).unwrap();

        match report.temperature {
            VariableOutcome::Ramped(outcome) => {
                assert_eq!(outcome.status, RampStatus::DeviceLost);
                assert_eq!(outcome.last_confirmed, Some(22.0));
            }
            other => panic!("unexpected temperature outcome: {other:?}"),
        }
        assert!(matches!(report.humidity, VariableOutcome::Skipped));
        assert_eq!(handle.writes(), vec![(1, 22)]);
    }
}
