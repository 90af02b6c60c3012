//! Setpoint ramp controller.
//!
//! Converges one process variable from its current value to a target in
//! fixed steps of `rate` per interval. The step that would cross the target
//! snaps to it exactly, so a ramp from `start` always ends on `target` after
//! `ceil(|target - start| / rate)` writes.

use crate::cancel::CancelToken;
use crate::error::ControlError;
use crate::probe::read_value;
use chamber_common::port::{PortError, SharedPort};
use chamber_common::types::{ProcessVariable, encode_value};
use std::time::Duration;
use tracing::{error, info, warn};

/// Distance below which the in-memory value is considered on target.
///
/// Absorbs floating point drift from fractional rates.
pub const SNAP_TOLERANCE: f64 = 1e-9;

/// Longest single sleep of [`ThreadSleeper`] before re-checking cancellation.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Next in-memory value of a ramp.
///
/// Direction is re-derived from `current` on every call; a step that would
/// reach or cross `target` returns `target` itself. `rate` must be positive.
#[inline]
pub fn next_value(current: f64, target: f64, rate: f64) -> f64 {
    if (target - current).abs() <= SNAP_TOLERANCE {
        return target;
    }
    if current < target {
        let naive = current + rate;
        if naive >= target - SNAP_TOLERANCE { target } else { naive }
    } else {
        let naive = current - rate;
        if naive <= target + SNAP_TOLERANCE { target } else { naive }
    }
}

/// Validated ramp request. Immutable once built.
///
/// Only [`BoundsValidator::approve`](crate::bounds::BoundsValidator::approve)
/// constructs requests, so every request satisfies its envelope at
/// acceptance time.
#[derive(Debug, Clone, PartialEq)]
pub struct RampRequest {
    variable: ProcessVariable,
    target: f64,
    rate: f64,
    interval: Duration,
}

impl RampRequest {
    pub(crate) fn new(
        variable: ProcessVariable,
        target: f64,
        rate: f64,
        interval: Duration,
    ) -> Self {
        Self {
            variable,
            target,
            rate,
            interval,
        }
    }

    /// Variable to ramp.
    pub fn variable(&self) -> ProcessVariable {
        self.variable
    }

    /// Target setpoint.
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Positive step magnitude per interval.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Pause between two steps.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Pause between ramp steps.
///
/// Implementations should return early once `cancel` is set.
pub trait Sleeper: Send {
    /// Block for `duration` or until cancelled.
    fn sleep(&mut self, duration: Duration, cancel: &CancelToken);
}

/// Wall-clock sleeper, wakes within 100 ms of a cancellation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration, cancel: &CancelToken) {
        let mut remaining = duration;
        while !remaining.is_zero() && !cancel.is_cancelled() {
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }
}

/// How a ramp ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampStatus {
    /// Current value already equal to the target; nothing written.
    AlreadyAtTarget,
    /// Last step reached the target.
    Completed,
    /// Cancellation observed before the target was reached.
    Cancelled,
    /// Connection lost mid-ramp; the device holds `last_confirmed`.
    DeviceLost,
}

/// Result of one ramp run.
#[derive(Debug)]
pub struct RampOutcome {
    /// Variable that was ramped.
    pub variable: ProcessVariable,
    /// Value the ramp started from.
    pub start: f64,
    /// Requested target.
    pub target: f64,
    /// In-memory value when the ramp ended.
    pub final_value: f64,
    /// Write attempts, failed ones included.
    pub writes: usize,
    /// `ControlError::WriteFailed` for every write the device rejected.
    pub write_errors: Vec<ControlError>,
    /// Last value the device acknowledged, if any.
    pub last_confirmed: Option<f64>,
    /// Termination reason.
    pub status: RampStatus,
}

impl RampOutcome {
    /// Number of write attempts the device rejected.
    pub fn failed_writes(&self) -> usize {
        self.write_errors.len()
    }
}

/// Stepwise convergence of one process variable.
pub struct RampController {
    port: SharedPort,
    variable: ProcessVariable,
    address: u16,
    sleeper: Box<dyn Sleeper>,
}

impl RampController {
    /// Controller for `variable`, writing its setpoint to `address`.
    pub fn new(port: SharedPort, variable: ProcessVariable, address: u16) -> Self {
        Self {
            port,
            variable,
            address,
            sleeper: Box::new(ThreadSleeper),
        }
    }

    /// Replace the wall-clock sleeper.
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Variable driven by this controller.
    pub fn variable(&self) -> ProcessVariable {
        self.variable
    }

    /// Setpoint register address.
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Fresh read of the setpoint register.
    ///
    /// # Errors
    /// `ControlError::DeviceUnreachable` if the port is closed or the read fails.
    pub fn read_current(&self) -> Result<f64, ControlError> {
        let mut port = self.port.lock();
        read_value(&mut **port, self.address)
    }

    /// Ramp from `current` to the request's target. Blocks until done.
    ///
    /// The port stays locked for the whole run. A failed write is logged and
    /// recorded; the in-memory value still advances and the next step
    /// continues from it. A connection that closes mid-ramp ends the run
    /// with [`RampStatus::DeviceLost`] and no further writes.
    ///
    /// # Errors
    /// - `ControlError::VariableMismatch` if the request names another variable
    /// - `ControlError::DeviceUnreachable` if the port is closed at start
    pub fn run(
        &mut self,
        current: f64,
        request: &RampRequest,
        cancel: &CancelToken,
    ) -> Result<RampOutcome, ControlError> {
        if request.variable() != self.variable {
            return Err(ControlError::VariableMismatch {
                controller: self.variable,
                request: request.variable(),
            });
        }

        let target = request.target();
        let mut outcome = RampOutcome {
            variable: self.variable,
            start: current,
            target,
            final_value: current,
            writes: 0,
            write_errors: Vec::new(),
            last_confirmed: None,
            status: RampStatus::AlreadyAtTarget,
        };
        if current == target {
            info!(variable = %self.variable, value = target, "Already at target, nothing to do");
            return Ok(outcome);
        }

        let mut port = self.port.lock();
        if !port.is_open() {
            return Err(ControlError::DeviceUnreachable(PortError::NotConnected));
        }

        info!(
            variable = %self.variable,
            from = current,
            to = target,
            rate = request.rate(),
            "ramp_started"
        );

        let mut value = current;
        loop {
            if cancel.is_cancelled() {
                warn!(
                    variable = %self.variable,
                    value,
                    last_confirmed = ?outcome.last_confirmed,
                    "Ramp cancelled before reaching target"
                );
                outcome.status = RampStatus::Cancelled;
                break;
            }
            if !port.is_open() {
                warn!(
                    variable = %self.variable,
                    value,
                    last_confirmed = ?outcome.last_confirmed,
                    "ramp_device_lost"
                );
                outcome.status = RampStatus::DeviceLost;
                break;
            }

            value = next_value(value, target, request.rate());
            outcome.writes += 1;

            match encode_value(value).and_then(|word| port.write_register(self.address, word)) {
                Ok(()) => {
                    outcome.last_confirmed = Some(value);
                    info!(variable = %self.variable, value, "ramp_step");
                }
                Err(e) => {
                    error!(
                        variable = %self.variable,
                        address = self.address,
                        error = %e,
                        "write_failed"
                    );
                    outcome.write_errors.push(ControlError::WriteFailed {
                        address: self.address,
                        source: e,
                    });
                    if !port.is_open() {
                        continue;
                    }
                }
            }

            if value == target {
                outcome.status = RampStatus::Completed;
                info!(variable = %self.variable, final_value = value, "ramp_completed");
                break;
            }

            self.sleeper.sleep(request.interval(), cancel);
        }

        outcome.final_value = value;
        Ok(outcome)
    }
}

impl std::fmt::Debug for RampController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RampController")
            .field("variable", &self.variable)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chamber_hal::{SimulationDriver, SimulationHandle};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const T: ProcessVariable = ProcessVariable::Temperature;
    const ADDR: u16 = 1;

    /// Counts sleeps; optionally cancels the token after `cancel_after` sleeps.
    #[derive(Clone, Default)]
    struct CountingSleeper {
        count: Arc<AtomicUsize>,
        cancel_after: Option<usize>,
    }

    impl Sleeper for CountingSleeper {
        fn sleep(&mut self, _duration: Duration, cancel: &CancelToken) {
            let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
            if self.cancel_after == Some(n) {
                cancel.cancel();
            }
        }
    }

    fn controller(sleeper: CountingSleeper) -> (RampController, SimulationHandle) {
        let driver = SimulationDriver::connected();
        let handle = driver.handle();
        let port = SharedPort::from_driver(driver);
        (RampController::new(port, T, ADDR).with_sleeper(sleeper), handle)
    }

    fn request(target: f64, rate: f64) -> RampRequest {
        RampRequest::new(T, target, rate, Duration::from_secs(60))
    }

    #[test]
    fn next_value_clamps_to_target() {
        assert_eq!(next_value(20.0, 26.0, 2.0), 22.0);
        assert_eq!(next_value(24.0, 25.0, 2.0), 25.0);
        assert_eq!(next_value(26.0, 20.0, 2.0), 24.0);
        assert_eq!(next_value(21.0, 20.0, 2.0), 20.0);
        assert_eq!(next_value(20.0, 20.0, 2.0), 20.0);
    }

    #[test]
    fn next_value_absorbs_fractional_drift() {
        let mut value = 0.0;
        let mut steps = 0;
        while value != 1.0 {
            value = next_value(value, 1.0, 0.1);
            steps += 1;
            assert!(steps <= 10);
        }
        assert_eq!(steps, 10);
    }

    #[test]
    fn ascending_ramp() {
        let sleeper = CountingSleeper::default();
        let sleeps = sleeper.count.clone();
        let (mut ramp, handle) = controller(sleeper);

        let outcome = ramp.run(20.0, &request(26.0, 2.0), &CancelToken::new()).unwrap();

        assert_eq!(handle.writes_to(ADDR), vec![22, 24, 26]);
        assert_eq!(outcome.writes, 3);
        assert_eq!(outcome.final_value, 26.0);
        assert_eq!(outcome.status, RampStatus::Completed);
        assert_eq!(sleeps.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn descending_ramp() {
        let (mut ramp, handle) = controller(CountingSleeper::default());
        let outcome = ramp.run(26.0, &request(20.0, 2.0), &CancelToken::new()).unwrap();

        assert_eq!(handle.writes_to(ADDR), vec![24, 22, 20]);
        assert_eq!(outcome.final_value, 20.0);
    }

    #[test]
    fn uneven_ramp_snaps_last_step() {
        let (mut ramp, handle) = controller(CountingSleeper::default());
        let outcome = ramp.run(20.0, &request(25.0, 2.0), &CancelToken::new()).unwrap();

        assert_eq!(handle.writes_to(ADDR), vec![22, 24, 25]);
        assert_eq!(outcome.last_confirmed, Some(25.0));
    }

    #[test]
    fn at_target_is_a_no_op() {
        let sleeper = CountingSleeper::default();
        let sleeps = sleeper.count.clone();
        let (mut ramp, handle) = controller(sleeper);

        for _ in 0..2 {
            let outcome = ramp.run(24.0, &request(24.0, 2.0), &CancelToken::new()).unwrap();
            assert_eq!(outcome.status, RampStatus::AlreadyAtTarget);
            assert_eq!(outcome.writes, 0);
        }
        assert!(handle.writes().is_empty());
        assert_eq!(sleeps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_write_does_not_stop_ramp() {
        let (mut ramp, handle) = controller(CountingSleeper::default());
        handle.fail_writes(ADDR);

        let outcome = ramp.run(20.0, &request(26.0, 2.0), &CancelToken::new()).unwrap();

        assert_eq!(outcome.writes, 3);
        assert_eq!(outcome.failed_writes(), 3);
        assert_eq!(outcome.status, RampStatus::Completed);
        assert_eq!(outcome.final_value, 26.0);
        assert_eq!(outcome.last_confirmed, None);
        assert!(handle.writes().is_empty());
        for err in &outcome.write_errors {
            assert!(matches!(
                err,
                ControlError::WriteFailed {
                    address: ADDR,
                    source: PortError::Exception { address: ADDR, .. },
                }
            ));
        }
    }

    /// Takes the simulated PLC offline during the first pause.
    struct UnplugSleeper {
        handle: SimulationHandle,
        count: Arc<AtomicUsize>,
    }

    impl Sleeper for UnplugSleeper {
        fn sleep(&mut self, _duration: Duration, _cancel: &CancelToken) {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.handle.set_reachable(false);
        }
    }

    #[test]
    fn connection_lost_mid_ramp_stops_writing() {
        let driver = SimulationDriver::connected();
        let handle = driver.handle();
        let sleeps = Arc::new(AtomicUsize::new(0));
        let sleeper = UnplugSleeper {
            handle: handle.clone(),
            count: sleeps.clone(),
        };
        let mut ramp =
            RampController::new(SharedPort::from_driver(driver), T, ADDR).with_sleeper(sleeper);

        let outcome = ramp.run(20.0, &request(30.0, 2.0), &CancelToken::new()).unwrap();

        assert_eq!(outcome.status, RampStatus::DeviceLost);
        assert_eq!(outcome.last_confirmed, Some(22.0));
        assert_eq!(outcome.writes, 2);
        assert_eq!(outcome.failed_writes(), 1);
        assert!(matches!(
            outcome.write_errors[0],
            ControlError::WriteFailed { address: ADDR, .. }
        ));
        assert_eq!(handle.writes_to(ADDR), vec![22]);
        assert!(!handle.is_open());
        // no pause after the connection dropped
        assert_eq!(sleeps.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancellation_keeps_last_written_value() {
        let sleeper = CountingSleeper {
            cancel_after: Some(2),
            ..Default::default()
        };
        let (mut ramp, handle) = controller(sleeper);
        let cancel = CancelToken::new();

        let outcome = ramp.run(20.0, &request(30.0, 2.0), &cancel).unwrap();

        assert_eq!(outcome.status, RampStatus::Cancelled);
        assert_eq!(handle.writes_to(ADDR), vec![22, 24]);
        assert_eq!(outcome.final_value, 24.0);
        assert_eq!(outcome.last_confirmed, Some(24.0));
    }

    #[test]
    fn closed_port_is_unreachable() {
        let driver = SimulationDriver::new();
        let handle = driver.handle();
        let mut ramp = RampController::new(SharedPort::from_driver(driver), T, ADDR)
            .with_sleeper(CountingSleeper::default());

        let err = ramp.run(20.0, &request(26.0, 2.0), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, ControlError::DeviceUnreachable(PortError::NotConnected)));
        assert!(handle.writes().is_empty());
    }

    #[test]
    fn request_for_other_variable_refused() {
        let (mut ramp, _handle) = controller(CountingSleeper::default());
        let humidity = RampRequest::new(ProcessVariable::Humidity, 50.0, 1.0, Duration::ZERO);

        let err = ramp.run(40.0, &humidity, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, ControlError::VariableMismatch { .. }));
    }

    #[test]
    fn read_current_decodes_signed_register() {
        let (ramp, handle) = controller(CountingSleeper::default());
        handle.seed_value(ADDR, -12.0).unwrap();
        assert_eq!(ramp.read_current().unwrap(), -12.0);
    }

    #[test]
    fn thread_sleeper_returns_when_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let started = std::time::Instant::now();
        ThreadSleeper.sleep(Duration::from_secs(30), &cancel);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
