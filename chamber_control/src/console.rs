//! Operator console.
//!
//! Line-oriented menu over any `BufRead` / `Write` pair. Malformed or
//! rejected input is reported and asked for again; it never ends the
//! program. The loop ends on the exit choice, end of input or cancellation,
//! and closes the device connection on the way out.

use crate::bounds::Verdict;
use crate::cancel::CancelToken;
use crate::error::ControlError;
use crate::lifecycle::{ChamberLifecycle, LifecycleReport, Outcome};
use crate::probe::ThermocoupleStatus;
use crate::ramp::{RampOutcome, RampStatus};
use crate::session::{AdjustRequest, ControlSession, RateSpec, VariableOutcome};
use chamber_common::port::SharedPort;
use chamber_common::types::ProcessVariable;
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

const MENU: &str = "\
Chamber Control Menu
  1. Start Chamber
  2. Stop Chamber
  3. Control Temperature and Humidity
  4. Chamber Status
  5. Exit";

/// Parse a setpoint entered as a whole number.
pub fn parse_setpoint(input: &str) -> Result<f64, ControlError> {
    let trimmed = input.trim();
    trimmed
        .parse::<i32>()
        .map(f64::from)
        .map_err(|_| ControlError::MalformedInput(format!("'{trimmed}' is not a whole number")))
}

/// Parse a strictly positive, finite number (rate or duration).
pub fn parse_positive(input: &str) -> Result<f64, ControlError> {
    let trimmed = input.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Ok(value),
        Ok(_) => Err(ControlError::MalformedInput(format!(
            "'{trimmed}' must be greater than 0"
        ))),
        Err(_) => Err(ControlError::MalformedInput(format!(
            "'{trimmed}' is not a number"
        ))),
    }
}

/// Print `text`, read one line, and parse it until `parse` accepts.
///
/// Returns `None` at end of input.
fn prompt<R, W, T>(
    input: &mut R,
    output: &mut W,
    text: &str,
    mut parse: impl FnMut(&str) -> Result<T, ControlError>,
) -> io::Result<Option<T>>
where
    R: BufRead,
    W: Write,
{
    loop {
        write!(output, "{text}")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        match parse(&line) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => writeln!(output, "{e}. Please try again.")?,
        }
    }
}

/// Interactive front end over a [`ControlSession`] and a [`ChamberLifecycle`].
pub struct OperatorConsole<R, W> {
    input: R,
    output: W,
    port: SharedPort,
    session: ControlSession,
    lifecycle: ChamberLifecycle,
    cancel: CancelToken,
}

impl<R: BufRead, W: Write> OperatorConsole<R, W> {
    /// Console bound to the given components.
    pub fn new(
        input: R,
        output: W,
        port: SharedPort,
        session: ControlSession,
        lifecycle: ChamberLifecycle,
        cancel: CancelToken,
    ) -> Self {
        Self {
            input,
            output,
            port,
            session,
            lifecycle,
            cancel,
        }
    }

    /// Run the menu loop until exit, then close the port.
    ///
    /// # Errors
    /// Only I/O errors of the console streams.
    pub fn run(&mut self) -> io::Result<()> {
        let result = self.menu_loop();

        if let Err(e) = self.port.lock().close() {
            warn!("Failed to close device connection: {e}");
        } else {
            info!("Device connection closed");
        }
        result
    }

    /// Give back the output stream.
    pub fn into_output(self) -> W {
        self.output
    }

    fn menu_loop(&mut self) -> io::Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                info!("Shutdown requested, leaving console");
                return Ok(());
            }

            writeln!(self.output, "\n{MENU}")?;
            let choice = prompt(&mut self.input, &mut self.output, "Enter your choice: ", |s| {
                Ok(s.trim().to_string())
            })?;
            let Some(choice) = choice else {
                return Ok(());
            };

            match choice.as_str() {
                "1" => {
                    let report = self.lifecycle.start();
                    self.print_lifecycle(&report)?;
                }
                "2" => {
                    let report = self.lifecycle.stop();
                    self.print_lifecycle(&report)?;
                }
                "3" => self.adjust()?,
                "4" => self.status()?,
                "5" => {
                    writeln!(self.output, "Exiting.")?;
                    return Ok(());
                }
                other => writeln!(self.output, "Invalid choice '{other}'. Please try again.")?,
            }
        }
    }

    fn print_lifecycle(&mut self, report: &LifecycleReport) -> io::Result<()> {
        let verb = report.action.as_str();
        match (report.outcome, &report.error) {
            (Outcome::Confirmed, _) => writeln!(self.output, "Chamber {verb} confirmed."),
            (Outcome::DeviceUnreachable, Some(e)) => {
                writeln!(self.output, "Cannot {verb} chamber, device unreachable: {e}")
            }
            (Outcome::WriteFailed, Some(e)) => {
                writeln!(self.output, "Chamber {verb} command failed: {e}")
            }
            (outcome, None) => writeln!(self.output, "Chamber {verb}: {outcome}"),
        }
    }

    fn status(&mut self) -> io::Result<()> {
        let open = self.port.is_open();
        writeln!(
            self.output,
            "Connection: {}",
            if open { "open" } else { "closed" }
        )?;

        match self.session.snapshot() {
            Ok(snapshot) => {
                writeln!(
                    self.output,
                    "Temperature setpoint: {} {}",
                    snapshot.temperature,
                    ProcessVariable::Temperature.unit()
                )?;
                writeln!(
                    self.output,
                    "Humidity setpoint: {} {}",
                    snapshot.humidity,
                    ProcessVariable::Humidity.unit()
                )?;
            }
            Err(e) => writeln!(self.output, "{e}")?,
        }

        match self.session.probe().thermocouple() {
            Ok(ThermocoupleStatus::Connected) => writeln!(self.output, "Thermocouple: connected"),
            Ok(ThermocoupleStatus::Disconnected(word)) => writeln!(
                self.output,
                "Thermocouple: NOT connected (status {word})"
            ),
            Ok(ThermocoupleStatus::NotConfigured) => Ok(()),
            Err(e) => writeln!(self.output, "Thermocouple: {e}"),
        }
    }

    fn adjust(&mut self) -> io::Result<()> {
        let snapshot = match self.session.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => return writeln!(self.output, "{e}"),
        };
        writeln!(
            self.output,
            "Current temperature: {} {}, humidity: {} {}",
            snapshot.temperature,
            ProcessVariable::Temperature.unit(),
            snapshot.humidity,
            ProcessVariable::Humidity.unit()
        )?;

        let Some((temperature, temperature_rate)) =
            self.ask_variable(ProcessVariable::Temperature, snapshot.temperature, false)?
                .flatten()
        else {
            return Ok(());
        };

        let humidity = match self.session.validator().humidity_applicability(temperature) {
            Verdict::Accepted => {
                match self.ask_variable(ProcessVariable::Humidity, snapshot.humidity, true)? {
                    Some(humidity) => humidity,
                    None => return Ok(()),
                }
            }
            _ => {
                writeln!(
                    self.output,
                    "Humidity control is not applicable at {temperature} {}; humidity left unchanged.",
                    ProcessVariable::Temperature.unit()
                )?;
                None
            }
        };

        let request = AdjustRequest {
            temperature,
            temperature_rate,
            humidity,
        };
        let plan = match self.session.plan(&request, &snapshot) {
            Ok(plan) => plan,
            Err(e) => return writeln!(self.output, "{e}"),
        };
        match self.session.execute(plan, &self.cancel) {
            Ok(report) => {
                self.print_outcome(ProcessVariable::Temperature, &report.temperature)?;
                self.print_outcome(ProcessVariable::Humidity, &report.humidity)
            }
            Err(e) => writeln!(self.output, "{e}"),
        }
    }

    /// Ask for a target and its pace.
    ///
    /// `Ok(None)` at end of input, `Ok(Some(None))` when `optional` and the
    /// operator leaves the target blank.
    fn ask_variable(
        &mut self,
        variable: ProcessVariable,
        current: f64,
        optional: bool,
    ) -> io::Result<Option<Option<(f64, RateSpec)>>> {
        let unit = variable.unit();
        let text = if optional {
            format!("Target {variable} [{unit}] (blank to keep): ")
        } else {
            format!("Target {variable} [{unit}]: ")
        };
        let validator = self.session.validator();
        let target = prompt(&mut self.input, &mut self.output, &text, |s| {
            if optional && s.trim().is_empty() {
                return Ok(None);
            }
            let value = parse_setpoint(s)?;
            match validator.validate_setpoint(variable, value) {
                Verdict::Rejected(reason) => Err(reason.into()),
                _ => Ok(Some(value)),
            }
        })?;
        let target = match target {
            None => return Ok(None),
            Some(None) => return Ok(Some(None)),
            Some(Some(target)) => target,
        };
        if target == current {
            // No ramp will run; pace is irrelevant.
            return Ok(Some(Some((target, RateSpec::PerInterval(0.0)))));
        }

        let by_duration = prompt(
            &mut self.input,
            &mut self.output,
            "Pace by (1) rate per interval or (2) duration in minutes: ",
            |s| match s.trim() {
                "1" => Ok(false),
                "2" => Ok(true),
                other => Err(ControlError::MalformedInput(format!(
                    "'{other}' is not 1 or 2"
                ))),
            },
        )?;
        let Some(by_duration) = by_duration else {
            return Ok(None);
        };

        let text = if by_duration {
            "Duration [min]: ".to_string()
        } else {
            format!("Rate [{unit} per interval]: ")
        };
        let session = &self.session;
        let spec = prompt(&mut self.input, &mut self.output, &text, |s| {
            let value = parse_positive(s)?;
            let spec = if by_duration {
                RateSpec::Duration { minutes: value }
            } else {
                RateSpec::PerInterval(value)
            };
            session.resolve_rate(variable, current, target, spec)?;
            Ok(spec)
        })?;
        Ok(spec.map(|spec| Some((target, spec))))
    }

    fn print_write_errors(&mut self, ramp: &RampOutcome) -> io::Result<()> {
        if let Some(last) = ramp.write_errors.last() {
            writeln!(self.output, "  last failure: {last}")?;
        }
        Ok(())
    }

    fn print_outcome(
        &mut self,
        variable: ProcessVariable,
        outcome: &VariableOutcome,
    ) -> io::Result<()> {
        let unit = variable.unit();
        match outcome {
            VariableOutcome::Ramped(ramp) => {
                match (ramp.status, ramp.last_confirmed) {
                    (RampStatus::DeviceLost, Some(value)) => writeln!(
                        self.output,
                        "{variable} ramp stopped, device connection lost (last confirmed {value} {unit})"
                    )?,
                    (RampStatus::DeviceLost, None) => writeln!(
                        self.output,
                        "{variable} ramp stopped, device connection lost before any step"
                    )?,
                    (status, _) => {
                        let status = match status {
                            RampStatus::Completed => "reached",
                            RampStatus::Cancelled => "cancelled at",
                            _ => "already at",
                        };
                        writeln!(
                            self.output,
                            "{variable} {status} {} {unit} ({} writes, {} failed)",
                            ramp.final_value,
                            ramp.writes,
                            ramp.failed_writes()
                        )?
                    }
                }
                self.print_write_errors(ramp)
            }
            VariableOutcome::Skipped => {
                writeln!(self.output, "{variable} not attempted, device connection lost")
            }
            VariableOutcome::AtTarget(value) => {
                writeln!(self.output, "{variable} already at {value} {unit}")
            }
            VariableOutcome::NotApplicable => {
                writeln!(self.output, "{variable} not applicable")
            }
            VariableOutcome::Unchanged => writeln!(self.output, "{variable} unchanged"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ramp::Sleeper;
    use chamber_common::config::{ChamberConfig, LogLevel, SharedConfig};
    use chamber_hal::{SimulationDriver, SimulationHandle};
    use std::io::Cursor;
    use std::time::Duration;

    #[derive(Clone, Copy)]
    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&mut self, _duration: Duration, _cancel: &CancelToken) {}
    }

    fn config() -> ChamberConfig {
        ChamberConfig {
            shared: SharedConfig {
                log_level: LogLevel::Info,
                service_name: "console-test".to_string(),
            },
            device: Default::default(),
            registers: Default::default(),
            bounds: Default::default(),
            ramp: Default::default(),
            humidity_policy: Default::default(),
        }
    }

    fn run(script: &str, handle_setup: impl FnOnce(&SimulationHandle)) -> (String, SimulationHandle) {
        let config = config();
        let driver = SimulationDriver::connected();
        let handle = driver.handle();
        handle.seed_value(config.registers.temperature, 20.0).unwrap();
        handle.seed_value(config.registers.humidity, 50.0).unwrap();
        handle_setup(&handle);

        let port = SharedPort::from_driver(driver);
        let session = ControlSession::from_config(port.clone(), &config).with_sleeper(NoSleep);
        let lifecycle = ChamberLifecycle::new(port.clone(), &config.registers);
        let mut console = OperatorConsole::new(
            Cursor::new(script.to_string()),
            Vec::new(),
            port,
            session,
            lifecycle,
            CancelToken::new(),
        );
        console.run().unwrap();
        let output = String::from_utf8(console.into_output()).unwrap();
        (output, handle)
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_setpoint(" -12\n").unwrap(), -12.0);
        assert!(matches!(parse_setpoint("12.5"), Err(ControlError::MalformedInput(_))));
        assert!(matches!(parse_setpoint("abc"), Err(ControlError::MalformedInput(_))));
        assert_eq!(parse_positive("2.5").unwrap(), 2.5);
        assert!(matches!(parse_positive("0"), Err(ControlError::MalformedInput(_))));
        assert!(matches!(parse_positive("-1"), Err(ControlError::MalformedInput(_))));
        assert!(matches!(parse_positive("NaN"), Err(ControlError::MalformedInput(_))));
    }

    #[test]
    fn start_then_exit_closes_port() {
        let (output, handle) = run("1\n5\n", |_| {});
        assert!(output.contains("Chamber start confirmed."));
        assert_eq!(handle.writes(), vec![(100, 1)]);
        assert!(!handle.is_open());
    }

    #[test]
    fn start_with_failed_read_reports_unreachable() {
        let (output, handle) = run("1\n5\n", |h| h.fail_reads(100));
        assert!(output.contains("device unreachable"));
        assert!(handle.writes().is_empty());
    }

    #[test]
    fn end_of_input_exits() {
        let (output, handle) = run("", |_| {});
        assert!(output.contains("Chamber Control Menu"));
        assert!(!handle.is_open());
    }

    #[test]
    fn invalid_choice_reprompts() {
        let (output, _) = run("9\n5\n", |_| {});
        assert!(output.contains("Invalid choice '9'"));
        assert!(output.contains("Exiting."));
    }

    #[test]
    fn adjust_reprompts_until_input_is_valid() {
        let script = "3\nabc\n200\n26\n1\n9\n2\n47\n1\n2\n5\n";
        let (output, handle) = run(script, |_| {});

        assert!(output.contains("is not a whole number"));
        assert!(output.contains("outside [-40, 150]"));
        assert!(output.contains("outside [0, 5]"));
        assert_eq!(handle.writes_to(1), vec![22, 24, 26]);
        assert_eq!(handle.writes_to(2), vec![48, 47]);
        assert!(output.contains("temperature reached 26 °C (3 writes, 0 failed)"));
    }

    #[test]
    fn adjust_by_duration() {
        // 20 -> 26 over 3 minutes at a 60 s interval: 2 per step
        let script = "3\n26\n2\n0\n3\n\n5\n";
        let (output, handle) = run(script, |_| {});

        assert!(output.contains("must be greater than 0"));
        assert_eq!(handle.writes_to(1), vec![22, 24, 26]);
        assert!(handle.writes_to(2).is_empty());
        assert!(output.contains("humidity unchanged"));
    }

    #[test]
    fn humidity_not_prompted_outside_window() {
        let script = "3\n-10\n1\n5\n5\n";
        let (output, handle) = run(script, |_| {});

        assert!(output.contains("Humidity control is not applicable"));
        assert!(!output.contains("Target humidity"));
        assert_eq!(handle.writes_to(1), vec![15, 10, 5, 0, -5, -10]);
    }

    #[test]
    fn status_shows_current_values() {
        let (output, _) = run("4\n5\n", |_| {});
        assert!(output.contains("Connection: open"));
        assert!(output.contains("Temperature setpoint: 20 °C"));
        assert!(output.contains("Humidity setpoint: 50 %RH"));
    }

    #[derive(Clone)]
    struct Unplug(SimulationHandle);

    impl Sleeper for Unplug {
        fn sleep(&mut self, _duration: Duration, _cancel: &CancelToken) {
            self.0.set_reachable(false);
        }
    }

    #[test]
    fn lost_connection_is_not_reported_as_reached() {
        let config = config();
        let driver = SimulationDriver::connected();
        let handle = driver.handle();
        handle.seed_value(config.registers.temperature, 20.0).unwrap();
        handle.seed_value(config.registers.humidity, 50.0).unwrap();

        let port = SharedPort::from_driver(driver);
        let session =
            ControlSession::from_config(port.clone(), &config).with_sleeper(Unplug(handle.clone()));
        let lifecycle = ChamberLifecycle::new(port.clone(), &config.registers);
        let mut console = OperatorConsole::new(
            Cursor::new("3\n30\n1\n2\n47\n1\n2\n5\n".to_string()),
            Vec::new(),
            port,
            session,
            lifecycle,
            CancelToken::new(),
        );
        console.run().unwrap();
        let output = String::from_utf8(console.into_output()).unwrap();

        assert!(output.contains("temperature ramp stopped, device connection lost (last confirmed 22 °C)"));
        assert!(output.contains("last failure: Write to register 1 failed"));
        assert!(output.contains("humidity not attempted, device connection lost"));
        assert!(!output.contains("temperature reached"));
        assert_eq!(handle.writes(), vec![(1, 22)]);
    }
}
