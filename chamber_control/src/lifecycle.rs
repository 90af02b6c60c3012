//! Chamber start/stop gated by a device state read.
//!
//! Each command reads its state register first. A failed read means the PLC
//! is not answering, and nothing is written. No command is retried; a retry
//! is the operator's decision.

use chamber_common::config::RegisterMap;
use chamber_common::consts::{START_COMMAND, STOP_COMMAND};
use chamber_common::port::{PortError, SharedPort};
use std::fmt;
use tracing::{info, warn};

/// Lifecycle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Start the chamber program.
    Start,
    /// Stop the chamber program.
    Stop,
}

impl LifecycleAction {
    /// Word written to the command register.
    pub const fn command(self) -> u16 {
        match self {
            LifecycleAction::Start => START_COMMAND,
            LifecycleAction::Stop => STOP_COMMAND,
        }
    }

    /// Lowercase name used in log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            LifecycleAction::Start => "start",
            LifecycleAction::Stop => "stop",
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a lifecycle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// State read and command written.
    Confirmed,
    /// Port closed or state read failed; nothing written.
    DeviceUnreachable,
    /// State read succeeded but the command write failed.
    WriteFailed,
}

impl Outcome {
    /// Lowercase name used in log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Outcome::Confirmed => "confirmed",
            Outcome::DeviceUnreachable => "device_unreachable",
            Outcome::WriteFailed => "write_failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full report of a lifecycle command.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleReport {
    /// Command issued.
    pub action: LifecycleAction,
    /// How it ended.
    pub outcome: Outcome,
    /// State register word read before the write.
    pub observed: Option<u16>,
    /// Port error behind a non-confirmed outcome.
    pub error: Option<PortError>,
}

/// Start/stop controller.
#[derive(Debug, Clone)]
pub struct ChamberLifecycle {
    port: SharedPort,
    start_register: u16,
    stop_register: u16,
}

impl ChamberLifecycle {
    /// Controller over the configured start and stop registers.
    pub fn new(port: SharedPort, registers: &RegisterMap) -> Self {
        Self {
            port,
            start_register: registers.chamber_start,
            stop_register: registers.chamber_stop,
        }
    }

    /// Start the chamber.
    pub fn start(&self) -> LifecycleReport {
        self.execute(LifecycleAction::Start)
    }

    /// Stop the chamber.
    pub fn stop(&self) -> LifecycleReport {
        self.execute(LifecycleAction::Stop)
    }

    /// Read the action's state register, then write its command word.
    ///
    /// The port is held across the read and the write.
    pub fn execute(&self, action: LifecycleAction) -> LifecycleReport {
        let register = match action {
            LifecycleAction::Start => self.start_register,
            LifecycleAction::Stop => self.stop_register,
        };

        let report = {
            let mut port = self.port.lock();
            if !port.is_open() {
                unreachable_report(action, PortError::NotConnected)
            } else {
                match port.read_register(register) {
                    Err(e) => unreachable_report(action, e),
                    Ok(observed) => match port.write_register(register, action.command()) {
                        Ok(()) => LifecycleReport {
                            action,
                            outcome: Outcome::Confirmed,
                            observed: Some(observed),
                            error: None,
                        },
                        Err(e) => LifecycleReport {
                            action,
                            outcome: Outcome::WriteFailed,
                            observed: Some(observed),
                            error: Some(e),
                        },
                    },
                }
            }
        };

        match &report.error {
            None => info!(
                action = %action,
                outcome = %report.outcome,
                register,
                observed = ?report.observed,
                "lifecycle_outcome"
            ),
            Some(e) => warn!(
                action = %action,
                outcome = %report.outcome,
                register,
                error = %e,
                "lifecycle_outcome"
            ),
        }
        report
    }
}

fn unreachable_report(action: LifecycleAction, error: PortError) -> LifecycleReport {
    LifecycleReport {
        action,
        outcome: Outcome::DeviceUnreachable,
        observed: None,
        error: Some(error),
    }
}
