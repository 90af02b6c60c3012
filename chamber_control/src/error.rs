//! Controller error taxonomy.
//!
//! None of these terminate the process. The operator decides when to exit.

use crate::bounds::RejectReason;
use chamber_common::config::ConfigError;
use chamber_common::port::PortError;
use chamber_common::types::ProcessVariable;
use thiserror::Error;

/// Errors surfaced by the chamber controllers.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Setpoint or rate outside the envelope. No device contact was made.
    #[error("Request rejected: {0}")]
    ValidationRejected(#[from] RejectReason),

    /// Connection not open or a read failed. No write was attempted.
    #[error("Device unreachable: {0}")]
    DeviceUnreachable(#[source] PortError),

    /// A single register write failed.
    #[error("Write to register {address} failed: {source}")]
    WriteFailed {
        /// Register the write addressed.
        address: u16,
        /// Underlying port error.
        source: PortError,
    },

    /// Operator input could not be parsed or is not a positive number.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A ramp request was handed to the controller of another variable.
    #[error("{request} request given to the {controller} ramp controller")]
    VariableMismatch {
        /// Variable the controller drives.
        controller: ProcessVariable,
        /// Variable the request names.
        request: ProcessVariable,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Driver selection or connection setup failed.
    #[error("Device port error: {0}")]
    Port(#[from] PortError),
}

impl ControlError {
    /// True for errors the operator fixes by re-entering input.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ControlError::ValidationRejected(_) | ControlError::MalformedInput(_)
        )
    }
}
