//! Device port trait and error types.
//!
//! This module defines:
//! - `DevicePort` trait - Register-level interface to the chamber PLC
//! - `PortError` enum - Error types for port operations
//! - `DriverFactory` type alias - Factory function type
//! - `SharedPort` - Mutex-guarded handle passed to every controller
//! - `PortDiagnostics` struct - Optional driver counters

use crate::config::DeviceConfig;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error types for device port operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PortError {
    /// The port has no open connection.
    #[error("Device not connected")]
    NotConnected,

    /// Opening the connection failed.
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// Transport-level failure (timeout, reset, framing).
    #[error("Communication error: {0}")]
    CommunicationError(String),

    /// The device answered with a protocol exception.
    #[error("Device exception at register {address}: {detail}")]
    Exception {
        /// Register the request addressed.
        address: u16,
        /// Exception code reported by the device.
        detail: String,
    },

    /// A process value cannot be represented as a register word.
    #[error("Value {0} does not fit a 16-bit register")]
    ValueOutOfRange(f64),

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn() -> Box<dyn DevicePort>;

/// Optional driver counters.
#[derive(Debug, Clone, Default)]
pub struct PortDiagnostics {
    /// Successful register reads
    pub reads: u64,
    /// Successful register writes
    pub writes: u64,
    /// Failed register reads
    pub failed_reads: u64,
    /// Failed register writes
    pub failed_writes: u64,
    /// Driver-specific details
    pub custom: Option<String>,
}

/// Register-level interface to the chamber PLC.
///
/// Controllers depend only on this trait, so the Modbus TCP driver and the
/// simulation driver are interchangeable.
///
/// # Lifecycle
///
/// 1. `open()` - Called once at startup with the device configuration
/// 2. `read_register()` / `write_register()` - One holding register per call
/// 3. `close()` - Called when the operator exits
///
/// Every call is a single attempt. Drivers do not retry.
pub trait DevicePort: Send {
    /// Returns the driver's unique identifier (e.g., "modbus_tcp", "simulation").
    fn name(&self) -> &'static str;

    /// Open the connection to the device.
    ///
    /// # Errors
    /// `PortError::ConnectFailed` if the device cannot be reached.
    fn open(&mut self, config: &DeviceConfig) -> Result<(), PortError>;

    /// Liveness predicate: true while a connection is held.
    fn is_open(&self) -> bool;

    /// Read one holding register.
    fn read_register(&mut self, address: u16) -> Result<u16, PortError>;

    /// Write one holding register.
    fn write_register(&mut self, address: u16, value: u16) -> Result<(), PortError>;

    /// Close the connection. Closing a closed port is a no-op.
    fn close(&mut self) -> Result<(), PortError>;

    /// Get driver counters.
    /// Default: None
    fn diagnostics(&self) -> Option<PortDiagnostics> {
        None
    }
}

/// Shared, serialized handle to the single device port.
///
/// Only one logical operation may hold the port at a time. A ramp keeps the
/// guard for its whole run; a lifecycle command keeps it across its
/// read-then-write.
#[derive(Clone)]
pub struct SharedPort {
    inner: Arc<Mutex<Box<dyn DevicePort>>>,
}

impl SharedPort {
    /// Wrap a boxed driver.
    pub fn new(port: Box<dyn DevicePort>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(port)),
        }
    }

    /// Wrap a concrete driver.
    pub fn from_driver<D: DevicePort + 'static>(driver: D) -> Self {
        Self::new(Box::new(driver))
    }

    /// Acquire exclusive access to the port.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn DevicePort>> {
        self.inner.lock()
    }

    /// Liveness check that only holds the lock for the duration of the call.
    pub fn is_open(&self) -> bool {
        self.inner.lock().is_open()
    }
}

impl fmt::Debug for SharedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Some(port) => f
                .debug_struct("SharedPort")
                .field("driver", &port.name())
                .field("open", &port.is_open())
                .finish(),
            None => f.debug_struct("SharedPort").field("driver", &"<busy>").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct TestPort {
        open: bool,
        registers: HashMap<u16, u16>,
    }

    impl DevicePort for TestPort {
        fn name(&self) -> &'static str {
            "test"
        }

        fn open(&mut self, _config: &DeviceConfig) -> Result<(), PortError> {
            self.open = true;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn read_register(&mut self, address: u16) -> Result<u16, PortError> {
            self.registers
                .get(&address)
                .copied()
                .ok_or(PortError::Exception {
                    address,
                    detail: "IllegalDataAddress".to_string(),
                })
        }

        fn write_register(&mut self, address: u16, value: u16) -> Result<(), PortError> {
            self.registers.insert(address, value);
            Ok(())
        }

        fn close(&mut self) -> Result<(), PortError> {
            self.open = false;
            Ok(())
        }
    }

    #[test]
    fn test_port_error_display() {
        let err = PortError::ConnectFailed("10.0.0.1:502 refused".to_string());
        assert!(err.to_string().contains("refused"));

        let err = PortError::Exception {
            address: 100,
            detail: "IllegalDataAddress".to_string(),
        };
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn test_shared_port_serializes_access() {
        let port = SharedPort::from_driver(TestPort::default());
        let clone = port.clone();

        {
            let mut guard = port.lock();
            guard.open(&DeviceConfig::default()).unwrap();
            guard.write_register(1, 42).unwrap();
            assert!(clone.inner.try_lock().is_none());
        }

        assert!(clone.is_open());
        assert_eq!(clone.lock().read_register(1).unwrap(), 42);
    }

    #[test]
    fn test_port_diagnostics_default() {
        let diag = PortDiagnostics::default();
        assert_eq!(diag.reads, 0);
        assert_eq!(diag.failed_writes, 0);
        assert!(diag.custom.is_none());
    }

    #[test]
    fn test_shared_port_debug_names_driver() {
        let port = SharedPort::from_driver(TestPort::default());
        assert!(format!("{port:?}").contains("test"));
    }
}
