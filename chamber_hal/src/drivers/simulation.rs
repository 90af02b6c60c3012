//! Simulation driver.
//!
//! An in-memory holding-register bank standing in for the chamber PLC.
//! Unwritten registers read as 0, like a freshly powered PLC.
//!
//! A [`SimulationHandle`] shares the register bank with the driver after
//! the driver has been boxed into a `SharedPort`, so callers can seed
//! registers, inject faults and inspect the write log:
//!
//! - per-address read and write faults (answered with a device exception)
//! - an offline switch (connect fails, open connections drop)
//!
//! The write log keeps the most recent [`WRITE_LOG_CAPACITY`] writes.

use chamber_common::config::DeviceConfig;
use chamber_common::port::{DevicePort, PortDiagnostics, PortError};
use chamber_common::types::encode_value;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// One-line description shown to the operator.
pub const DRIVER_DESCRIPTION: &str = "In-memory PLC for dry runs";

/// Registry name of this driver.
pub const DRIVER_NAME: &str = "simulation";

/// Writes kept in the log before the oldest are dropped.
pub const WRITE_LOG_CAPACITY: usize = 1024;

/// Exception detail reported for injected faults.
const INJECTED_FAULT: &str = "SlaveDeviceFailure (simulated)";

/// Factory function for the driver registry.
pub fn create_driver() -> Box<dyn DevicePort> {
    Box::new(SimulationDriver::new())
}

#[derive(Debug)]
struct SimulatedPlc {
    registers: HashMap<u16, u16>,
    failing_reads: HashSet<u16>,
    failing_writes: HashSet<u16>,
    reachable: bool,
    open: bool,
    write_log: VecDeque<(u16, u16)>,
    diagnostics: PortDiagnostics,
}

impl Default for SimulatedPlc {
    fn default() -> Self {
        Self {
            registers: HashMap::new(),
            failing_reads: HashSet::new(),
            failing_writes: HashSet::new(),
            reachable: true,
            open: false,
            write_log: VecDeque::new(),
            diagnostics: PortDiagnostics::default(),
        }
    }
}

impl SimulatedPlc {
    fn check_link(&mut self) -> Result<(), PortError> {
        if !self.open {
            return Err(PortError::NotConnected);
        }
        if !self.reachable {
            self.open = false;
            return Err(PortError::CommunicationError(
                "simulated PLC offline".to_string(),
            ));
        }
        Ok(())
    }
}

/// Simulation driver implementing the `DevicePort` trait.
pub struct SimulationDriver {
    plc: Arc<Mutex<SimulatedPlc>>,
}

impl SimulationDriver {
    /// Create a simulated PLC with an empty register bank.
    pub fn new() -> Self {
        Self {
            plc: Arc::new(Mutex::new(SimulatedPlc::default())),
        }
    }

    /// Create a simulated PLC that is already connected.
    pub fn connected() -> Self {
        let driver = Self::new();
        driver.plc.lock().open = true;
        driver
    }

    /// Handle sharing this driver's register bank.
    pub fn handle(&self) -> SimulationHandle {
        SimulationHandle {
            plc: Arc::clone(&self.plc),
        }
    }
}

impl Default for SimulationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DevicePort for SimulationDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn open(&mut self, config: &DeviceConfig) -> Result<(), PortError> {
        let mut plc = self.plc.lock();
        if !plc.reachable {
            return Err(PortError::ConnectFailed(format!(
                "{}: simulated PLC offline",
                config.address()
            )));
        }
        plc.open = true;
        info!(
            "Simulation driver connected (standing in for {})",
            config.address()
        );
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.plc.lock().open
    }

    fn read_register(&mut self, address: u16) -> Result<u16, PortError> {
        let mut plc = self.plc.lock();
        if let Err(e) = plc.check_link() {
            plc.diagnostics.failed_reads += 1;
            return Err(e);
        }
        if plc.failing_reads.contains(&address) {
            plc.diagnostics.failed_reads += 1;
            return Err(PortError::Exception {
                address,
                detail: INJECTED_FAULT.to_string(),
            });
        }

        let value = plc.registers.get(&address).copied().unwrap_or(0);
        plc.diagnostics.reads += 1;
        trace!(address, value, "simulated read");
        Ok(value)
    }

    fn write_register(&mut self, address: u16, value: u16) -> Result<(), PortError> {
        let mut plc = self.plc.lock();
        if let Err(e) = plc.check_link() {
            plc.diagnostics.failed_writes += 1;
            return Err(e);
        }
        if plc.failing_writes.contains(&address) {
            plc.diagnostics.failed_writes += 1;
            return Err(PortError::Exception {
                address,
                detail: INJECTED_FAULT.to_string(),
            });
        }

        plc.registers.insert(address, value);
        if plc.write_log.len() == WRITE_LOG_CAPACITY {
            plc.write_log.pop_front();
        }
        plc.write_log.push_back((address, value));
        plc.diagnostics.writes += 1;
        trace!(address, value, "simulated write");
        Ok(())
    }

    fn close(&mut self) -> Result<(), PortError> {
        let mut plc = self.plc.lock();
        if plc.open {
            debug!("Simulation driver disconnected");
        }
        plc.open = false;
        Ok(())
    }

    fn diagnostics(&self) -> Option<PortDiagnostics> {
        let plc = self.plc.lock();
        let mut diagnostics = plc.diagnostics.clone();
        diagnostics.custom = Some(format!("registers={}", plc.registers.len()));
        Some(diagnostics)
    }
}

/// Control and inspection handle for a [`SimulationDriver`].
#[derive(Clone)]
pub struct SimulationHandle {
    plc: Arc<Mutex<SimulatedPlc>>,
}

impl SimulationHandle {
    /// Set a raw register word without logging it as a write.
    pub fn seed(&self, address: u16, word: u16) {
        self.plc.lock().registers.insert(address, word);
    }

    /// Set a register from a process value (rounded, two's complement).
    ///
    /// # Errors
    /// `PortError::ValueOutOfRange` if the value does not fit a register.
    pub fn seed_value(&self, address: u16, value: f64) -> Result<(), PortError> {
        let word = encode_value(value)?;
        self.seed(address, word);
        Ok(())
    }

    /// Current raw word of a register, `None` if never set.
    pub fn register(&self, address: u16) -> Option<u16> {
        self.plc.lock().registers.get(&address).copied()
    }

    /// Make reads of `address` fail with a device exception.
    pub fn fail_reads(&self, address: u16) {
        self.plc.lock().failing_reads.insert(address);
    }

    /// Make writes to `address` fail with a device exception.
    pub fn fail_writes(&self, address: u16) {
        self.plc.lock().failing_writes.insert(address);
    }

    /// Remove all injected read/write faults.
    pub fn clear_faults(&self) {
        let mut plc = self.plc.lock();
        plc.failing_reads.clear();
        plc.failing_writes.clear();
    }

    /// Take the simulated PLC off the network (or bring it back).
    pub fn set_reachable(&self, reachable: bool) {
        self.plc.lock().reachable = reachable;
    }

    /// Whether the driver currently holds a connection.
    pub fn is_open(&self) -> bool {
        self.plc.lock().open
    }

    /// Recent successful writes, oldest first, as `(address, word)`.
    pub fn writes(&self) -> Vec<(u16, u16)> {
        self.plc.lock().write_log.iter().copied().collect()
    }

    /// Successful writes to one register, decoded as signed values.
    pub fn writes_to(&self, address: u16) -> Vec<i16> {
        self.plc
            .lock()
            .write_log
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, word)| *word as i16)
            .collect()
    }

    /// Forget the write log.
    pub fn clear_writes(&self) {
        self.plc.lock().write_log.clear();
    }
}
