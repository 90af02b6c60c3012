//! Fresh reads of process values and sensor status.

use crate::error::ControlError;
use chamber_common::config::RegisterMap;
use chamber_common::consts::THERMOCOUPLE_CONNECTED;
use chamber_common::port::{DevicePort, PortError, SharedPort};
use chamber_common::types::{ProcessVariable, decode_word};
use tracing::debug;

/// Read one register as a signed process value.
///
/// Fails with `DeviceUnreachable` without touching the wire when the port
/// is closed.
pub(crate) fn read_value(port: &mut dyn DevicePort, address: u16) -> Result<f64, ControlError> {
    if !port.is_open() {
        return Err(ControlError::DeviceUnreachable(PortError::NotConnected));
    }
    port.read_register(address)
        .map(decode_word)
        .map_err(ControlError::DeviceUnreachable)
}

/// Current temperature and humidity, read in one lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSnapshot {
    /// Temperature register value [°C].
    pub temperature: f64,
    /// Humidity register value [%RH].
    pub humidity: f64,
}

impl ProcessSnapshot {
    /// Value of one variable.
    pub fn get(&self, variable: ProcessVariable) -> f64 {
        match variable {
            ProcessVariable::Temperature => self.temperature,
            ProcessVariable::Humidity => self.humidity,
        }
    }
}

/// Thermocouple wiring as reported by the PLC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermocoupleStatus {
    /// Status register reads 1.
    Connected,
    /// Status register holds another value.
    Disconnected(u16),
    /// No status register configured.
    NotConfigured,
}

/// Read-only access to the chamber's process registers.
#[derive(Debug, Clone)]
pub struct ChamberProbe {
    port: SharedPort,
    registers: RegisterMap,
}

impl ChamberProbe {
    /// Probe over the configured register map.
    pub fn new(port: SharedPort, registers: &RegisterMap) -> Self {
        Self {
            port,
            registers: registers.clone(),
        }
    }

    /// Fresh read of one variable.
    pub fn read_variable(&self, variable: ProcessVariable) -> Result<f64, ControlError> {
        let mut port = self.port.lock();
        read_value(&mut **port, self.registers.for_variable(variable))
    }

    /// Fresh read of both variables.
    pub fn snapshot(&self) -> Result<ProcessSnapshot, ControlError> {
        let mut port = self.port.lock();
        let temperature = read_value(&mut **port, self.registers.temperature)?;
        let humidity = read_value(&mut **port, self.registers.humidity)?;
        debug!(temperature, humidity, "Process snapshot");
        Ok(ProcessSnapshot {
            temperature,
            humidity,
        })
    }

    /// Thermocouple status, if a status register is configured.
    pub fn thermocouple(&self) -> Result<ThermocoupleStatus, ControlError> {
        let Some(address) = self.registers.thermocouple_status else {
            return Ok(ThermocoupleStatus::NotConfigured);
        };
        let mut port = self.port.lock();
        if !port.is_open() {
            return Err(ControlError::DeviceUnreachable(PortError::NotConnected));
        }
        let word = port
            .read_register(address)
            .map_err(ControlError::DeviceUnreachable)?;
        Ok(if word == THERMOCOUPLE_CONNECTED {
            ThermocoupleStatus::Connected
        } else {
            ThermocoupleStatus::Disconnected(word)
        })
    }
}
