//! Device backend selection for the chamber controller.
//!
//! The binary picks how it reaches the chamber PLC at startup: the Modbus
//! TCP driver for a real controller, or the in-memory simulation for dry
//! runs. Each backend registers a name, a one-line description for the
//! operator and a factory. Backends are kept in registration order so the
//! "available drivers" hint reads the same on every run.

use crate::drivers::register_all_drivers;
use chamber_common::port::{DevicePort, DriverFactory, PortError};
use tracing::{debug, warn};

/// One selectable device backend.
#[derive(Clone, Copy)]
struct Backend {
    name: &'static str,
    description: &'static str,
    factory: DriverFactory,
}

/// Device backends the controller can start with.
pub struct DriverRegistry {
    backends: Vec<Backend>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Registry holding the Modbus TCP and simulation backends.
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        register_all_drivers(&mut registry);
        registry
    }

    /// Add a backend. A name that is already taken keeps its first
    /// registration; returns `false` in that case.
    pub fn register(
        &mut self,
        name: &'static str,
        description: &'static str,
        factory: DriverFactory,
    ) -> bool {
        if self.backends.iter().any(|b| b.name == name) {
            warn!("Driver '{name}' already registered, keeping the first one");
            return false;
        }
        self.backends.push(Backend {
            name,
            description,
            factory,
        });
        true
    }

    /// Create the backend registered under `name`. The port is not opened.
    ///
    /// # Errors
    /// `PortError::DriverNotFound` if no backend has that name.
    pub fn create_driver(&self, name: &str) -> Result<Box<dyn DevicePort>, PortError> {
        let backend = self
            .backends
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| PortError::DriverNotFound(name.to_string()))?;
        debug!(driver = backend.name, "Creating device driver");
        Ok((backend.factory)())
    }

    /// Registered backend names, in registration order.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name).collect()
    }

    /// `name - description` lines for operator help.
    pub fn describe(&self) -> Vec<String> {
        self.backends
            .iter()
            .map(|b| format!("{} - {}", b.name, b.description))
            .collect()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::simulation::SimulationDriver;

    fn simulation_factory() -> Box<dyn DevicePort> {
        Box::new(SimulationDriver::connected())
    }

    #[test]
    fn register_and_create() {
        let mut reg = DriverRegistry::new();
        assert!(reg.register("bench", "pre-connected simulation", simulation_factory));

        let driver = reg.create_driver("bench").unwrap();
        assert_eq!(driver.name(), "simulation");
        assert!(driver.is_open());
    }

    #[test]
    fn unknown_driver_not_found() {
        let reg = DriverRegistry::new();
        let result = reg.create_driver("canopen");
        assert!(matches!(result, Err(PortError::DriverNotFound(name)) if name == "canopen"));
    }

    #[test]
    fn builtin_backends_in_registration_order() {
        let reg = DriverRegistry::with_builtin_drivers();
        assert_eq!(reg.list_drivers(), vec!["modbus_tcp", "simulation"]);
        assert!(reg.describe()[0].starts_with("modbus_tcp - "));

        let driver = reg.create_driver("simulation").unwrap();
        assert_eq!(driver.name(), "simulation");
        assert!(!driver.is_open());
    }

    #[test]
    fn duplicate_name_keeps_first() {
        let mut reg = DriverRegistry::with_builtin_drivers();
        assert!(!reg.register("modbus_tcp", "impostor", simulation_factory));

        assert_eq!(reg.list_drivers(), vec!["modbus_tcp", "simulation"]);
        assert_eq!(reg.create_driver("modbus_tcp").unwrap().name(), "modbus_tcp");
    }
}
