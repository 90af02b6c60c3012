//! Device port driver implementations.
//!
//! - [`modbus_tcp`] - Modbus TCP holding-register driver for the chamber PLC
//! - [`simulation`] - In-memory register bank for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `DevicePort` trait from `chamber_common::port`
//! 3. Register the driver in [`register_all_drivers`]

pub mod modbus_tcp;
pub mod simulation;

use crate::driver_registry::DriverRegistry;

/// Register all built-in drivers.
pub fn register_all_drivers(registry: &mut DriverRegistry) {
    registry.register(
        modbus_tcp::DRIVER_NAME,
        modbus_tcp::DRIVER_DESCRIPTION,
        modbus_tcp::create_driver,
    );
    registry.register(
        simulation::DRIVER_NAME,
        simulation::DRIVER_DESCRIPTION,
        simulation::create_driver,
    );
}
