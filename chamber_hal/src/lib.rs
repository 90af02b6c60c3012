//! # Chamber HAL Library
//!
//! Device port drivers for the environmental chamber PLC.
//! Drivers implement the `DevicePort` trait defined in `chamber_common::port`.
//!
//! # Module Structure
//!
//! - [`driver_registry`] - Driver factory registration
//! - [`drivers`] - Driver implementations (Modbus TCP, simulation)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    chamber_hal                               │
//! │  ┌──────────────────┐        ┌────────────────────────────┐  │
//! │  │  DriverRegistry  │──────► │  DevicePort (trait object) │  │
//! │  └──────────────────┘        └─────────────┬──────────────┘  │
//! │                                 ┌──────────┴──────────┐      │
//! │                                 ▼                     ▼      │
//! │                        ModbusTcpDriver     SimulationDriver  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod driver_registry;
pub mod drivers;

// Re-export key types for convenience
pub use crate::driver_registry::DriverRegistry;
pub use crate::drivers::modbus_tcp::ModbusTcpDriver;
pub use crate::drivers::simulation::{SimulationDriver, SimulationHandle};
