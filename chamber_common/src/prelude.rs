//! Prelude module for common re-exports.
//!
//! Consumers can do `use chamber_common::prelude::*;` and get the most
//! important types without listing individual paths.

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    BoundsConfig, ChamberConfig, ConfigError, ConfigLoader, DeviceConfig, HumidityPolicy, RampConfig,
    RegisterMap, SharedConfig, load_config,
};

// ─── Device Port ────────────────────────────────────────────────────
pub use crate::port::{DevicePort, DriverFactory, PortDiagnostics, PortError, SharedPort};

// ─── Process Variables ──────────────────────────────────────────────
pub use crate::types::{Bounds, ProcessVariable, Unit, decode_word, encode_value};
