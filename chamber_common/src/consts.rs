//! Workspace-wide constants.
//!
//! Single source of truth for default register addresses, operating limits
//! and timings. The defaults describe the reference chamber installation.

/// Default Modbus TCP port.
pub const DEFAULT_MODBUS_PORT: u16 = 502;

/// Default Modbus unit (slave) id.
pub const DEFAULT_UNIT_ID: u8 = 1;

/// Default connect/response timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Holding register that starts the chamber when written with [`START_COMMAND`].
pub const DEFAULT_START_REGISTER: u16 = 100;

/// Holding register that stops the chamber when written with [`STOP_COMMAND`].
pub const DEFAULT_STOP_REGISTER: u16 = 101;

/// Programmer run setpoint (temperature) register.
pub const DEFAULT_TEMPERATURE_REGISTER: u16 = 1;

/// Segment setpoint register used for humidity.
pub const DEFAULT_HUMIDITY_REGISTER: u16 = 2;

/// Value written to the start register.
pub const START_COMMAND: u16 = 1;

/// Value written to the stop register.
pub const STOP_COMMAND: u16 = 0;

/// Thermocouple status register value meaning "connected".
pub const THERMOCOUPLE_CONNECTED: u16 = 1;

/// Default ramp step interval in seconds.
pub const DEFAULT_RAMP_INTERVAL_SECS: f64 = 60.0;

/// Temperature envelope [°C].
pub const MIN_TEMPERATURE: f64 = -40.0;
/// Temperature envelope [°C].
pub const MAX_TEMPERATURE: f64 = 150.0;
/// Maximum temperature change per ramp interval [°C].
pub const MAX_TEMPERATURE_RATE: f64 = 5.0;

/// Humidity envelope [%RH].
pub const MIN_HUMIDITY: f64 = 20.0;
/// Humidity envelope [%RH].
pub const MAX_HUMIDITY: f64 = 90.0;
/// Maximum humidity change per ramp interval [%RH].
pub const MAX_HUMIDITY_RATE: f64 = 5.0;

/// Temperature window in which a humidity setpoint is meaningful [°C].
pub const HUMIDITY_WINDOW_MIN_TEMPERATURE: f64 = 20.0;
/// Temperature window in which a humidity setpoint is meaningful [°C].
pub const HUMIDITY_WINDOW_MAX_TEMPERATURE: f64 = 80.0;

/// Default configuration file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/chamber.toml";
