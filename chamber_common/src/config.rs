//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! and the configuration tree of the chamber controller.
//!
//! # Usage
//!
//! ```rust,no_run
//! use chamber_common::config::{load_config, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = load_config(Path::new("chamber.toml"))?;
//!     println!("PLC at {}", config.device.address());
//!     Ok(())
//! }
//! ```

use crate::consts::{
    DEFAULT_HUMIDITY_REGISTER, DEFAULT_MODBUS_PORT, DEFAULT_RAMP_INTERVAL_SECS,
    DEFAULT_START_REGISTER, DEFAULT_STOP_REGISTER, DEFAULT_TEMPERATURE_REGISTER,
    DEFAULT_TIMEOUT_MS, DEFAULT_UNIT_ID, HUMIDITY_WINDOW_MAX_TEMPERATURE,
    HUMIDITY_WINDOW_MIN_TEMPERATURE, MAX_HUMIDITY, MAX_HUMIDITY_RATE, MAX_TEMPERATURE,
    MAX_TEMPERATURE_RATE, MIN_HUMIDITY, MIN_TEMPERATURE,
};
use crate::types::{Bounds, ProcessVariable};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "chamber-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for every `serde::de::DeserializeOwned` type.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

fn default_host() -> String {
    "192.168.3.50".to_string()
}

fn default_port() -> u16 {
    DEFAULT_MODBUS_PORT
}

fn default_unit_id() -> u8 {
    DEFAULT_UNIT_ID
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Connection parameters of the chamber PLC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// PLC host name or IP address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Modbus TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Modbus unit (slave) id.
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    /// Connect and response timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            unit_id: default_unit_id(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl DeviceConfig {
    /// `host:port` string.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Holding register addresses on the PLC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterMap {
    /// Chamber start command / state register.
    pub chamber_start: u16,
    /// Chamber stop command / state register.
    pub chamber_stop: u16,
    /// Temperature setpoint register.
    pub temperature: u16,
    /// Humidity setpoint register.
    pub humidity: u16,
    /// Thermocouple status register (reads 1 when connected). Optional.
    #[serde(default)]
    pub thermocouple_status: Option<u16>,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            chamber_start: DEFAULT_START_REGISTER,
            chamber_stop: DEFAULT_STOP_REGISTER,
            temperature: DEFAULT_TEMPERATURE_REGISTER,
            humidity: DEFAULT_HUMIDITY_REGISTER,
            thermocouple_status: None,
        }
    }
}

impl RegisterMap {
    /// Setpoint register of a process variable.
    pub fn for_variable(&self, variable: ProcessVariable) -> u16 {
        match variable {
            ProcessVariable::Temperature => self.temperature,
            ProcessVariable::Humidity => self.humidity,
        }
    }
}

fn default_temperature_bounds() -> Bounds {
    Bounds {
        min_setpoint: MIN_TEMPERATURE,
        max_setpoint: MAX_TEMPERATURE,
        min_rate: 0.0,
        max_rate: MAX_TEMPERATURE_RATE,
    }
}

fn default_humidity_bounds() -> Bounds {
    Bounds {
        min_setpoint: MIN_HUMIDITY,
        max_setpoint: MAX_HUMIDITY,
        min_rate: 0.0,
        max_rate: MAX_HUMIDITY_RATE,
    }
}

/// Per-variable safety envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoundsConfig {
    /// Temperature envelope [°C].
    #[serde(default = "default_temperature_bounds")]
    pub temperature: Bounds,
    /// Humidity envelope [%RH].
    #[serde(default = "default_humidity_bounds")]
    pub humidity: Bounds,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature_bounds(),
            humidity: default_humidity_bounds(),
        }
    }
}

impl BoundsConfig {
    /// Envelope of a process variable.
    pub fn for_variable(&self, variable: ProcessVariable) -> &Bounds {
        match variable {
            ProcessVariable::Temperature => &self.temperature,
            ProcessVariable::Humidity => &self.humidity,
        }
    }
}

fn default_interval_secs() -> f64 {
    DEFAULT_RAMP_INTERVAL_SECS
}

/// Ramp pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RampConfig {
    /// Seconds between two ramp steps. Rates are expressed per interval.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl RampConfig {
    /// Step interval as a `Duration` (zero if the value is not representable).
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_secs).unwrap_or(Duration::ZERO)
    }
}

/// When a humidity setpoint applies.
///
/// The chamber can only regulate humidity inside a temperature window.
/// Outside it a humidity request is "not applicable", which is reported as
/// such and never coerced into a zero setpoint.
///
/// # TOML Example
///
/// ```toml
/// [humidity_policy]
/// mode = "temperature_window"
/// min_temperature = 20.0
/// max_temperature = 80.0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum HumidityPolicy {
    /// Humidity is always controlled.
    Always,
    /// Humidity is controlled only when the temperature target lies inside
    /// `[min_temperature, max_temperature]`.
    TemperatureWindow {
        /// Lowest temperature target with meaningful humidity control.
        min_temperature: f64,
        /// Highest temperature target with meaningful humidity control.
        max_temperature: f64,
    },
}

impl Default for HumidityPolicy {
    fn default() -> Self {
        HumidityPolicy::TemperatureWindow {
            min_temperature: HUMIDITY_WINDOW_MIN_TEMPERATURE,
            max_temperature: HUMIDITY_WINDOW_MAX_TEMPERATURE,
        }
    }
}

/// Complete configuration of the chamber controller, loaded once at startup.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "chamber-01"
///
/// [device]
/// host = "192.168.3.50"
/// port = 502
///
/// [registers]
/// chamber_start = 100
/// chamber_stop = 101
/// temperature = 1
/// humidity = 2
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChamberConfig {
    /// Logging and identity.
    pub shared: SharedConfig,
    /// PLC connection.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Register addresses.
    #[serde(default)]
    pub registers: RegisterMap,
    /// Safety envelopes.
    #[serde(default)]
    pub bounds: BoundsConfig,
    /// Ramp pacing.
    #[serde(default)]
    pub ramp: RampConfig,
    /// Humidity applicability.
    #[serde(default)]
    pub humidity_policy: HumidityPolicy,
}

impl ChamberConfig {
    /// Validate the configuration.
    ///
    /// # Validation Rules
    /// 1. `shared.service_name` not empty
    /// 2. `device.host` not empty, `device.port` > 0, `device.timeout_ms` > 0
    /// 3. `ramp.interval_secs` finite and > 0
    /// 4. Each envelope consistent (see [`Bounds::check`])
    /// 5. Start, stop, temperature and humidity registers distinct
    /// 6. Humidity window ordered
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.device.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "device.host cannot be empty".to_string(),
            ));
        }
        if self.device.port == 0 {
            return Err(ConfigError::ValidationError(
                "device.port must be greater than 0".to_string(),
            ));
        }
        if self.device.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "device.timeout_ms must be greater than 0".to_string(),
            ));
        }

        if !self.ramp.interval_secs.is_finite() || self.ramp.interval_secs <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "ramp.interval_secs must be greater than 0 (got {})",
                self.ramp.interval_secs
            )));
        }

        for variable in ProcessVariable::ALL {
            self.bounds
                .for_variable(variable)
                .check()
                .map_err(|e| ConfigError::ValidationError(format!("bounds.{variable}: {e}")))?;
        }

        let regs = &self.registers;
        let mut seen = HashSet::new();
        for (name, address) in [
            ("chamber_start", regs.chamber_start),
            ("chamber_stop", regs.chamber_stop),
            ("temperature", regs.temperature),
            ("humidity", regs.humidity),
        ] {
            if !seen.insert(address) {
                return Err(ConfigError::ValidationError(format!(
                    "registers.{name} reuses address {address}"
                )));
            }
        }

        if let HumidityPolicy::TemperatureWindow {
            min_temperature,
            max_temperature,
        } = self.humidity_policy
        {
            if !(min_temperature.is_finite() && max_temperature.is_finite())
                || min_temperature > max_temperature
            {
                return Err(ConfigError::ValidationError(format!(
                    "humidity_policy window [{min_temperature}, {max_temperature}] is invalid"
                )));
            }
        }

        Ok(())
    }
}

/// Load and validate a chamber configuration file.
pub fn load_config(path: &Path) -> Result<ChamberConfig, ConfigError> {
    let config = ChamberConfig::load(path)?;
    config.validate()?;
    tracing::debug!(
        service = %config.shared.service_name,
        device = %config.device.address(),
        "configuration loaded"
    );
    Ok(config)
}
