//! # Chamber Control Binary
//!
//! Operator console for an environmental chamber PLC: start/stop, bounded
//! temperature and humidity ramps, status.
//!
//! # Usage
//!
//! ```bash
//! # Talk to the PLC configured in chamber.toml
//! chamber_control --config config/chamber.toml
//!
//! # Dry run against the in-memory PLC
//! chamber_control --config config/chamber.toml --simulate
//!
//! # Verbose JSON logs
//! chamber_control -c config/chamber.toml -s -v --json
//! ```

#![deny(warnings)]

use chamber_common::consts::{DEFAULT_CONFIG_PATH, THERMOCOUPLE_CONNECTED};
use chamber_common::prelude::*;
use chamber_control::{CancelToken, ChamberLifecycle, ControlSession, OperatorConsole};
use chamber_hal::{DriverRegistry, SimulationDriver, SimulationHandle};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Ambient values the simulated PLC starts from.
const SIMULATED_TEMPERATURE: f64 = 22.0;
const SIMULATED_HUMIDITY: f64 = 45.0;

/// Chamber Control - setpoint ramps and lifecycle for an environmental chamber
#[derive(Parser, Debug)]
#[command(name = "chamber_control")]
#[command(version)]
#[command(about = "Setpoint ramp and lifecycle controller for an environmental chamber")]
#[command(long_about = None)]
struct Args {
    /// Path to the chamber configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use the in-memory PLC instead of the configured driver
    #[arg(short = 's', long)]
    simulate: bool,

    /// Device driver to load
    #[arg(short, long, default_value = "modbus_tcp")]
    driver: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            setup_tracing(&args, LogLevel::Info);
            error!("Failed to load {}: {e}", args.config.display());
            std::process::exit(1);
        }
    };
    setup_tracing(&args, config.shared.log_level);

    if let Err(e) = run(&args, &config) {
        error!("Chamber controller failed: {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args, config: &ChamberConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Chamber Control v{} starting ({})",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name
    );

    let driver = create_driver(args, config)?;
    let port = SharedPort::new(driver);

    if let Err(e) = port.lock().open(&config.device) {
        error!(
            "Cannot connect to PLC at {}: {e}",
            config.device.address()
        );
        return Err(e.into());
    }
    info!("Connected to PLC at {}", config.device.address());

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            std::process::exit(130);
        }
        info!("Received shutdown signal, stopping after the current step");
        handler_token.cancel();
    })?;

    let session = ControlSession::from_config(port.clone(), config);
    let lifecycle = ChamberLifecycle::new(port.clone(), &config.registers);
    let mut console = OperatorConsole::new(
        std::io::stdin().lock(),
        std::io::stdout(),
        port.clone(),
        session,
        lifecycle,
        cancel,
    );
    console.run()?;

    if let Some(diag) = port.lock().diagnostics() {
        info!(
            reads = diag.reads,
            writes = diag.writes,
            failed_reads = diag.failed_reads,
            failed_writes = diag.failed_writes,
            custom = ?diag.custom,
            "Port diagnostics"
        );
    }
    info!("Chamber Control shutdown complete");
    Ok(())
}

/// Select the device driver. Simulation wins over `--driver`.
fn create_driver(args: &Args, config: &ChamberConfig) -> Result<Box<dyn DevicePort>, PortError> {
    if args.simulate {
        info!("Simulation mode enabled");
        let driver = SimulationDriver::new();
        seed_simulation(&driver.handle(), &config.registers)?;
        return Ok(Box::new(driver));
    }

    let registry = DriverRegistry::with_builtin_drivers();
    registry.create_driver(&args.driver).inspect_err(|_| {
        warn!(
            "Unknown driver '{}', available: {}",
            args.driver,
            registry.describe().join("; ")
        );
    })
}

fn seed_simulation(handle: &SimulationHandle, registers: &RegisterMap) -> Result<(), PortError> {
    handle.seed_value(registers.temperature, SIMULATED_TEMPERATURE)?;
    handle.seed_value(registers.humidity, SIMULATED_HUMIDITY)?;
    if let Some(address) = registers.thermocouple_status {
        handle.seed(address, THERMOCOUPLE_CONNECTED);
    }
    Ok(())
}

/// Setup tracing subscriber. `RUST_LOG` overrides the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        configured
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
