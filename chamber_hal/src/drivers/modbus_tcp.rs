//! Modbus TCP driver.
//!
//! Talks to the chamber PLC through holding registers:
//! - read: function 0x03, one register per request
//! - write: function 0x06 (write single register)
//!
//! A transport error drops the connection, so `is_open()` turns false and
//! the lifecycle controller reports the device as unreachable instead of
//! writing blind. Protocol exceptions keep the connection.

use chamber_common::config::DeviceConfig;
use chamber_common::port::{DevicePort, PortDiagnostics, PortError};
use std::net::{SocketAddr, ToSocketAddrs};
use tokio_modbus::Slave;
use tokio_modbus::client::sync::{self, Context, Reader, Writer};
use tracing::{debug, info, warn};

/// One-line description shown to the operator.
pub const DRIVER_DESCRIPTION: &str = "Chamber PLC over Modbus TCP";

/// Registry name of this driver.
pub const DRIVER_NAME: &str = "modbus_tcp";

/// Factory function for the driver registry.
pub fn create_driver() -> Box<dyn DevicePort> {
    Box::new(ModbusTcpDriver::new())
}

/// Modbus TCP client driver.
pub struct ModbusTcpDriver {
    /// Open client context, `None` while disconnected
    ctx: Option<Context>,
    /// Peer of the current connection
    peer: Option<SocketAddr>,
    /// Request counters
    diagnostics: PortDiagnostics,
}

impl ModbusTcpDriver {
    /// Create a disconnected driver.
    pub fn new() -> Self {
        Self {
            ctx: None,
            peer: None,
            diagnostics: PortDiagnostics::default(),
        }
    }

    fn drop_connection(&mut self, reason: &str) {
        if self.ctx.take().is_some() {
            warn!(peer = ?self.peer, reason, "Modbus connection lost");
        }
    }
}

impl Default for ModbusTcpDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve `host:port` to the first socket address.
fn resolve(config: &DeviceConfig) -> Result<SocketAddr, PortError> {
    (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| PortError::ConnectFailed(format!("{}: {e}", config.address())))?
        .next()
        .ok_or_else(|| {
            PortError::ConnectFailed(format!("{}: no address resolved", config.address()))
        })
}

impl DevicePort for ModbusTcpDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn open(&mut self, config: &DeviceConfig) -> Result<(), PortError> {
        if self.ctx.is_some() {
            debug!("Modbus connection already open");
            return Ok(());
        }

        let peer = resolve(config)?;
        info!(%peer, unit_id = config.unit_id, "Connecting to PLC");

        let ctx = sync::tcp::connect_slave_with_timeout(
            peer,
            Slave(config.unit_id),
            Some(config.timeout()),
        )
        .map_err(|e| PortError::ConnectFailed(format!("{peer}: {e}")))?;

        self.ctx = Some(ctx);
        self.peer = Some(peer);
        info!(%peer, "PLC connection established");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.ctx.is_some()
    }

    fn read_register(&mut self, address: u16) -> Result<u16, PortError> {
        let ctx = self.ctx.as_mut().ok_or(PortError::NotConnected)?;
        let response = ctx.read_holding_registers(address, 1);

        match response {
            Ok(Ok(words)) => match words.first() {
                Some(&word) => {
                    self.diagnostics.reads += 1;
                    Ok(word)
                }
                None => {
                    self.diagnostics.failed_reads += 1;
                    Err(PortError::CommunicationError(format!(
                        "empty response reading register {address}"
                    )))
                }
            },
            Ok(Err(code)) => {
                self.diagnostics.failed_reads += 1;
                Err(PortError::Exception {
                    address,
                    detail: format!("{code:?}"),
                })
            }
            Err(e) => {
                self.diagnostics.failed_reads += 1;
                let message = e.to_string();
                self.drop_connection(&message);
                Err(PortError::CommunicationError(message))
            }
        }
    }

    fn write_register(&mut self, address: u16, value: u16) -> Result<(), PortError> {
        let ctx = self.ctx.as_mut().ok_or(PortError::NotConnected)?;
        let response = ctx.write_single_register(address, value);

        match response {
            Ok(Ok(())) => {
                self.diagnostics.writes += 1;
                Ok(())
            }
            Ok(Err(code)) => {
                self.diagnostics.failed_writes += 1;
                Err(PortError::Exception {
                    address,
                    detail: format!("{code:?}"),
                })
            }
            Err(e) => {
                self.diagnostics.failed_writes += 1;
                let message = e.to_string();
                self.drop_connection(&message);
                Err(PortError::CommunicationError(message))
            }
        }
    }

    fn close(&mut self) -> Result<(), PortError> {
        // Dropping the context closes the socket.
        if self.ctx.take().is_some() {
            info!(peer = ?self.peer, "PLC connection closed");
        }
        self.peer = None;
        Ok(())
    }

    fn diagnostics(&self) -> Option<PortDiagnostics> {
        let mut diagnostics = self.diagnostics.clone();
        diagnostics.custom = self.peer.map(|peer| format!("peer={peer}"));
        Some(diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn requests_without_connection_fail() {
        let mut driver = ModbusTcpDriver::new();
        assert!(!driver.is_open());
        assert_eq!(driver.read_register(1), Err(PortError::NotConnected));
        assert_eq!(driver.write_register(1, 20), Err(PortError::NotConnected));
    }

    #[test]
    fn close_is_idempotent() {
        let mut driver = ModbusTcpDriver::new();
        assert!(driver.close().is_ok());
        assert!(driver.close().is_ok());
    }

    #[test]
    fn connect_refused_is_reported() {
        // Reserve a free local port, then release it so nothing listens there.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let config = DeviceConfig {
            host: "127.0.0.1".to_string(),
            port,
            unit_id: 1,
            timeout_ms: 500,
        };

        let mut driver = ModbusTcpDriver::new();
        let result = driver.open(&config);
        assert!(matches!(result, Err(PortError::ConnectFailed(_))));
        assert!(!driver.is_open());
    }

    #[test]
    fn diagnostics_start_empty() {
        let driver = ModbusTcpDriver::new();
        let diag = driver.diagnostics().unwrap();
        assert_eq!(diag.reads, 0);
        assert!(diag.custom.is_none());
    }
}
