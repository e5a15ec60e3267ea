//! Synchronous `tokio-modbus` transport for the DRS charger.
//!
//! [`ModbusConnector`] opens Modbus RTU (serial) or Modbus TCP links and hands
//! out [`ModbusTransport`]s wrapping a blocking `tokio_modbus` context. All
//! methods block the current thread, bounded by the timeout of the
//! [`ConnectionParameters`] they were opened with.
//!
//! # Example
//!
//! ```no_run
//! use drs_lib::{
//!     protocol::RegisterMap,
//!     session::Session,
//!     tokio_common::ConnectionParameters,
//!     tokio_sync::ModbusConnector,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let params = ConnectionParameters::tcp_from_address("192.168.1.100:502")?;
//!     let mut session = Session::open(&ModbusConnector, &params)?;
//!     let values = session.read_all(&RegisterMap::drs())?;
//!     println!("Registers: {}", values);
//!     Ok(())
//! }
//! ```

use crate::tokio_common::{ConnectionParameters, TransactionError};
use crate::transport::{Connector, Transport};
use log::*;
use tokio_modbus::client::sync::Context;
use tokio_modbus::prelude::{SyncReader, SyncWriter};

/// Opens `tokio-modbus` links.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModbusConnector;

impl ModbusConnector {
    #[cfg(feature = "tokio-rtu-sync")]
    fn connect_rtu(
        device: &str,
        baud_rate: &crate::protocol::BaudRate,
        slave: crate::protocol::SlaveId,
        timeout: std::time::Duration,
    ) -> std::io::Result<Context> {
        let builder = crate::tokio_common::serial_port_builder(device, baud_rate, timeout);
        tokio_modbus::client::sync::rtu::connect_slave(&builder, tokio_modbus::Slave(*slave))
    }

    #[cfg(not(feature = "tokio-rtu-sync"))]
    fn connect_rtu(
        device: &str,
        _baud_rate: &crate::protocol::BaudRate,
        _slave: crate::protocol::SlaveId,
        _timeout: std::time::Duration,
    ) -> std::io::Result<Context> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("Modbus RTU support is not compiled in, cannot open {device}"),
        ))
    }

    /// Tries every address `host` resolves to, in order, and returns the
    /// first link that comes up or the last connect error.
    #[cfg(feature = "tokio-tcp-sync")]
    fn connect_tcp(host: &str, port: &str, timeout: std::time::Duration) -> std::io::Result<Context> {
        use std::net::ToSocketAddrs;
        let mut last_err = None;
        for socket_addr in format!("{host}:{port}").to_socket_addrs()? {
            match tokio_modbus::client::sync::tcp::connect_slave_with_timeout(
                socket_addr,
                tokio_modbus::Slave::tcp_device(),
                Some(timeout),
            ) {
                Ok(ctx) => return Ok(ctx),
                Err(err) => {
                    debug!("Cannot connect to {socket_addr}: {err}");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("No address found for {host}:{port}"),
            )
        }))
    }

    #[cfg(not(feature = "tokio-tcp-sync"))]
    fn connect_tcp(host: &str, port: &str, _timeout: std::time::Duration) -> std::io::Result<Context> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("Modbus TCP support is not compiled in, cannot open {host}:{port}"),
        ))
    }
}

impl Connector for ModbusConnector {
    type Transport = ModbusTransport;

    fn open(&self, params: &ConnectionParameters) -> std::io::Result<ModbusTransport> {
        let mut ctx = match params {
            ConnectionParameters::Serial {
                device,
                baud_rate,
                slave,
                timeout,
            } => Self::connect_rtu(device, baud_rate, *slave, *timeout)?,
            ConnectionParameters::Tcp {
                host,
                port,
                timeout,
            } => Self::connect_tcp(host, port, *timeout)?,
        };
        ctx.set_timeout(params.timeout());
        debug!("Opened {params} with timeout {:?}", params.timeout());
        Ok(ModbusTransport { ctx: Some(ctx) })
    }

    #[cfg(feature = "tokio-rtu-sync")]
    fn available_ports(&self) -> std::io::Result<Vec<String>> {
        let ports = tokio_serial::available_ports().map_err(std::io::Error::from)?;
        Ok(ports.into_iter().map(|port| port.port_name).collect())
    }

    #[cfg(not(feature = "tokio-rtu-sync"))]
    fn available_ports(&self) -> std::io::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// An open `tokio-modbus` link. Dropping the context closes the port or socket.
pub struct ModbusTransport {
    ctx: Option<Context>,
}

impl ModbusTransport {
    /// Helper function to map tokio result to our result.
    fn map_tokio_result<T>(result: tokio_modbus::Result<T>) -> Result<T, TransactionError> {
        match result {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(err.into()), // Modbus exception
            Err(err) => Err(err.into()),     // IO error
        }
    }

    fn ctx(&mut self) -> Result<&mut Context, TransactionError> {
        self.ctx.as_mut().ok_or_else(|| {
            tokio_modbus::Error::Transport(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "transport already closed",
            ))
            .into()
        })
    }
}

impl Transport for ModbusTransport {
    fn read_holding_register(&mut self, address: u16) -> Result<[u8; 2], TransactionError> {
        let words = Self::map_tokio_result(self.ctx()?.read_holding_registers(address, 1))?;
        match words.as_slice() {
            [word] => Ok(word.to_be_bytes()),
            other => Err(TransactionError::UnexpectedResponseLength {
                expected: 1,
                actual: other.len(),
            }),
        }
    }

    fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<(), TransactionError> {
        Self::map_tokio_result(self.ctx()?.write_single_register(address, value))
    }

    fn close(&mut self) -> std::io::Result<()> {
        // The context owns the serial port or socket together with its
        // runtime; dropping it releases both.
        drop(self.ctx.take());
        Ok(())
    }
}
