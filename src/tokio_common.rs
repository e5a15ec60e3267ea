//! This module provides common data structures and error types for the `tokio`
//! based clients.
//!
//! It defines the [`Error`] enum with the three failure kinds a caller has to
//! tell apart (invalid input, unreachable device, failed register
//! transaction) and the [`ConnectionParameters`] needed to open a link.
use crate::protocol as proto;
use std::fmt;
use std::time::Duration;

/// Bound applied to connecting and to every single register transaction.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default Modbus TCP port.
pub const DEFAULT_TCP_PORT: &str = "502";

/// Failure of one register transaction on an open link.
#[derive(thiserror::Error, Debug)]
pub enum TransactionError {
    /// Wraps `tokio_modbus::ExceptionCode`.
    #[error(transparent)]
    TokioExceptionError(#[from] tokio_modbus::ExceptionCode),

    /// Wraps `tokio_modbus::Error`.
    #[error(transparent)]
    TokioError(#[from] tokio_modbus::Error),

    /// The device answered with a different number of registers than requested.
    #[error("Expected {expected} registers in response, got {actual}")]
    UnexpectedResponseLength { expected: usize, actual: usize },
}

impl TransactionError {
    /// Whether the transaction ran into the configured timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TransactionError::TokioError(tokio_modbus::Error::Transport(err))
                if err.kind() == std::io::ErrorKind::TimedOut
        )
    }
}

/// Represents all possible errors of a register session.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Caller input was rejected before any transport was touched.
    #[error(transparent)]
    Validation(#[from] proto::Error),

    /// The link to the device could not be opened.
    #[error("Cannot connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// A register read or write failed on an open link.
    #[error("Transaction on register {address:#06x} failed: {source}")]
    Transaction {
        address: u16,
        #[source]
        source: TransactionError,
    },
}

impl Error {
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

/// The result type for tokio operations.
pub type Result<T> = std::result::Result<T, crate::tokio_common::Error>;

/// Everything needed to open one link to the charger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionParameters {
    /// Modbus RTU over a serial line, 8 data bits, no parity, 1 stop bit.
    Serial {
        device: String,
        baud_rate: proto::BaudRate,
        slave: proto::SlaveId,
        timeout: Duration,
    },
    /// Modbus TCP.
    Tcp {
        host: String,
        port: String,
        timeout: Duration,
    },
}

impl ConnectionParameters {
    /// Serial parameters with the default timeout, rejecting an empty device name.
    pub fn serial(
        device: impl Into<String>,
        baud_rate: proto::BaudRate,
        slave: proto::SlaveId,
    ) -> std::result::Result<Self, proto::Error> {
        let device = device.into();
        if device.trim().is_empty() {
            return Err(proto::Error::MissingPort);
        }
        Ok(ConnectionParameters::Serial {
            device,
            baud_rate,
            slave,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// TCP parameters with the default timeout, rejecting an empty host.
    pub fn tcp(
        host: impl Into<String>,
        port: impl Into<String>,
    ) -> std::result::Result<Self, proto::Error> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(proto::Error::MissingPort);
        }
        Ok(ConnectionParameters::Tcp {
            host,
            port: port.into(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Splits `host:port`, falling back to the Modbus TCP default port.
    pub fn tcp_from_address(address: &str) -> std::result::Result<Self, proto::Error> {
        match address.rsplit_once(':') {
            Some((host, port)) if !port.is_empty() => Self::tcp(host, port),
            Some((host, _)) => Self::tcp(host, DEFAULT_TCP_PORT),
            None => Self::tcp(address, DEFAULT_TCP_PORT),
        }
    }

    pub fn with_timeout(mut self, new_timeout: Duration) -> Self {
        match &mut self {
            ConnectionParameters::Serial { timeout, .. }
            | ConnectionParameters::Tcp { timeout, .. } => *timeout = new_timeout,
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        match self {
            ConnectionParameters::Serial { timeout, .. }
            | ConnectionParameters::Tcp { timeout, .. } => *timeout,
        }
    }

    /// Identifies the physical endpoint; two sessions with the same target
    /// talk to the same device.
    pub fn target(&self) -> String {
        match self {
            ConnectionParameters::Serial { device, .. } => device.clone(),
            ConnectionParameters::Tcp { host, port, .. } => format!("{host}:{port}"),
        }
    }
}

impl fmt::Display for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionParameters::Serial {
                device,
                baud_rate,
                slave,
                ..
            } => write!(f, "RTU {device} (Slave: {slave}, Baud: {baud_rate})"),
            ConnectionParameters::Tcp { host, port, .. } => write!(f, "TCP {host}:{port}"),
        }
    }
}

/// The parity used for serial communication.
#[cfg(feature = "tokio-rtu-sync")]
pub const PARITY: &tokio_serial::Parity = &tokio_serial::Parity::None;
/// The number of stop bits used for serial communication.
#[cfg(feature = "tokio-rtu-sync")]
pub const STOP_BITS: &tokio_serial::StopBits = &tokio_serial::StopBits::One;
/// The number of data bits used for serial communication.
#[cfg(feature = "tokio-rtu-sync")]
pub const DATA_BITS: &tokio_serial::DataBits = &tokio_serial::DataBits::Eight;

/// Creates a `tokio_serial::SerialPortBuilder` with the specified settings.
///
/// # Arguments
///
/// * `device` - The path to the serial port device (e.g., `/dev/ttyUSB0`).
/// * `baud_rate` - The baud rate for the serial communication.
/// * `timeout` - Read/write timeout of the port itself.
#[cfg(feature = "tokio-rtu-sync")]
pub fn serial_port_builder(
    device: &str,
    baud_rate: &proto::BaudRate,
    timeout: Duration,
) -> tokio_serial::SerialPortBuilder {
    tokio_serial::new(device, u32::from(*baud_rate))
        .parity(*PARITY)
        .stop_bits(*STOP_BITS)
        .data_bits(*DATA_BITS)
        .flow_control(tokio_serial::FlowControl::None)
        .timeout(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn tcp_address_parsing() {
        assert_matches!(
            ConnectionParameters::tcp_from_address("192.168.1.100:1502"),
            Ok(ConnectionParameters::Tcp { host, port, .. }) if host == "192.168.1.100" && port == "1502"
        );
        assert_matches!(
            ConnectionParameters::tcp_from_address("drs.local"),
            Ok(ConnectionParameters::Tcp { host, port, .. }) if host == "drs.local" && port == "502"
        );
        assert_matches!(
            ConnectionParameters::tcp_from_address(":502"),
            Err(proto::Error::MissingPort)
        );
    }

    #[test]
    fn serial_rejects_blank_device() {
        assert_matches!(
            ConnectionParameters::serial(" ", proto::BaudRate::B9600, proto::SlaveId::default()),
            Err(proto::Error::MissingPort)
        );
    }

    #[test]
    fn timeout_defaults_and_override() {
        let params =
            ConnectionParameters::serial("/dev/ttyUSB0", proto::BaudRate::B9600, Default::default())
                .unwrap();
        assert_eq!(params.timeout(), DEFAULT_TIMEOUT);
        let params = params.with_timeout(Duration::from_millis(300));
        assert_eq!(params.timeout(), Duration::from_millis(300));
        assert_eq!(params.target(), "/dev/ttyUSB0");
    }

    #[test]
    fn timeout_detection() {
        let err = TransactionError::from(tokio_modbus::Error::Transport(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "timeout",
        )));
        assert!(err.is_timeout());
        let err = TransactionError::from(tokio_modbus::ExceptionCode::IllegalDataAddress);
        assert!(!err.is_timeout());
    }
}
