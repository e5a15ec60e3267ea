//! A library for reading and writing the configuration registers of a DRS
//! battery charger via Modbus.
//!
//! The charger exposes its settings (output voltage, constant and floating
//! voltage, charge timeouts, battery low protection) as holding registers.
//! This crate reads and writes all of them in one ordered sequence of single
//! register transactions, over Modbus RTU (serial) or Modbus TCP.
//!
//! ## Layers
//!
//! - [`protocol`]: the ordered [`protocol::RegisterMap`], register value
//!   assembly and the serial line settings.
//! - [`transport`]: the [`transport::Connector`] / [`transport::Transport`]
//!   traits the client runs on, implemented with `tokio-modbus` in
//!   [`tokio_sync`].
//! - [`tokio_sync_client`]: ordered read-all / write-all transactions.
//! - [`session`]: open → operate → close, with the transport released on
//!   every exit path.
//! - `http_api`: a small axum gateway on top of the session layer.
//!
//! ## Quick Start
//!
//! ```no_run
//! use drs_lib::{
//!     protocol::{BaudRate, RegisterMap, SlaveId},
//!     session,
//!     tokio_common::ConnectionParameters,
//!     tokio_sync::ModbusConnector,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let params = ConnectionParameters::serial("/dev/ttyUSB0", BaudRate::B9600, SlaveId::default())?;
//!     let map = RegisterMap::drs();
//!
//!     let values = session::read_registers(&ModbusConnector, &params, &map)?;
//!     println!("Current settings: {}", values);
//!
//!     session::write_registers(&ModbusConnector, &params, &map, &[10, 20, 30, 40, 50, 60, 70, 80])?;
//!     Ok(())
//! }
//! ```

pub mod protocol;
pub mod session;
pub mod tokio_common;
pub mod tokio_sync_client;
pub mod transport;

#[cfg_attr(
    docsrs,
    doc(cfg(any(feature = "tokio-rtu-sync", feature = "tokio-tcp-sync")))
)]
#[cfg(any(feature = "tokio-rtu-sync", feature = "tokio-tcp-sync"))]
pub mod tokio_sync;

#[cfg_attr(docsrs, doc(cfg(feature = "http-api")))]
#[cfg(feature = "http-api")]
pub mod http_api;
