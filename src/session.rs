//! Scoped access to the charger: open, run one operation, close.
//!
//! A [`Session`] owns exactly one open transport. The transport is closed
//! exactly once, either by [`Session::close`] or when the session is dropped,
//! so every exit path (including `?` on a failed transaction) releases the
//! port or socket. Close failures are logged and never reach the caller.
//!
//! [`read_registers`] and [`write_registers`] wrap the whole
//! open → operate → close sequence for one request.

use crate::protocol::{RegisterMap, RegisterValues};
use crate::tokio_common::{ConnectionParameters, Error, Result};
use crate::tokio_sync_client::DrsClient;
use crate::transport::{Connector, Transport};
use log::*;

pub struct Session<T: Transport> {
    transport: Option<T>,
    target: String,
}

impl<T: Transport> Session<T> {
    /// Opens a transport for `params`.
    ///
    /// # Errors
    ///
    /// * [`Error::Connection`] if the link cannot be established. Nothing is
    ///   left open in that case.
    pub fn open<C>(connector: &C, params: &ConnectionParameters) -> Result<Self>
    where
        C: Connector<Transport = T> + ?Sized,
    {
        let target = params.target();
        debug!("Opening session to {params}");
        let transport = connector
            .open(params)
            .map_err(|source| Error::Connection {
                target: target.clone(),
                source,
            })?;
        Ok(Self {
            transport: Some(transport),
            target,
        })
    }

    fn client(&mut self) -> DrsClient<'_, T> {
        // `transport` is only taken by `release`, which consumes the session.
        let transport = self
            .transport
            .as_mut()
            .unwrap_or_else(|| unreachable!("session used after close"));
        DrsClient::new(transport)
    }

    /// Reads every register of `map`.
    pub fn read_all(&mut self, map: &RegisterMap) -> Result<RegisterValues> {
        self.client().read_all(map)
    }

    /// Writes `values` positionally to the registers of `map`.
    pub fn write_all(&mut self, map: &RegisterMap, values: &[u16]) -> Result<()> {
        self.client().write_all(map, values)
    }

    /// Closes the transport now instead of at drop.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            match transport.close() {
                Ok(()) => debug!("Closed session to {}", self.target),
                Err(err) => warn!("Cannot close session to {}: {err}", self.target),
            }
        }
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Reads all registers of `map` in a session of its own.
pub fn read_registers<C>(
    connector: &C,
    params: &ConnectionParameters,
    map: &RegisterMap,
) -> Result<RegisterValues>
where
    C: Connector + ?Sized,
{
    let mut session = Session::open(connector, params)?;
    let values = session.read_all(map)?;
    session.close();
    Ok(values)
}

/// Writes `values` to `map` in a session of its own.
///
/// The value count is checked before the transport is opened, so a malformed
/// request never reaches the device.
pub fn write_registers<C>(
    connector: &C,
    params: &ConnectionParameters,
    map: &RegisterMap,
    values: &[u16],
) -> Result<()>
where
    C: Connector + ?Sized,
{
    map.check_values(values)?;
    let mut session = Session::open(connector, params)?;
    session.write_all(map, values)?;
    session.close();
    Ok(())
}
