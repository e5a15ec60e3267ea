use crate::protocol::{self as proto, RegisterDescriptor, RegisterMap, RegisterValues};
use crate::tokio_common::{Error, Result, TransactionError};
use crate::transport::Transport;
use log::*;

/// Synchronous client running ordered register transactions against the DRS charger.
///
/// Every register is read or written with its own single register Modbus
/// transaction, in register map order. The first failing transaction aborts
/// the operation; writes that already went through stay applied, the device
/// offers no way to commit several registers atomically.
pub struct DrsClient<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
}

impl<'a, T: Transport + ?Sized> DrsClient<'a, T> {
    /// Creates a new client on an open transport.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use drs_lib::{protocol::RegisterMap, tokio_sync_client::DrsClient};
    /// use drs_lib::tokio_common::ConnectionParameters;
    /// use drs_lib::tokio_sync::ModbusConnector;
    /// use drs_lib::transport::{Connector, Transport};
    ///
    /// # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    /// let params = ConnectionParameters::tcp_from_address("127.0.0.1:502")?;
    /// let mut transport = ModbusConnector.open(&params)?;
    /// let values = DrsClient::new(&mut transport).read_all(&RegisterMap::drs())?;
    /// println!("Registers: {}", values);
    /// transport.close()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(transport: &'a mut T) -> Self {
        Self { transport }
    }

    /// Reads every register of `map`, in map order.
    ///
    /// # Errors
    ///
    /// * [`Error::Transaction`] for the first register that could not be read.
    ///   No later register is touched.
    pub fn read_all(&mut self, map: &RegisterMap) -> Result<RegisterValues> {
        let mut values = Vec::with_capacity(map.len());
        for register in map {
            let bytes = self
                .transport
                .read_holding_register(register.address)
                .map_err(|source| transaction_failed(register, source))?;
            let value = proto::register_value_from_bytes(bytes);
            trace!("Read {register} = {value}");
            values.push(value);
        }
        debug!("Read {} registers", values.len());
        Ok(values.into())
    }

    /// Writes `values[i]` to the i-th register of `map`, in map order.
    ///
    /// # Errors
    ///
    /// * [`Error::Validation`] if `values` does not hold exactly one value per
    ///   register. Nothing is sent in that case.
    /// * [`Error::Transaction`] for the first register that could not be
    ///   written. Earlier registers keep their new value.
    pub fn write_all(&mut self, map: &RegisterMap, values: &[u16]) -> Result<()> {
        map.check_values(values)?;
        for (register, value) in map.iter().zip(values) {
            trace!("Write {register} = {value}");
            self.transport
                .write_single_register(register.address, *value)
                .map_err(|source| transaction_failed(register, source))?;
        }
        debug!("Wrote {} registers", values.len());
        Ok(())
    }
}

fn transaction_failed(register: &RegisterDescriptor, source: TransactionError) -> Error {
    if source.is_timeout() {
        warn!("No answer for {register} within the timeout");
    } else {
        debug!("Transaction on {register} failed: {source}");
    }
    Error::Transaction {
        address: register.address,
        source,
    }
}
