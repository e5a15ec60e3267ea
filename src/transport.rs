//! Transport abstraction between the register client and a Modbus link.
//!
//! A [`Connector`] opens links, a [`Transport`] is one open link. The register
//! client only needs single register reads and writes, so that is all a
//! transport has to offer. The `tokio-modbus` implementation lives in
//! [`crate::tokio_sync`].

use crate::tokio_common::{ConnectionParameters, TransactionError};

/// One open link to a Modbus device.
pub trait Transport {
    /// Reads one holding register and returns its two payload bytes,
    /// most significant byte first.
    fn read_holding_register(&mut self, address: u16) -> Result<[u8; 2], TransactionError>;

    /// Writes one holding register.
    fn write_single_register(&mut self, address: u16, value: u16)
        -> Result<(), TransactionError>;

    /// Releases the underlying OS resource.
    fn close(&mut self) -> std::io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_holding_register(&mut self, address: u16) -> Result<[u8; 2], TransactionError> {
        (**self).read_holding_register(address)
    }

    fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<(), TransactionError> {
        (**self).write_single_register(address, value)
    }

    fn close(&mut self) -> std::io::Result<()> {
        (**self).close()
    }
}

/// Opens transports.
pub trait Connector {
    type Transport: Transport;

    /// Establishes a link within the timeout carried by `params`.
    fn open(&self, params: &ConnectionParameters) -> std::io::Result<Self::Transport>;

    /// Lists the serial devices present on this machine.
    fn available_ports(&self) -> std::io::Result<Vec<String>>;
}

/// In-memory device used by the unit tests.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Everything the fake device saw, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Event {
        Open(String),
        Read(u16),
        Write(u16, u16),
        Close,
    }

    #[derive(Debug, Default)]
    pub struct State {
        pub events: Vec<Event>,
        pub registers: HashMap<u16, u16>,
        pub failing_address: Option<u16>,
        pub refuse_connection: bool,
        pub fail_close: bool,
        pub ports: Vec<String>,
    }

    impl State {
        pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
            self.events.iter().filter(|e| pred(e)).count()
        }
    }

    #[derive(Debug, Clone, Default)]
    pub struct FakeConnector {
        pub state: Arc<Mutex<State>>,
    }

    impl FakeConnector {
        pub fn with_registers(registers: &[(u16, u16)]) -> Self {
            let connector = Self::default();
            connector
                .state()
                .registers
                .extend(registers.iter().copied());
            connector
        }

        pub fn state(&self) -> std::sync::MutexGuard<'_, State> {
            self.state.lock().unwrap()
        }

        pub fn events(&self) -> Vec<Event> {
            self.state().events.clone()
        }
    }

    pub struct FakeTransport {
        state: Arc<Mutex<State>>,
    }

    impl Connector for FakeConnector {
        type Transport = FakeTransport;

        fn open(&self, params: &ConnectionParameters) -> std::io::Result<FakeTransport> {
            let mut state = self.state();
            if state.refuse_connection {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                ));
            }
            state.events.push(Event::Open(params.target()));
            Ok(FakeTransport {
                state: self.state.clone(),
            })
        }

        fn available_ports(&self) -> std::io::Result<Vec<String>> {
            Ok(self.state().ports.clone())
        }
    }

    impl Transport for FakeTransport {
        fn read_holding_register(&mut self, address: u16) -> Result<[u8; 2], TransactionError> {
            let mut state = self.state.lock().unwrap();
            state.events.push(Event::Read(address));
            if state.failing_address == Some(address) {
                return Err(tokio_modbus::ExceptionCode::IllegalDataAddress.into());
            }
            Ok(state
                .registers
                .get(&address)
                .copied()
                .unwrap_or_default()
                .to_be_bytes())
        }

        fn write_single_register(
            &mut self,
            address: u16,
            value: u16,
        ) -> Result<(), TransactionError> {
            let mut state = self.state.lock().unwrap();
            state.events.push(Event::Write(address, value));
            if state.failing_address == Some(address) {
                return Err(tokio_modbus::Error::Transport(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "no response",
                ))
                .into());
            }
            state.registers.insert(address, value);
            Ok(())
        }

        fn close(&mut self) -> std::io::Result<()> {
            let mut state = self.state.lock().unwrap();
            state.events.push(Event::Close);
            if state.fail_close {
                Err(std::io::Error::other("close failed"))
            } else {
                Ok(())
            }
        }
    }
}
