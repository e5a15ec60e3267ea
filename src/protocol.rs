//! Register layout and line settings of the DRS charger.
//!
//! This module holds the transport independent part of the protocol: the
//! ordered [`RegisterMap`] of configuration settings, the assembly of a
//! register value from its wire bytes, and the strongly typed serial line
//! settings ([`BaudRate`], [`SlaveId`]).
//!
//! Write payloads are positional: the i-th value of a write request belongs to
//! the i-th [`RegisterDescriptor`] of the map.

use std::fmt;

/// Errors raised while validating caller input against the protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The number of values does not match the number of mapped registers.
    #[error("Expected {expected} register values, got {actual}")]
    ValueCountMismatch { expected: usize, actual: usize },

    /// No serial device or network endpoint was given.
    #[error("Missing port")]
    MissingPort,

    /// The slave id is outside the valid Modbus RTU range.
    #[error("Slave id {0} is out of range ({min}..={max})", min = SlaveId::MIN, max = SlaveId::MAX)]
    SlaveIdOutOfRange(u8),

    /// The baud rate is not one of the supported rates.
    #[error("Unsupported baud rate {0}")]
    UnsupportedBaudRate(u32),

    /// A register map without any register.
    #[error("Register map is empty")]
    EmptyRegisterMap,

    /// Two descriptors of a register map share the same address.
    #[error("Register address {0:#06x} is mapped more than once")]
    DuplicateRegisterAddress(u16),
}

/// Assembles a register value from the two bytes of a holding register,
/// most significant byte first.
pub fn register_value_from_bytes(bytes: [u8; 2]) -> u16 {
    let [high, low] = bytes;
    (u16::from(high) << 8) | u16::from(low)
}

/// One logical setting and the holding register it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterDescriptor {
    pub name: String,
    pub address: u16,
}

impl RegisterDescriptor {
    pub fn new(name: impl Into<String>, address: u16) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

impl fmt::Display for RegisterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#06x}", self.name, self.address)
    }
}

/// The ordered, immutable table of registers a client reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RegisterMap {
    registers: Vec<RegisterDescriptor>,
}

impl RegisterMap {
    /// Settings of the DRS charger in panel order.
    pub const DRS_SETTINGS: [&'static str; 8] = [
        "output_voltage_set",
        "constant_voltage",
        "floating_voltage",
        "cc_charge_timeout",
        "cv_charge_timeout",
        "fv_charge_timeout",
        "bat_low_protect",
        "force_bat_low_protect",
    ];

    /// Address of the first DRS setting, the others follow consecutively.
    pub const DRS_FIRST_ADDRESS: u16 = 0x0000;

    /// Builds a map from descriptors, rejecting an empty table or a
    /// duplicated address.
    pub fn new(registers: Vec<RegisterDescriptor>) -> Result<Self, Error> {
        if registers.is_empty() {
            return Err(Error::EmptyRegisterMap);
        }
        for (i, descriptor) in registers.iter().enumerate() {
            if registers[..i]
                .iter()
                .any(|other| other.address == descriptor.address)
            {
                return Err(Error::DuplicateRegisterAddress(descriptor.address));
            }
        }
        Ok(Self { registers })
    }

    /// The register layout of the DRS charger.
    pub fn drs() -> Self {
        Self {
            registers: Self::DRS_SETTINGS
                .iter()
                .zip(Self::DRS_FIRST_ADDRESS..)
                .map(|(name, address)| RegisterDescriptor::new(*name, address))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RegisterDescriptor> {
        self.registers.iter()
    }

    /// Checks that a write payload has exactly one value per register.
    pub fn check_values(&self, values: &[u16]) -> Result<(), Error> {
        if values.len() == self.registers.len() {
            Ok(())
        } else {
            Err(Error::ValueCountMismatch {
                expected: self.registers.len(),
                actual: values.len(),
            })
        }
    }
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self::drs()
    }
}

impl<'a> IntoIterator for &'a RegisterMap {
    type Item = &'a RegisterDescriptor;
    type IntoIter = std::slice::Iter<'a, RegisterDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for RegisterMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let registers = Vec::<RegisterDescriptor>::deserialize(deserializer)?;
        RegisterMap::new(registers).map_err(serde::de::Error::custom)
    }
}

/// Register values read from the device, in register map order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RegisterValues(Vec<u16>);

impl RegisterValues {
    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }
}

impl From<Vec<u16>> for RegisterValues {
    fn from(values: Vec<u16>) -> Self {
        Self(values)
    }
}

impl std::ops::Deref for RegisterValues {
    type Target = [u16];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for RegisterValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for value in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
            first = false;
        }
        Ok(())
    }
}

/// The Modbus RTU device address of the charger on its serial bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct SlaveId(u8);

impl SlaveId {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 247;
}

impl Default for SlaveId {
    fn default() -> Self {
        Self(0x01)
    }
}

impl std::ops::Deref for SlaveId {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u8> for SlaveId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::SlaveIdOutOfRange(value))
        }
    }
}

impl From<SlaveId> for u8 {
    fn from(value: SlaveId) -> Self {
        value.0
    }
}

impl fmt::Display for SlaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Serial line speeds the gateway accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
pub enum BaudRate {
    B1200,
    B2400,
    B4800,
    #[default]
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl From<BaudRate> for u32 {
    fn from(value: BaudRate) -> Self {
        match value {
            BaudRate::B1200 => 1200,
            BaudRate::B2400 => 2400,
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1200 => Ok(BaudRate::B1200),
            2400 => Ok(BaudRate::B2400),
            4800 => Ok(BaudRate::B4800),
            9600 => Ok(BaudRate::B9600),
            19200 => Ok(BaudRate::B19200),
            38400 => Ok(BaudRate::B38400),
            57600 => Ok(BaudRate::B57600),
            115200 => Ok(BaudRate::B115200),
            _ => Err(Error::UnsupportedBaudRate(value)),
        }
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u32::from(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn register_value_is_big_endian() {
        assert_eq!(register_value_from_bytes([0x12, 0x34]), 0x1234);
        assert_eq!(register_value_from_bytes([0x00, 0xFF]), 0x00FF);
        assert_eq!(register_value_from_bytes([0xFF, 0x00]), 0xFF00);
        assert_eq!(register_value_from_bytes([0xFF, 0xFF]), u16::MAX);
    }

    #[test]
    fn drs_map_layout() {
        let map = RegisterMap::drs();
        assert_eq!(map.len(), 8);
        let addresses: Vec<u16> = map.iter().map(|r| r.address).collect();
        assert_eq!(addresses, (0x0000..0x0008).collect::<Vec<_>>());
        assert_eq!(map.iter().next().unwrap().name, "output_voltage_set");
        assert_eq!(map.iter().last().unwrap().name, "force_bat_low_protect");
    }

    #[test]
    fn register_map_validation() {
        assert_matches!(RegisterMap::new(vec![]), Err(Error::EmptyRegisterMap));
        assert_matches!(
            RegisterMap::new(vec![
                RegisterDescriptor::new("a", 0x10),
                RegisterDescriptor::new("b", 0x11),
                RegisterDescriptor::new("c", 0x10),
            ]),
            Err(Error::DuplicateRegisterAddress(0x10))
        );
        let map = RegisterMap::new(vec![
            RegisterDescriptor::new("b", 0x20),
            RegisterDescriptor::new("a", 0x05),
        ])
        .unwrap();
        let names: Vec<&str> = map.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn check_values_count() {
        let map = RegisterMap::drs();
        assert_matches!(map.check_values(&[0; 8]), Ok(()));
        assert_matches!(
            map.check_values(&[0; 7]),
            Err(Error::ValueCountMismatch {
                expected: 8,
                actual: 7
            })
        );
        assert_matches!(
            map.check_values(&[0; 9]),
            Err(Error::ValueCountMismatch {
                expected: 8,
                actual: 9
            })
        );
    }

    #[test]
    fn slave_id_range() {
        assert_matches!(SlaveId::try_from(0), Err(Error::SlaveIdOutOfRange(0)));
        assert_matches!(SlaveId::try_from(1), Ok(id) if *id == 1);
        assert_matches!(SlaveId::try_from(247), Ok(id) if *id == 247);
        assert_matches!(SlaveId::try_from(248), Err(Error::SlaveIdOutOfRange(248)));
        assert_eq!(SlaveId::default().to_string(), "0x01");
    }

    #[test]
    fn baud_rate_conversion() {
        assert_matches!(BaudRate::try_from(9600), Ok(BaudRate::B9600));
        assert_matches!(BaudRate::try_from(115200), Ok(BaudRate::B115200));
        assert_matches!(
            BaudRate::try_from(9601),
            Err(Error::UnsupportedBaudRate(9601))
        );
        assert_eq!(u32::from(BaudRate::default()), 9600);
        assert_eq!(BaudRate::B19200.to_string(), "19200");
    }

    #[test]
    fn register_values_display() {
        let values = RegisterValues::from(vec![1, 20, 300]);
        assert_eq!(values.to_string(), "1, 20, 300");
        assert_eq!(values.len(), 3);
    }
}
