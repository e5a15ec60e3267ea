use anyhow::{Context, Result};
use drs_lib::{protocol as proto, tokio_common::DEFAULT_TIMEOUT};
use serde::Deserialize;
use std::fs::File;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud_rate: proto::BaudRate,
    pub slave: proto::SlaveId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen: SocketAddr,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub serial: SerialConfig,
    pub registers: proto::RegisterMap,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            timeout: DEFAULT_TIMEOUT,
            serial: SerialConfig::default(),
            registers: proto::RegisterMap::drs(),
        }
    }
}

/// Loads the configuration file, or the defaults when no file is given.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        log::debug!("No config file given, using defaults");
        return Ok(Config::default());
    };
    log::debug!("Loading config file from {path:?}");
    let file = File::open(path).with_context(|| format!("Cannot open config file {path:?}"))?;
    let config: Config = serde_yaml::from_reader(&file)
        .with_context(|| format!("Cannot parse config file {path:?}"))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = load(None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.listen.to_string(), "0.0.0.0:8080");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.registers.len(), 8);
    }

    #[test]
    fn full_file() {
        let yaml = r#"
listen: 127.0.0.1:9000
timeout: 500ms
serial:
  baud_rate: 19200
  slave: 3
registers:
  - name: output_voltage_set
    address: 0x0100
  - name: constant_voltage
    address: 0x0101
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.listen, SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(config.serial.baud_rate, proto::BaudRate::B19200);
        assert_eq!(*config.serial.slave, 3);
        let addresses: Vec<u16> = config.registers.iter().map(|r| r.address).collect();
        assert_eq!(addresses, vec![0x0100, 0x0101]);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = serde_yaml::from_str("timeout: 2s\n").unwrap();
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.serial, SerialConfig::default());
        assert_eq!(config.registers, proto::RegisterMap::drs());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(serde_yaml::from_str::<Config>("serial:\n  slave: 0\n").is_err());
        assert!(serde_yaml::from_str::<Config>("serial:\n  baud_rate: 1000\n").is_err());
        assert!(serde_yaml::from_str::<Config>("registers: []\n").is_err());
        assert!(serde_yaml::from_str::<Config>(
            "registers:\n  - {name: a, address: 1}\n  - {name: b, address: 1}\n"
        )
        .is_err());
        assert!(serde_yaml::from_str::<Config>("polling: 1s\n").is_err());
    }
}
