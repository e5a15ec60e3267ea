use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use drs_lib::protocol as proto;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

fn parse_slave(s: &str) -> Result<proto::SlaveId, String> {
    let slave_val =
        clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid slave id format: {e}"))?;
    proto::SlaveId::try_from(slave_val).map_err(|e| e.to_string())
}

fn parse_baud_rate(s: &str) -> Result<proto::BaudRate, String> {
    let rate_val = s
        .parse::<u32>()
        .map_err(|e| format!("Invalid baud rate number format: {e}"))?;
    proto::BaudRate::try_from(rate_val).map_err(|e| e.to_string())
}

fn parse_register_value(s: &str) -> Result<u16, String> {
    clap_num::maybe_hex::<u16>(s).map_err(|e| format!("Invalid register value: {e}"))
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliConnection {
    /// Connect to the charger via Modbus TCP.
    Tcp {
        /// Host and port of the Modbus TCP device or gateway.
        /// Example: "192.168.1.100:502". The port defaults to 502.
        #[clap(verbatim_doc_comment)]
        address: String,

        #[command(subcommand)]
        command: CliCommands,
    },
    /// Connect to the charger via Modbus RTU (Serial).
    Rtu {
        /// Serial port device name.
        /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
        #[arg(short, long, default_value_t = default_device_name(), verbatim_doc_comment)]
        device: String,

        /// Baud rate for serial communication, overrides the configuration file.
        #[arg(long, value_parser = parse_baud_rate)]
        baud_rate: Option<proto::BaudRate>,

        /// The Modbus RTU slave id (1 to 247), overrides the configuration file.
        /// Can be specified in decimal or hexadecimal (e.g., "0x01").
        #[arg(short, long, value_parser = parse_slave, verbatim_doc_comment)]
        slave: Option<proto::SlaveId>,

        #[command(subcommand)]
        command: CliCommands,
    },
    /// List the serial ports available on this machine.
    ListPorts,
    /// Run the HTTP gateway.
    Serve {
        /// Socket address to listen on, overrides the configuration file.
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Read and display all configuration registers.
    Read,
    /// Write all configuration registers.
    /// Exactly one value per register, in register map order.
    #[clap(verbatim_doc_comment)]
    Write {
        /// Register values, decimal or hexadecimal (e.g., "0x1F").
        #[arg(value_parser = parse_register_value, num_args = 1.., required = true)]
        values: Vec<u16>,
    },
}

const fn about_text() -> &'static str {
    "DRS charger configuration tool - Read and write DRS charger registers via Modbus RTU/TCP."
}

#[derive(Parser, Debug)]
#[command(name="drsctl", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub connection: CliConnection,

    /// YAML configuration file with listen address, serial settings and register map.
    #[arg(global = true, short, long)]
    pub config: Option<PathBuf>,

    /// Modbus timeout for connecting and for each register transaction.
    /// Examples: "10s", "500ms". Defaults to the configuration file value.
    #[arg(global = true, long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_write_command() {
        let args = CliArgs::try_parse_from([
            "drsctl", "rtu", "-d", "/dev/ttyS1", "--slave", "0x02", "write", "10", "0x14",
        ])
        .unwrap();
        assert_eq!(
            args.connection,
            CliConnection::Rtu {
                device: "/dev/ttyS1".into(),
                baud_rate: None,
                slave: Some(proto::SlaveId::try_from(2).unwrap()),
                command: CliCommands::Write {
                    values: vec![10, 20]
                },
            }
        );
    }

    #[test]
    fn parse_global_options() {
        let args =
            CliArgs::try_parse_from(["drsctl", "tcp", "10.0.0.5", "read", "--timeout", "2s"])
                .unwrap();
        assert_eq!(args.timeout, Some(Duration::from_secs(2)));
        assert!(matches!(args.connection, CliConnection::Tcp { .. }));
    }

    #[test]
    fn rejects_invalid_input() {
        assert!(CliArgs::try_parse_from(["drsctl", "rtu", "--slave", "0", "read"]).is_err());
        assert!(CliArgs::try_parse_from(["drsctl", "rtu", "--baud-rate", "1000", "read"]).is_err());
        assert!(CliArgs::try_parse_from(["drsctl", "tcp", "host", "write"]).is_err());
        assert!(CliArgs::try_parse_from(["drsctl", "tcp", "host", "write", "70000"]).is_err());
    }
}
