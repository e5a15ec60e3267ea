//! DRS charger command line tool and HTTP gateway
//!
//! A command-line interface (CLI) application for the configuration registers
//! of a DRS battery charger, using Modbus RTU (serial) or Modbus TCP.
//!
//! This tool allows users to:
//! - Read all configuration registers.
//! - Write all configuration registers in one ordered sequence.
//! - List the serial ports of the machine.
//! - Run an HTTP gateway offering the same operations to a web front end.
//!
//! The CLI leverages the `drs_lib` crate for the register map, transports and
//! sessions.

use anyhow::{Context, Result};
use clap::Parser;
use drs_lib::{
    http_api, protocol as proto, session, tokio_common::ConnectionParameters,
    tokio_sync::ModbusConnector, transport::Connector,
};
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use std::net::SocketAddr;
use std::panic;

mod commandline;
mod config;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

fn run_command(
    params: &ConnectionParameters,
    map: &proto::RegisterMap,
    command: &commandline::CliCommands,
) -> Result<()> {
    match command {
        commandline::CliCommands::Read => {
            info!("Executing: Read Registers from {params}");
            let values = session::read_registers(&ModbusConnector, params, map)
                .with_context(|| format!("Cannot read registers from {params}"))?;
            for (register, value) in map.iter().zip(values.iter()) {
                println!("{:<24} {:#06x}  {}", register.name, register.address, value);
            }
        }
        commandline::CliCommands::Write { values } => {
            info!("Executing: Write {} Registers to {params}", values.len());
            session::write_registers(&ModbusConnector, params, map, values)
                .with_context(|| format!("Cannot write registers to {params}"))?;
            println!("{} registers written successfully.", values.len());
        }
    }
    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = ModbusConnector
        .available_ports()
        .context("Cannot list serial ports")?;
    if ports.is_empty() {
        anyhow::bail!("No serial ports found");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

fn serve(config: config::Config, listen: SocketAddr) -> Result<()> {
    let state = http_api::AppState::new(ModbusConnector, config.registers)
        .with_serial(config.serial.baud_rate, config.serial.slave)
        .with_timeout(config.timeout);
    let app = http_api::router(state);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Cannot start async runtime")?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(listen)
            .await
            .with_context(|| format!("Cannot listen on {listen}"))?;
        info!("HTTP gateway listening on {listen}");
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    error!("Cannot listen for shutdown signal: {err}");
                }
                info!("Shutting down");
            })
            .await
            .context("HTTP gateway failed")
    })
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "DRS CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    let config = config::load(args.config.as_deref())?;
    let timeout = args.timeout.unwrap_or(config.timeout);

    match &args.connection {
        commandline::CliConnection::ListPorts => list_ports(),
        commandline::CliConnection::Serve { listen } => {
            let listen = listen.unwrap_or(config.listen);
            let config = config::Config { timeout, ..config };
            serve(config, listen)
        }
        commandline::CliConnection::Tcp { address, command } => {
            let params = ConnectionParameters::tcp_from_address(address)
                .with_context(|| format!("Invalid TCP address: '{address}'"))?
                .with_timeout(timeout);
            run_command(&params, &config.registers, command)
        }
        commandline::CliConnection::Rtu {
            device,
            baud_rate,
            slave,
            command,
        } => {
            let params = ConnectionParameters::serial(
                device.as_str(),
                baud_rate.unwrap_or(config.serial.baud_rate),
                slave.unwrap_or(config.serial.slave),
            )
            .with_context(|| format!("Invalid serial device: '{device}'"))?
            .with_timeout(timeout);
            run_command(&params, &config.registers, command)
        }
    }
}
