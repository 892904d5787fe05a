/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Builder;
use log::{LevelFilter, error};
use std::process::ExitCode;
use vdmtool::connection::port::DeviceDescriptor;
use vdmtool::core::config::SessionConfig;
use vdmtool::core::platform::{DeviceTreePlatform, FixedPlatform, PlatformIdentifier};
use vdmtool::core::poll::ThreadSleeper;
use vdmtool::{Device, Operation, Outcome, Result, find_hpm_port, get_hpm_port_connection};

const EXIT_FAILURE: u8 = 1;
const EXIT_FATAL: u8 = 255;

#[derive(Parser)]
#[command(name = "vdmtool", about = "Switch Apple Silicon USB-C ports into debug modes", version)]
struct Cli {
    /// i2c bus of the HPM controller, skips discovery
    #[arg(long, env = "VDMTOOL_I2C_BUS", requires = "address")]
    bus: Option<u32>,

    /// i2c address of the HPM controller (e.g. 0x38)
    #[arg(long, env = "VDMTOOL_I2C_ADDRESS", value_parser = parse_address, requires = "bus")]
    address: Option<u16>,

    /// Chip index of the port to drive
    #[arg(long, default_value_t = 0)]
    port: u64,

    /// Platform name to derive the unlock key from, instead of the device tree
    #[arg(long, env = "VDMTOOL_PLATFORM")]
    platform: Option<String>,

    /// Log register traffic
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Enter serial mode on both ends
    Serial,
    /// Reboot the target, optionally into serial mode
    Reboot {
        #[arg(value_enum)]
        target: Option<RebootTarget>,
    },
    /// Put the target into DFU mode
    Dfu,
    /// Do nothing
    Nop,
}

#[derive(Clone, Copy, ValueEnum)]
enum RebootTarget {
    Serial,
}

impl Cmd {
    fn operation(&self) -> Operation {
        match self {
            Cmd::Serial => Operation::Serial,
            Cmd::Reboot { target: None } => Operation::Reboot,
            Cmd::Reboot {
                target: Some(RebootTarget::Serial),
            } => Operation::RebootSerial,
            Cmd::Dfu => Operation::Dfu,
            Cmd::Nop => Operation::Nop,
        }
    }
}

fn parse_address(s: &str) -> std::result::Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid i2c address {:?}: {}", s, e))
}

// Register reads and writes are logged at trace.
fn log_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Trace
    } else {
        LevelFilter::Info
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_FAILURE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    Builder::new()
        .filter_level(log_level(cli.verbose))
        .parse_default_env()
        .format_timestamp(None)
        .init();

    // The device is dropped inside run(), so teardown has happened by the
    // time anything is reported here.
    match run(&cli) {
        Ok(Outcome::Completed) => ExitCode::SUCCESS,
        Ok(Outcome::SoftFailure { command, status }) => {
            error!("{} failed with status 0x{:x}", command, status);
            ExitCode::from(EXIT_FAILURE)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run(cli: &Cli) -> Result<Outcome> {
    let platform: Box<dyn PlatformIdentifier> = match &cli.platform {
        Some(name) => Box::new(FixedPlatform(name.clone())),
        None => Box::new(DeviceTreePlatform::default()),
    };

    let descriptor = match (cli.bus, cli.address) {
        (Some(bus), Some(address)) => DeviceDescriptor {
            id: 0,
            bus,
            address,
            name: String::from("hpm"),
        },
        _ => find_hpm_port()?,
    };

    let connection = get_hpm_port_connection(descriptor)?;
    let mut device = Device::new(
        connection,
        SessionConfig::new(cli.port),
        Box::new(ThreadSleeper),
    );

    device.bootstrap(platform.as_ref())?;
    device.run(cli.command.operation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log, Metadata};

    fn enabled(verbose: bool, level: Level, target: &str) -> bool {
        let logger = Builder::new().filter_level(log_level(verbose)).build();
        logger.enabled(&Metadata::builder().level(level).target(target).build())
    }

    #[test]
    fn verbose_shows_register_traffic() {
        assert!(enabled(true, Level::Trace, "vdmtool::connection"));
        assert!(!enabled(false, Level::Trace, "vdmtool::connection"));
        assert!(!enabled(false, Level::Debug, "vdmtool::hpm::protocol"));
        assert!(enabled(false, Level::Info, "vdmtool::core::device"));
    }

    #[test]
    fn reboot_serial_maps_to_its_operation() {
        let cli = Cli::try_parse_from(["vdmtool", "reboot", "serial"]).unwrap();
        assert_eq!(cli.command.operation(), Operation::RebootSerial);
        assert!(Cli::try_parse_from(["vdmtool", "reboot", "dfu"]).is_err());
    }
}
