/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
pub mod backend;
pub mod command;
pub mod port;
use crate::connection::command::Command;
use crate::connection::port::{DeviceDescriptor, HpmPort, MAX_REGISTER_LEN};
use crate::error::{HpmError, Primitive, Result};
use log::{debug, info, trace};

/// Register map of the controller.
pub mod regs {
    /// Mode / status tag, four ASCII characters ("APP ", "DBMa", ...).
    pub const MODE: u8 = 0x03;
    pub const CMD1: u8 = 0x08;
    /// Command argument and result exchange.
    pub const DATA1: u8 = 0x09;
    pub const POWER_STATUS: u8 = 0x3f;
    /// VDM exchange: toggle byte followed by the last received VDM.
    pub const VDM_RX: u8 = 0x4d;
}

#[derive(Debug)]
pub struct Connection {
    pub port: Box<dyn HpmPort>,
}

impl Connection {
    pub fn new(port: Box<dyn HpmPort>) -> Self {
        Connection { port }
    }

    pub fn open(&mut self) -> Result<()> {
        self.port.open()?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.port.close()?;
        Ok(())
    }

    pub fn port_name(&self) -> String {
        self.port.get_port_name()
    }

    pub fn read_register(&mut self, chip: u64, reg: u8, max_len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; max_len.min(MAX_REGISTER_LEN)];
        let n = self
            .port
            .read(chip, reg, &mut buf)
            .map_err(|source| HpmError::Transport {
                primitive: Primitive::Read,
                chip,
                target: format!("register 0x{:02x}", reg),
                source,
            })?;
        buf.truncate(n);
        trace!("rd {}:0x{:02x} -> {}", chip, reg, hex::encode(&buf));
        Ok(buf)
    }

    pub fn write_register(&mut self, chip: u64, reg: u8, data: &[u8]) -> Result<()> {
        trace!("wr {}:0x{:02x} <- {}", chip, reg, hex::encode(data));
        self.port
            .write(chip, reg, data)
            .map_err(|source| HpmError::Transport {
                primitive: Primitive::Write,
                chip,
                target: format!("register 0x{:02x}", reg),
                source,
            })
    }

    pub fn execute(&mut self, chip: u64, cmd: Command, flags: u32) -> Result<()> {
        debug!("Executing {} on chip {}", cmd, chip);
        self.port
            .execute(chip, cmd.code(), flags)
            .map_err(|source| HpmError::Transport {
                primitive: Primitive::Execute,
                chip,
                target: format!("command {}", cmd),
                source,
            })
    }
}

/// Finds the controller with identifier 0.
pub fn find_hpm_port() -> Result<DeviceDescriptor> {
    info!("Looking for HPM devices...");

    #[cfg(target_os = "linux")]
    let candidates = backend::find_i2c_hpm_ports();
    #[cfg(not(target_os = "linux"))]
    let candidates: Vec<DeviceDescriptor> = Vec::new();

    let found = candidates
        .into_iter()
        .find(|d| d.id == 0)
        .ok_or(HpmError::NoDevice)?;
    info!("Found: {} on i2c-{} at 0x{:02x}", found.name, found.bus, found.address);
    Ok(found)
}

#[cfg(target_os = "linux")]
pub fn get_hpm_port_connection(descriptor: DeviceDescriptor) -> Result<Connection> {
    let mut connection = Connection::new(Box::new(backend::I2cHpmPort::new(descriptor)));
    connection.open()?;
    Ok(connection)
}

#[cfg(not(target_os = "linux"))]
pub fn get_hpm_port_connection(_descriptor: DeviceDescriptor) -> Result<Connection> {
    Err(HpmError::NoDevice)
}
