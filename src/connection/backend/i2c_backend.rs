/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::connection::port::{DeviceDescriptor, HpmPort, MAX_REGISTER_LEN};
use crate::connection::regs;
use log::{debug, error, info, trace};
use std::fs::{File, OpenOptions};
use std::io::{Error, ErrorKind, Read, Result, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::thread;
use std::time::Duration;

pub const SYSFS_I2C_DEVICES: &str = "/sys/bus/i2c/devices";

/// i2c client names of the controllers speaking this register protocol.
pub const KNOWN_CONTROLLERS: &[&str] = &["cd321x", "tps6598x"];

// linux/i2c-dev.h. FORCE is needed since the typec driver usually owns the client.
const I2C_SLAVE_FORCE: u64 = 0x0706;

const EXECUTE_POLL_ATTEMPTS: u32 = 1000;
const EXECUTE_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub struct I2cHpmPort {
    file: Option<File>,
    descriptor: DeviceDescriptor,
    is_open: bool,
}

impl I2cHpmPort {
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        Self {
            file: None,
            descriptor,
            is_open: false,
        }
    }

    fn device_path(&self) -> String {
        format!("/dev/i2c-{}", self.descriptor.bus)
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::NotConnected, "Port is not open"))
    }

    // One i2c client is one chip, so only index 0 is addressable here.
    fn check_chip(chip: u64) -> Result<()> {
        if chip != 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("chip index {} is not reachable over i2c", chip),
            ));
        }
        Ok(())
    }
}

impl HpmPort for I2cHpmPort {
    fn open(&mut self) -> Result<()> {
        if self.is_open {
            return Ok(());
        }

        let path = self.device_path();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        // SAFETY: I2C_SLAVE_FORCE takes the 7-bit client address by value and
        // only affects the state of the fd we own.
        let ret = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                I2C_SLAVE_FORCE as _,
                self.descriptor.address as libc::c_ulong,
            )
        };
        if ret < 0 {
            let err = Error::last_os_error();
            error!(
                "Failed to select i2c address 0x{:02x} on {}: {}",
                self.descriptor.address, path, err
            );
            return Err(err);
        }

        self.file = Some(file);
        self.is_open = true;
        info!("Opened HPM port: {}", self.get_port_name());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.is_open {
            self.file.take();
            self.is_open = false;
            debug!("Closed HPM port: {}", self.get_port_name());
        }
        Ok(())
    }

    fn read(&mut self, chip: u64, reg: u8, buf: &mut [u8]) -> Result<usize> {
        Self::check_chip(chip)?;
        let want = buf.len().min(MAX_REGISTER_LEN);
        let file = self.file()?;

        // The chip prefixes every register with its length byte.
        file.write_all(&[reg])?;
        let mut raw = vec![0u8; want + 1];
        file.read_exact(&mut raw)?;

        let len = (raw[0] as usize).min(want);
        buf[..len].copy_from_slice(&raw[1..1 + len]);
        trace!("i2c rd 0x{:02x}: {}", reg, hex::encode(&buf[..len]));
        Ok(len)
    }

    fn write(&mut self, chip: u64, reg: u8, data: &[u8]) -> Result<()> {
        Self::check_chip(chip)?;
        if data.len() > MAX_REGISTER_LEN {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("{} bytes do not fit register 0x{:02x}", data.len(), reg),
            ));
        }

        let mut raw = Vec::with_capacity(data.len() + 2);
        raw.push(reg);
        raw.push(data.len() as u8);
        raw.extend_from_slice(data);

        trace!("i2c wr 0x{:02x}: {}", reg, hex::encode(data));
        self.file()?.write_all(&raw)
    }

    fn execute(&mut self, chip: u64, cmd: u32, flags: u32) -> Result<()> {
        if flags != 0 {
            debug!("Ignoring execute flags 0x{:x} on i2c", flags);
        }
        let fourcc = cmd.to_be_bytes();
        self.write(chip, regs::CMD1, &fourcc)?;

        for _ in 0..EXECUTE_POLL_ATTEMPTS {
            let mut status = [0u8; 4];
            let n = self.read(chip, regs::CMD1, &mut status)?;
            match command_state(&status[..n]) {
                CommandState::Done => return Ok(()),
                CommandState::Rejected => {
                    return Err(Error::new(
                        ErrorKind::Unsupported,
                        format!("command {} rejected", String::from_utf8_lossy(&fourcc)),
                    ));
                }
                CommandState::Pending => thread::sleep(EXECUTE_POLL_INTERVAL),
            }
        }

        Err(Error::new(
            ErrorKind::TimedOut,
            format!(
                "command {} did not complete",
                String::from_utf8_lossy(&fourcc)
            ),
        ))
    }

    fn get_port_name(&self) -> String {
        format!(
            "{}@0x{:02x} ({})",
            self.device_path(),
            self.descriptor.address,
            self.descriptor.name
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandState {
    Done,
    Rejected,
    Pending,
}

/// Decodes a CMD1 read. Only a full zeroed register means completion.
fn command_state(cmd1: &[u8]) -> CommandState {
    match cmd1 {
        [0, 0, 0, 0] => CommandState::Done,
        b"!CMD" => CommandState::Rejected,
        _ => CommandState::Pending,
    }
}

/// Parses an i2c client directory name such as `0-0038`.
fn parse_client_name(name: &str) -> Option<(u32, u16)> {
    let (bus, addr) = name.split_once('-')?;
    let bus = bus.parse().ok()?;
    let addr = u16::from_str_radix(addr, 16).ok()?;
    Some((bus, addr))
}

/// Lists the known controllers below `root`, ordered by bus and address.
/// The position in that order is the instance identifier.
pub fn find_i2c_hpm_ports_in(root: &Path) -> Vec<DeviceDescriptor> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            error!("Error listing {}: {}", root.display(), e);
            return vec![];
        }
    };

    let mut found: Vec<DeviceDescriptor> = entries
        .flatten()
        .filter_map(|entry| {
            let dir_name = entry.file_name().into_string().ok()?;
            let (bus, address) = parse_client_name(&dir_name)?;
            let name = std::fs::read_to_string(entry.path().join("name")).ok()?;
            let name = name.trim();
            if !KNOWN_CONTROLLERS.contains(&name) {
                return None;
            }
            Some(DeviceDescriptor {
                id: 0,
                bus,
                address,
                name: name.to_string(),
            })
        })
        .collect();

    found.sort_by_key(|d| (d.bus, d.address));
    for (id, descriptor) in found.iter_mut().enumerate() {
        descriptor.id = id as u32;
    }
    found
}

pub fn find_i2c_hpm_ports() -> Vec<DeviceDescriptor> {
    find_i2c_hpm_ports_in(Path::new(SYSFS_I2C_DEVICES))
}
