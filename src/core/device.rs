/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::connection::command::Command;
use crate::connection::port::MAX_REGISTER_LEN;
use crate::connection::{Connection, regs};
use crate::core::config::SessionConfig;
use crate::core::platform::{PlatformIdentifier, UnlockKey};
use crate::core::poll::Sleeper;
use crate::core::utilities::register_tag;
use crate::error::{HpmError, Result};
use crate::hpm::vdm::{APPLE_VDM_HEADER, VdmReply};
use log::{debug, error, info, warn};
use std::fmt;

pub const DEBUG_MODE_TAG: &str = "DBMa";

/// Argument of the serial VDM and of DVEn: the serial pin mux selection.
pub const SERIAL_MODE: u32 = 0x0184_0306;

const SERIAL_VDM: [u32; 2] = [APPLE_VDM_HEADER, SERIAL_MODE];
const REBOOT_VDM: [u32; 3] = [APPLE_VDM_HEADER, 0x105, 0x8000_0000];
const DFU_VDM: [u32; 3] = [APPLE_VDM_HEADER, 0x106, 0x8001_0000];

const DEBUG_MODE_ON: [u8; 1] = [0x01];
const DEBUG_MODE_OFF: [u8; 1] = [0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    None,
    Source,
    Sink,
}

impl ConnectionState {
    /// Bit 0 of POWER_STATUS is "connected", bit 1 the power role.
    pub fn from_power_status(status: u8) -> Self {
        if status & 0x01 == 0 {
            ConnectionState::None
        } else if status & 0x02 == 0 {
            ConnectionState::Source
        } else {
            ConnectionState::Sink
        }
    }

    pub fn is_connected(self) -> bool {
        self != ConnectionState::None
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::None => f.write_str("None"),
            ConnectionState::Source => f.write_str("Source"),
            ConnectionState::Sink => f.write_str("Sink"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Unprobed,
    Disconnected,
    Connected(ConnectionState),
    Locked,
    Unlocked,
    DebugEntered,
    SerialMode,
    DfuMode,
    PostReboot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Serial,
    Reboot,
    RebootSerial,
    Dfu,
    Nop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// The local end refused a command; the chip state is still valid.
    SoftFailure { command: Command, status: u8 },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

/// One HPM port session. Dropping the device leaves DBMa mode and closes the
/// port, whatever state the session ended in.
pub struct Device {
    connection: Connection,
    config: SessionConfig,
    sleeper: Box<dyn Sleeper>,
    state: DeviceState,
}

impl Device {
    pub fn new(connection: Connection, config: SessionConfig, sleeper: Box<dyn Sleeper>) -> Self {
        Device {
            connection,
            config,
            sleeper,
            state: DeviceState::Unprobed,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    fn port(&self) -> u64 {
        self.config.port
    }

    pub fn probe_connection(&mut self) -> Result<ConnectionState> {
        let port = self.port();
        let raw = self
            .connection
            .read_register(port, regs::POWER_STATUS, MAX_REGISTER_LEN)?;
        let conn = ConnectionState::from_power_status(raw.first().copied().unwrap_or(0));
        info!("Connection: {}", conn);

        self.state = if conn.is_connected() {
            DeviceState::Connected(conn)
        } else {
            DeviceState::Disconnected
        };
        Ok(conn)
    }

    pub fn status_tag(&mut self) -> Result<String> {
        let port = self.port();
        let raw = self
            .connection
            .read_register(port, regs::MODE, MAX_REGISTER_LEN)?;
        let tag = register_tag(&raw);
        info!("Status: {}", tag);
        Ok(tag)
    }

    /// Probes the port and, unless the chip already is in DBMa mode, unlocks
    /// it and enters DBMa mode.
    pub fn bootstrap(&mut self, platform: &dyn PlatformIdentifier) -> Result<()> {
        if !self.probe_connection()?.is_connected() {
            return Err(HpmError::NotConnected {
                chip: self.config.port,
            });
        }

        if self.status_tag()? == DEBUG_MODE_TAG {
            self.state = DeviceState::DebugEntered;
            return Ok(());
        }
        self.state = DeviceState::Locked;

        let name = platform.platform_name()?;
        info!("Mac type: {}", name);
        let key = UnlockKey::from_platform_name(&name)?;
        debug!("Unlock key: {}", key);
        self.unlock(key)?;
        self.activate_debug_mode()
    }

    pub fn unlock(&mut self, key: UnlockKey) -> Result<()> {
        let port = self.port();
        let args = key.to_le_bytes();

        info!("Unlocking...");
        let status = self.connection.command(port, Command::Lock, &args)?;
        if status != 0 {
            warn!("Unlock failed (status 0x{:x}), trying to reset...", status);
            let reset = self.connection.command(port, Command::Gaid, &[])?;
            if reset != 0 {
                error!("Reset failed (status 0x{:x})", reset);
                return Err(HpmError::UnlockFailed {
                    stage: "Gaid",
                    status: reset,
                });
            }

            info!("Reset OK, unlocking...");
            let status = self.connection.command(port, Command::Lock, &args)?;
            if status != 0 {
                error!("Unlock failed (status 0x{:x})", status);
                return Err(HpmError::UnlockFailed {
                    stage: "LOCK",
                    status,
                });
            }
        }

        info!("Unlock OK");
        self.state = DeviceState::Unlocked;
        Ok(())
    }

    pub fn enter_debug_mode(&mut self) -> Result<()> {
        if self.status_tag()? == DEBUG_MODE_TAG {
            debug!("Already in DBMa mode");
            self.state = DeviceState::DebugEntered;
            return Ok(());
        }
        self.activate_debug_mode()
    }

    fn activate_debug_mode(&mut self) -> Result<()> {
        info!("Entering DBMa mode...");
        let port = self.port();
        let status = self.connection.command(port, Command::Dbma, &DEBUG_MODE_ON)?;
        if status != 0 {
            return Err(HpmError::ModeEntryFailed {
                mode: DEBUG_MODE_TAG,
                observed: format!("DBMa returned 0x{:x}", status),
            });
        }

        let tag = self.status_tag()?;
        if tag != DEBUG_MODE_TAG {
            return Err(HpmError::ModeEntryFailed {
                mode: DEBUG_MODE_TAG,
                observed: tag,
            });
        }

        self.state = DeviceState::DebugEntered;
        Ok(())
    }

    // Best effort, only ever called from Drop.
    fn exit_debug_mode(&mut self) {
        info!("Exiting DBMa mode...");
        let port = self.port();
        match self.connection.command(port, Command::Dbma, &DEBUG_MODE_OFF) {
            Ok(0) => info!("Exiting DBMa mode: OK"),
            Ok(status) => warn!("Exiting DBMa mode: Failed (status 0x{:x})", status),
            Err(e) => warn!("Exiting DBMa mode: Failed ({})", e),
        }
    }

    fn send_vdm(&mut self, words: &[u32]) -> Result<VdmReply> {
        self.connection.send_vdm(
            self.config.port,
            words,
            &self.config.vdm_reply,
            self.sleeper.as_mut(),
        )
    }

    pub fn enter_serial_mode(&mut self) -> Result<Outcome> {
        info!("Putting target into serial mode...");
        self.send_vdm(&SERIAL_VDM)?;
        self.state = DeviceState::SerialMode;
        info!("Target in serial mode");

        info!("Putting local end into serial mode...");
        let port = self.port();
        let status = self
            .connection
            .command(port, Command::Dven, &SERIAL_MODE.to_le_bytes())?;
        if status != 0 {
            warn!("Local end refused serial mode (status 0x{:x})", status);
            return Ok(Outcome::SoftFailure {
                command: Command::Dven,
                status,
            });
        }

        info!("Local end in serial mode");
        Ok(Outcome::Completed)
    }

    pub fn reboot(&mut self) -> Result<()> {
        info!("Rebooting target into normal mode...");
        self.send_vdm(&REBOOT_VDM)?;
        self.state = DeviceState::PostReboot;
        info!("Reboot OK");
        Ok(())
    }

    pub fn reboot_into_serial(&mut self) -> Result<Outcome> {
        self.reboot()?;

        info!("Waiting for connection...");
        self.sleeper.sleep(self.config.settle);

        let port = self.config.port;
        let policy = self.config.connect;
        let connection = &mut self.connection;
        let found = policy.run(self.sleeper.as_mut(), |attempt| {
            let raw = connection.read_register(port, regs::POWER_STATUS, MAX_REGISTER_LEN)?;
            let conn = ConnectionState::from_power_status(raw.first().copied().unwrap_or(0));
            debug!("Connection poll {}: {}", attempt + 1, conn);
            Ok(conn.is_connected().then_some(conn))
        })?;

        let Some(conn) = found else {
            error!("Timed out waiting for connection");
            return Err(HpmError::Timeout {
                what: "connection",
                attempts: policy.attempts,
            });
        };
        info!("Connected ({})", conn);
        self.state = DeviceState::Connected(conn);

        self.sleeper.sleep(self.config.settle);
        self.enter_serial_mode()
    }

    pub fn enter_dfu(&mut self) -> Result<()> {
        info!("Rebooting target into DFU mode...");
        self.send_vdm(&DFU_VDM)?;
        self.state = DeviceState::DfuMode;
        info!("DFU OK");
        Ok(())
    }

    pub fn run(&mut self, operation: Operation) -> Result<Outcome> {
        debug!("Running {:?}", operation);
        match operation {
            Operation::Serial => self.enter_serial_mode(),
            Operation::Reboot => self.reboot().map(|_| Outcome::Completed),
            Operation::RebootSerial => self.reboot_into_serial(),
            Operation::Dfu => self.enter_dfu().map(|_| Outcome::Completed),
            Operation::Nop => Ok(Outcome::Completed),
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.exit_debug_mode();
        if let Err(e) = self.connection.close() {
            warn!("Failed to close {}: {}", self.connection.port_name(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_status_decoding() {
        assert_eq!(ConnectionState::from_power_status(0x00), ConnectionState::None);
        assert_eq!(ConnectionState::from_power_status(0xfe), ConnectionState::None);
        assert_eq!(ConnectionState::from_power_status(0x02), ConnectionState::None);
        assert_eq!(ConnectionState::from_power_status(0x01), ConnectionState::Source);
        assert_eq!(ConnectionState::from_power_status(0xf1), ConnectionState::Source);
        assert_eq!(ConnectionState::from_power_status(0x03), ConnectionState::Sink);
        assert_eq!(ConnectionState::from_power_status(0xff), ConnectionState::Sink);
    }

    #[test]
    fn only_completed_is_success() {
        assert!(Outcome::Completed.is_success());
        assert!(
            !Outcome::SoftFailure {
                command: Command::Dven,
                status: 1
            }
            .is_success()
        );
    }
}
