/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::connection::command::Command;
use crate::connection::{Connection, regs};
use crate::error::{HpmError, Result};
use log::debug;

/// Result codes live in the low nibble of DATA1 byte 0.
pub const RESULT_MASK: u8 = 0x0f;

impl Connection {
    /// Runs a firmware command and returns its result code, 0 meaning success.
    /// A rejection is not an error here; callers decide what it means.
    pub fn command(&mut self, chip: u64, cmd: Command, args: &[u8]) -> Result<u8> {
        if !args.is_empty() {
            self.write_register(chip, regs::DATA1, args)?;
        }
        self.execute(chip, cmd, 0)?;

        let res = self.read_register(chip, regs::DATA1, 1)?;
        let status = match res.first() {
            Some(b) => b & RESULT_MASK,
            None => {
                return Err(HpmError::protocol(
                    "Empty command result",
                    "1 byte",
                    "0 bytes",
                ));
            }
        };

        debug!("{} -> status 0x{:x}", cmd, status);
        Ok(status)
    }
}
