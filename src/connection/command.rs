/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use std::fmt;

/// HPM firmware commands. Each opcode is a four character code packed
/// big-endian, so `Lock` is the ASCII sequence "LOCK".
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // Security
    Lock = 0x4C4F_434B, // "LOCK"
    Gaid = 0x4761_6964, // "Gaid", cold reset of the controller firmware

    // Debug / vendor extensions
    Dbma = 0x4442_4D61, // "DBMa"
    Vdms = 0x5644_4D73, // "VDMs"
    Dven = 0x4456_456E, // "DVEn"
}

impl Command {
    pub fn code(self) -> u32 {
        self as u32
    }

    /// The opcode as it appears on the wire, in ASCII order.
    pub fn fourcc(self) -> [u8; 4] {
        self.code().to_be_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.fourcc()))
    }
}
