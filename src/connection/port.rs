/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use std::fmt::Debug;
use std::io::Result;

/// Largest register transfer the controller supports.
pub const MAX_REGISTER_LEN: usize = 64;

/// Low level access to one HPM controller. Implementations report any
/// nonzero transport status as an `Err`.
pub trait HpmPort: Debug {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;

    /// Reads register `reg` of chip `chip` into `buf`, returning how many
    /// bytes the chip supplied.
    fn read(&mut self, chip: u64, reg: u8, buf: &mut [u8]) -> Result<usize>;
    fn write(&mut self, chip: u64, reg: u8, data: &[u8]) -> Result<()>;

    /// Runs command `cmd` on the chip against the last written argument.
    fn execute(&mut self, chip: u64, cmd: u32, flags: u32) -> Result<()>;

    fn get_port_name(&self) -> String;
}

/// A discovered controller instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub id: u32,
    pub bus: u32,
    pub address: u16,
    pub name: String,
}
