/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
pub mod connection;
pub mod core;
pub mod error;
pub mod hpm;

pub use crate::connection::{Connection, find_hpm_port, get_hpm_port_connection};
pub use crate::core::device::{Device, Operation, Outcome};
pub use crate::error::{HpmError, Result};
