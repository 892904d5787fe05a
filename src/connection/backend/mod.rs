/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
#[cfg(target_os = "linux")]
pub mod i2c_backend;
#[cfg(target_os = "linux")]
pub use i2c_backend::{I2cHpmPort, find_i2c_hpm_ports};
