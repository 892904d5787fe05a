/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
pub mod config;
pub mod device;
pub mod platform;
pub mod poll;
pub mod utilities;
