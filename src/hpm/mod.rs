/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
pub mod protocol;
pub mod vdm;

pub use vdm::{VdmReply, encode_vdm};
