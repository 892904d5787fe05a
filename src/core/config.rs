/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::core::poll::PollPolicy;
use std::time::Duration;

pub const VDM_REPLY_POLL: PollPolicy = PollPolicy::new(16, Duration::ZERO);
pub const CONNECT_POLL: PollPolicy = PollPolicy::new(30, Duration::from_millis(100));
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Chip index of the port being driven.
    pub port: u64,
    pub vdm_reply: PollPolicy,
    /// Waiting for the partner to reconnect after a reboot.
    pub connect: PollPolicy,
    pub settle: Duration,
}

impl SessionConfig {
    pub fn new(port: u64) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: 0,
            vdm_reply: VDM_REPLY_POLL,
            connect: CONNECT_POLL,
            settle: SETTLE_DELAY,
        }
    }
}
