/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::error::Result;
use std::time::Duration;

/// Source of delays, swapped out in tests so nothing really waits.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Bounded busy-poll: up to `attempts` probes, `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Runs `probe` until it yields a value. `Ok(None)` means every attempt
    /// came back empty; errors from `probe` end the poll immediately.
    pub fn run<T>(
        &self,
        sleeper: &mut dyn Sleeper,
        mut probe: impl FnMut(u32) -> Result<Option<T>>,
    ) -> Result<Option<T>> {
        for attempt in 0..self.attempts {
            if attempt > 0 && !self.interval.is_zero() {
                sleeper.sleep(self.interval);
            }
            if let Some(value) = probe(attempt)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}
