/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HpmError>;

/// Channel primitive that failed, used in transport diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Read,
    Write,
    Execute,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Read => f.write_str("read"),
            Primitive::Write => f.write_str("write"),
            Primitive::Execute => f.write_str("execute"),
        }
    }
}

#[derive(Debug, Error)]
pub enum HpmError {
    #[error("{primitive} failed on chip {chip} ({target}): {source}")]
    Transport {
        primitive: Primitive,
        chip: u64,
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: expected {expected}, got {observed}")]
    Protocol {
        context: &'static str,
        expected: String,
        observed: String,
    },

    #[error("Timed out waiting for {what} after {attempts} attempts")]
    Timeout { what: &'static str, attempts: u32 },

    #[error("No connection detected on chip {chip}")]
    NotConnected { chip: u64 },

    #[error("Failed to unlock device ({stage} returned status {status:#x})")]
    UnlockFailed { stage: &'static str, status: u8 },

    #[error("Failed to enter {mode} mode (status: {observed})")]
    ModeEntryFailed {
        mode: &'static str,
        observed: String,
    },

    #[error("VDM carries {words} words, at most 15 fit in a frame")]
    InvalidFrame { words: usize },

    #[error("Platform identifier {name:?} cannot be used as an unlock key")]
    InvalidPlatform { name: String },

    #[error("No matching HPM devices")]
    NoDevice,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HpmError {
    pub fn protocol(
        context: &'static str,
        expected: impl fmt::Display,
        observed: impl fmt::Display,
    ) -> Self {
        HpmError::Protocol {
            context,
            expected: expected.to_string(),
            observed: observed.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HpmError::Timeout { .. })
    }
}
