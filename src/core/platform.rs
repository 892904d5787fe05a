/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::error::{HpmError, Result};
use std::fmt;
use std::path::PathBuf;

pub const DEVICE_TREE_COMPATIBLE: &str = "/proc/device-tree/compatible";

/// Session key accepted by the LOCK command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockKey(u32);

impl UnlockKey {
    pub fn new(value: u32) -> Self {
        UnlockKey(value)
    }

    /// The first four characters of the platform name, packed big-endian
    /// ("J293AP" gives 0x4a323933).
    pub fn from_platform_name(name: &str) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.len() < 4 {
            return Err(HpmError::InvalidPlatform {
                name: name.to_string(),
            });
        }
        Ok(UnlockKey(u32::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ])))
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn to_le_bytes(&self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for UnlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

pub trait PlatformIdentifier {
    /// Human readable device type name, e.g. "J293AP".
    fn platform_name(&self) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct FixedPlatform(pub String);

impl PlatformIdentifier for FixedPlatform {
    fn platform_name(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Reads the board name from the device tree root `compatible` property.
#[derive(Debug, Clone)]
pub struct DeviceTreePlatform {
    path: PathBuf,
}

impl DeviceTreePlatform {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for DeviceTreePlatform {
    fn default() -> Self {
        Self::new(DEVICE_TREE_COMPATIBLE)
    }
}

impl PlatformIdentifier for DeviceTreePlatform {
    fn platform_name(&self) -> Result<String> {
        let raw = std::fs::read(&self.path)?;
        board_from_compatible(&raw).ok_or_else(|| HpmError::InvalidPlatform {
            name: String::from_utf8_lossy(&raw).into_owned(),
        })
    }
}

/// `apple,j293\0apple,arm-platform\0` -> `J293`
fn board_from_compatible(raw: &[u8]) -> Option<String> {
    let first = raw.split(|&b| b == 0).next()?;
    let first = std::str::from_utf8(first).ok()?;
    let board = match first.split_once(',') {
        Some((_, board)) => board,
        None => first,
    };
    if board.is_empty() {
        return None;
    }
    Some(board.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_packs_first_four_characters() {
        let key = UnlockKey::from_platform_name("J293AP").unwrap();
        assert_eq!(key.value(), 0x4a32_3933);
        assert_eq!(key.to_le_bytes(), [0x33, 0x39, 0x32, 0x4a]);
    }

    #[test]
    fn short_names_are_rejected() {
        assert!(matches!(
            UnlockKey::from_platform_name("J29"),
            Err(HpmError::InvalidPlatform { .. })
        ));
    }

    #[test]
    fn board_name_from_compatible() {
        assert_eq!(
            board_from_compatible(b"apple,j293\0apple,t8103\0apple,arm-platform\0"),
            Some("J293".to_string())
        );
        assert_eq!(board_from_compatible(b"j274\0"), Some("J274".to_string()));
        assert_eq!(board_from_compatible(b"\0"), None);
    }
}
