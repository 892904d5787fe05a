/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/

/// Turns a NUL padded register value into text, cut at the first NUL.
pub fn register_tag(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_stops_at_first_nul() {
        assert_eq!(register_tag(b"DBMa\0\0\0\0"), "DBMa");
        assert_eq!(register_tag(b"APP \0junk"), "APP ");
        assert_eq!(register_tag(b"XXXX"), "XXXX");
        assert_eq!(register_tag(b""), "");
    }
}
