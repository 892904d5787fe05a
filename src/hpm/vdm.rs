/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::connection::command::Command;
use crate::connection::port::MAX_REGISTER_LEN;
use crate::connection::{Connection, regs};
use crate::core::poll::{PollPolicy, Sleeper};
use crate::error::{HpmError, Result};
use log::{debug, error};

/// `0b011` in bits 4..6 of the frame header byte.
pub const VDM_HEADER_TAG: u8 = 0x30;
pub const VDM_MAX_WORDS: usize = 0x0f;
/// Set by the partner in the echoed VDM header when it acknowledges.
pub const VDM_ACK: u32 = 0x40;

// Apple vendor structured VDM header
pub const APPLE_VDM_HEADER: u32 = 0x05ac_8012;

/// Builds the VDMs argument: header byte then every word little-endian.
pub fn encode_vdm(words: &[u32]) -> Result<Vec<u8>> {
    if words.len() > VDM_MAX_WORDS {
        return Err(HpmError::InvalidFrame { words: words.len() });
    }

    let mut frame = Vec::with_capacity(1 + 4 * words.len());
    frame.push(VDM_HEADER_TAG | words.len() as u8);
    for word in words {
        frame.extend_from_slice(&word.to_le_bytes());
    }
    Ok(frame)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VdmReply {
    pub toggle: u8,
    pub header: u32,
    /// Anything after the echoed header, left uninterpreted.
    pub payload: Vec<u8>,
}

impl VdmReply {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < 5 {
            return Err(HpmError::protocol(
                "Short VDM reply",
                "at least 5 bytes",
                format!("{} bytes", raw.len()),
            ));
        }

        Ok(VdmReply {
            toggle: raw[0],
            header: u32::from_le_bytes([raw[1], raw[2], raw[3], raw[4]]),
            payload: raw[5..].to_vec(),
        })
    }

    /// Checks that this reply acknowledges a VDM whose first word is `request_header`.
    pub fn check_ack(&self, request_header: u32) -> Result<()> {
        let expected = request_header | VDM_ACK;
        if self.header != expected {
            error!("VDM failed (reply: 0x{:08x})", self.header);
            return Err(HpmError::protocol(
                "VDM not acknowledged",
                format!("0x{:08x}", expected),
                format!("0x{:08x}", self.header),
            ));
        }
        Ok(())
    }
}

impl Connection {
    /// Sends a VDM on `chip` and waits for the partner's acknowledgment.
    pub fn send_vdm(
        &mut self,
        chip: u64,
        words: &[u32],
        reply_policy: &PollPolicy,
        sleeper: &mut dyn Sleeper,
    ) -> Result<VdmReply> {
        let Some(&request_header) = words.first() else {
            return Err(HpmError::InvalidFrame { words: 0 });
        };
        let frame = encode_vdm(words)?;

        let baseline = self.read_register(chip, regs::VDM_RX, MAX_REGISTER_LEN)?;
        let rxst = baseline.first().copied().unwrap_or(0);

        debug!("Sending VDM {:08x?} (rx toggle 0x{:02x})", words, rxst);
        let status = self.command(chip, Command::Vdms, &frame)?;
        if status != 0 {
            return Err(HpmError::protocol(
                "Failed to send VDM",
                "status 0",
                format!("status 0x{:x}", status),
            ));
        }

        let raw = reply_policy
            .run(sleeper, |_| {
                let rs = self.read_register(chip, regs::VDM_RX, MAX_REGISTER_LEN)?;
                Ok(match rs.first() {
                    Some(&toggle) if toggle != rxst => Some(rs),
                    _ => None,
                })
            })?
            .ok_or(HpmError::Timeout {
                what: "VDM reply",
                attempts: reply_policy.attempts,
            })?;

        let reply = VdmReply::parse(&raw)?;
        reply.check_ack(request_header)?;
        debug!("VDM acknowledged: 0x{:08x}", reply.header);
        Ok(reply)
    }
}
