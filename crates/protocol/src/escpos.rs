//! ESC/POS byte sequences and printer status decoding
//!
//! Only the subset needed to print plain text, cut, and ask the printer
//! for its paper sensor state. No command renderer lives here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `GS V 66 0`: feed to the cutter position, then partial cut
pub const CUT: [u8; 4] = [0x1d, 0x56, 0x42, 0x00];

/// `DLE EOT 4`: real-time status request for the roll paper sensor
pub const STATUS_QUERY: [u8; 3] = [0x10, 0x04, 0x04];

/// Paper end sensor bits
pub const PAPER_END_MASK: u32 = 0x18;

/// Paper near-end sensor bit
pub const PAPER_LOW_MASK: u32 = 0x08;

/// Encode one copy of a text payload: UTF-8 bytes followed by a newline
pub fn encode_text(content: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(content.len() + 1);
    payload.extend_from_slice(content.as_bytes());
    payload.push(b'\n');
    payload
}

/// Printer condition derived from a raw status value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCondition {
    Ready,
    PaperLow,
    PaperEnd,
    /// No successful status query; never produced by [`decode_status`]
    Unknown,
}

impl fmt::Display for StatusCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusCondition::Ready => "ready",
            StatusCondition::PaperLow => "paper_low",
            StatusCondition::PaperEnd => "paper_end",
            StatusCondition::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Decode a raw status value
///
/// First match wins: paper end, then paper low, otherwise ready.
pub fn decode_status(raw: u32) -> StatusCondition {
    if raw & PAPER_END_MASK == PAPER_END_MASK {
        StatusCondition::PaperEnd
    } else if raw & PAPER_LOW_MASK == PAPER_LOW_MASK {
        StatusCondition::PaperLow
    } else {
        StatusCondition::Ready
    }
}
