// ABOUTME: CMPP protocol version byte and the wire widths that depend on it
// ABOUTME: High nibble selects the 2.0 (narrow) or 3.0 (wide) field layout

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol version as carried in the Connect message (0x20, 0x30).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(u8);

impl ProtocolVersion {
    /// CMPP 2.0
    pub const V20: ProtocolVersion = ProtocolVersion(0x20);
    /// CMPP 3.0
    pub const V30: ProtocolVersion = ProtocolVersion(0x30);

    pub const fn new(raw: u8) -> Self {
        ProtocolVersion(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn major(self) -> u8 {
        self.0 >> 4
    }

    /// 3.x peers use the wide layout, anything else the 2.0 layout
    pub const fn is_v3(self) -> bool {
        self.0 & 0xf0 == 0x30
    }

    pub const fn same_major(self, other: ProtocolVersion) -> bool {
        self.major() == other.major()
    }

    /// Width of terminal ID fields (fee/dest/src terminal)
    pub const fn terminal_id_len(self) -> usize {
        if self.is_v3() { 32 } else { 21 }
    }

    /// Width of status/result fields in responses
    pub const fn status_len(self) -> usize {
        if self.is_v3() { 4 } else { 1 }
    }

    /// Trailing field of Submit/Deliver: link_id on 3.0, reserve on 2.0
    pub const fn trailer_len(self) -> usize {
        if self.is_v3() { 20 } else { 8 }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        ProtocolVersion::V30
    }
}

impl From<u8> for ProtocolVersion {
    fn from(raw: u8) -> Self {
        ProtocolVersion(raw)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 >> 4, self.0 & 0x0f)
    }
}
