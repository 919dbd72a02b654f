//! Log Sequence Numbers
//!
//! An LSN packs a log file number and a byte offset within that file into
//! one ordered 64-bit value:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────┐
//! │ file number (32 bit) │   offset (32 bit)    │
//! └──────────────────────┴──────────────────────┘
//! ```
//!
//! The file number occupies the high half, so LSNs keep growing when a
//! rotation resets the offset to zero.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Log Sequence Number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lsn(u64);

impl Lsn {
    /// Sentinel for "no LSN assigned"
    pub const INVALID: Lsn = Lsn(u64::MAX);

    /// Combine a file number and an offset into an LSN
    ///
    /// The all-ones combination is reserved for [`Lsn::INVALID`].
    pub fn encode(file_number: u32, offset: u32) -> Self {
        assert!(
            !(file_number == u32::MAX && offset == u32::MAX),
            "LSN ({file_number:#x}, {offset:#x}) collides with the invalid sentinel"
        );
        Lsn((u64::from(file_number) << 32) | u64::from(offset))
    }

    /// Split an LSN back into (file number, offset)
    pub fn decode(self) -> (u32, u32) {
        ((self.0 >> 32) as u32, self.0 as u32)
    }

    pub fn file_number(self) -> u32 {
        self.decode().0
    }

    pub fn offset(self) -> u32 {
        self.decode().1
    }

    pub fn is_valid(self) -> bool {
        self != Lsn::INVALID
    }

    /// True if `self` is a real LSN written after `other`. Any valid LSN is
    /// newer than the sentinel.
    pub fn is_newer_than(self, other: Lsn) -> bool {
        self.is_valid() && (!other.is_valid() || self > other)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(raw: u64) -> Self {
        Lsn(raw)
    }
}

impl Default for Lsn {
    fn default() -> Self {
        Lsn::INVALID
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            let (file, offset) = self.decode();
            write!(f, "{file:x}:{offset}")
        } else {
            f.write_str("invalid")
        }
    }
}
