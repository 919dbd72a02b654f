//! Journal file reader
//!
//! Loads one log file and exposes its records forwards and backwards.
//!
//! ## Valid Prefix
//! A crash can leave the end of a file torn: a header without its payload, a
//! payload without its back-link, or garbage. On open the file is walked
//! forwards and the first record that does not fully check out ends the
//! valid prefix:
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬─────────────┐
//! │ Record 1 │ Record 2 │ Record 3 │ torn tail   │
//! └──────────┴──────────┴──────────┴─────────────┘
//! 0                                ^ valid_len   ^ file_len
//! ```
//!
//! A record checks out when its header fits, its type is registered, its
//! payload and back-link fit in the file, and the back-link equals
//! `11 + length`. Backward stepping only ever happens inside the prefix.

use std::fs;
use std::path::Path;

use bytes::{Buf, Bytes};

use crate::error::Result;

use super::entry::{EntryHeader, LogRecord, LOG_ENTRY_BASE_LEN, LOG_ENTRY_HEADER_LEN};
use super::entry_types::EntryTypeRegistry;
use super::lsn::Lsn;

/// Reads the records of a single log file
pub struct LogFileReader {
    number: u32,
    data: Bytes,
    valid_len: usize,
}

impl LogFileReader {
    /// Load log file `number` from `path`
    pub fn open(path: &Path, number: u32, registry: &EntryTypeRegistry) -> Result<Self> {
        let data = Bytes::from(fs::read(path)?);
        Ok(Self::from_bytes(number, data, registry))
    }

    /// Wrap file contents already in memory
    pub fn from_bytes(number: u32, data: Bytes, registry: &EntryTypeRegistry) -> Self {
        let valid_len = Self::valid_prefix(&data, registry);
        Self {
            number,
            data,
            valid_len,
        }
    }

    /// Length of the run of well-formed records at the start of `data`
    fn valid_prefix(data: &[u8], registry: &EntryTypeRegistry) -> usize {
        let mut pos = 0;
        while let Some(header) = EntryHeader::parse(&data[pos..]) {
            if !registry.contains(header.entry_type) || !header.is_plausible() {
                break;
            }
            let len = header.framed_len();
            if data.len() - pos < len {
                break;
            }
            let mut trailer = &data[pos + len - 2..pos + len];
            if u32::from(trailer.get_u16()) != header.expected_back_link() {
                break;
            }
            pos += len;
        }
        pos
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Bytes of well-formed records
    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    /// Total bytes in the file
    pub fn file_len(&self) -> usize {
        self.data.len()
    }

    /// Bytes after the valid prefix
    pub fn torn_bytes(&self) -> usize {
        self.data.len() - self.valid_len
    }

    /// Decode the record starting at `offset`
    ///
    /// `offset` must be a record boundary inside the valid prefix.
    pub fn record_at(&self, offset: usize) -> Option<LogRecord> {
        if offset >= self.valid_len {
            return None;
        }
        let header = EntryHeader::parse(&self.data[offset..])?;
        let payload_start = offset + LOG_ENTRY_HEADER_LEN;
        let payload_end = payload_start + header.payload_len as usize;
        let lsn_offset = u32::try_from(offset + 1).ok()?;

        Some(LogRecord {
            entry_type: header.entry_type,
            transaction_id: header.transaction_id,
            payload: self.data.slice(payload_start..payload_end),
            lsn: Lsn::encode(self.number, lsn_offset),
        })
    }

    /// Start offset of the record that ends at `end`, found via its back-link
    pub fn previous_offset(&self, end: usize) -> Option<usize> {
        if end > self.valid_len || end < LOG_ENTRY_BASE_LEN {
            return None;
        }
        let mut trailer = &self.data[end - 2..end];
        let back_link = trailer.get_u16() as usize;
        (end - 2).checked_sub(back_link)
    }

    /// Records from `offset` to the end of the valid prefix
    pub fn iter_from(&self, offset: usize) -> RecordIter<'_> {
        RecordIter {
            reader: self,
            pos: offset,
        }
    }

    /// All valid records, first to last
    pub fn iter(&self) -> RecordIter<'_> {
        self.iter_from(0)
    }

    /// All valid records, last to first, following back-links
    pub fn iter_backward(&self) -> BackwardIter<'_> {
        BackwardIter {
            reader: self,
            end: self.valid_len,
        }
    }
}

/// Forward iterator over a file's records
pub struct RecordIter<'a> {
    reader: &'a LogFileReader,
    pos: usize,
}

impl Iterator for RecordIter<'_> {
    type Item = LogRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.reader.record_at(self.pos)?;
        self.pos += record.framed_len();
        Some(record)
    }
}

/// Backward iterator over a file's records
pub struct BackwardIter<'a> {
    reader: &'a LogFileReader,
    end: usize,
}

impl Iterator for BackwardIter<'_> {
    /// Start offset and record
    type Item = (usize, LogRecord);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.reader.previous_offset(self.end)?;
        let record = self.reader.record_at(start)?;
        self.end = start;
        Some((start, record))
    }
}
