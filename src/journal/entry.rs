//! Journal entry framing
//!
//! Defines the on-disk layout of a single log record and the [`Loggable`]
//! capability every record producer implements.
//!
//! ```text
//! ┌──────────┬─────────────┬─────────────┬───────────────┬───────────────┐
//! │ Type (1) │ TxnId (8)   │ Length (2)  │ Payload (len) │ BackLink (2)  │
//! └──────────┴─────────────┴─────────────┴───────────────┴───────────────┘
//! ```
//!
//! All integers are big-endian. The back-link holds `11 + len`, the distance
//! from the back-link back to the record's first byte, which lets recovery
//! walk a file from its end without an index.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::entry_types::EntryType;
use super::lsn::Lsn;

/// Transaction identifier carried by every record
pub type TxnId = u64;

/// Header length: entry type + transaction id + payload length
pub const LOG_ENTRY_HEADER_LEN: usize = 11;

/// Header plus trailing back-link
pub const LOG_ENTRY_BASE_LEN: usize = LOG_ENTRY_HEADER_LEN + 2;

/// Largest payload whose back-link still fits in 16 bits
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize - LOG_ENTRY_HEADER_LEN;

// =============================================================================
// Loggable
// =============================================================================

/// A value that can be written to the journal as one record
///
/// `write_payload` must append exactly `payload_size()` bytes. A mismatch
/// aborts the append with a panic.
pub trait Loggable {
    fn entry_type(&self) -> EntryType;

    fn transaction_id(&self) -> TxnId;

    fn payload_size(&self) -> usize;

    fn write_payload(&self, dst: &mut BytesMut);

    /// Called once the record has a position in the journal
    fn set_lsn(&mut self, lsn: Lsn);
}

/// Total framed size of a record with the given payload size
pub fn framed_len(payload_size: usize) -> usize {
    payload_size + LOG_ENTRY_BASE_LEN
}

/// Serialize `record` into `dst` as one framed entry
///
/// Leaves `dst` untouched if the record violates its size contract.
pub(crate) fn frame_into(dst: &mut BytesMut, record: &dyn Loggable) {
    let size = record.payload_size();
    assert!(
        size <= MAX_PAYLOAD_SIZE,
        "loggable of type {} declares {} payload bytes, limit is {}",
        record.entry_type(),
        size,
        MAX_PAYLOAD_SIZE
    );

    let start = dst.len();
    dst.reserve(framed_len(size));
    dst.put_u8(record.entry_type().code());
    dst.put_u64(record.transaction_id());
    dst.put_u16(size as u16);

    record.write_payload(dst);
    let written = dst.len() - start - LOG_ENTRY_HEADER_LEN;
    if written != size {
        dst.truncate(start);
        panic!(
            "loggable of type {} declared {} payload bytes but wrote {}",
            record.entry_type(),
            size,
            written
        );
    }

    dst.put_u16((size + LOG_ENTRY_HEADER_LEN) as u16);
}

/// Parsed fixed header of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub entry_type: EntryType,
    pub transaction_id: TxnId,
    pub payload_len: u16,
}

impl EntryHeader {
    /// Parse a header from the first 11 bytes of `bytes`
    pub fn parse(mut bytes: &[u8]) -> Option<Self> {
        if bytes.len() < LOG_ENTRY_HEADER_LEN {
            return None;
        }
        Some(Self {
            entry_type: EntryType(bytes.get_u8()),
            transaction_id: bytes.get_u64(),
            payload_len: bytes.get_u16(),
        })
    }

    pub fn framed_len(&self) -> usize {
        framed_len(self.payload_len as usize)
    }

    /// Value the trailing back-link of this record must hold
    ///
    /// Widened so that any length read off disk can be checked, including
    /// ones too large for a back-link to ever match.
    pub fn expected_back_link(&self) -> u32 {
        u32::from(self.payload_len) + LOG_ENTRY_HEADER_LEN as u32
    }

    /// Whether the declared payload could have been written by the journal
    pub fn is_plausible(&self) -> bool {
        usize::from(self.payload_len) <= MAX_PAYLOAD_SIZE
    }
}

// =============================================================================
// Generic Record
// =============================================================================

/// A record with an opaque payload
///
/// Used both by producers that already have their payload as bytes and as
/// the decoded form handed out by the reader and recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub entry_type: EntryType,
    pub transaction_id: TxnId,
    pub payload: Bytes,
    pub lsn: Lsn,
}

impl LogRecord {
    pub fn new(entry_type: EntryType, transaction_id: TxnId, payload: impl Into<Bytes>) -> Self {
        Self {
            entry_type,
            transaction_id,
            payload: payload.into(),
            lsn: Lsn::INVALID,
        }
    }

    pub fn framed_len(&self) -> usize {
        framed_len(self.payload.len())
    }

    pub fn is_checkpoint(&self) -> bool {
        self.entry_type == EntryType::CHECKPOINT
    }
}

impl Loggable for LogRecord {
    fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    fn transaction_id(&self) -> TxnId {
        self.transaction_id
    }

    fn payload_size(&self) -> usize {
        self.payload.len()
    }

    fn write_payload(&self, dst: &mut BytesMut) {
        dst.put_slice(&self.payload);
    }

    fn set_lsn(&mut self, lsn: Lsn) {
        self.lsn = lsn;
    }
}

// =============================================================================
// Built-in Records
// =============================================================================

/// Records that carry nothing but their type and transaction id
macro_rules! marker_record {
    ($(#[$doc:meta])* $name:ident => $code:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub transaction_id: TxnId,
            pub lsn: Lsn,
        }

        impl $name {
            pub fn new(transaction_id: TxnId) -> Self {
                Self { transaction_id, lsn: Lsn::INVALID }
            }
        }

        impl Loggable for $name {
            fn entry_type(&self) -> EntryType {
                $code
            }

            fn transaction_id(&self) -> TxnId {
                self.transaction_id
            }

            fn payload_size(&self) -> usize {
                0
            }

            fn write_payload(&self, _dst: &mut BytesMut) {}

            fn set_lsn(&mut self, lsn: Lsn) {
                self.lsn = lsn;
            }
        }
    };
}

marker_record!(
    /// Marks a point before which every effect is durable; recovery starts here
    Checkpoint => EntryType::CHECKPOINT
);
marker_record!(
    /// First record of a transaction
    TxnStart => EntryType::TXN_START
);
marker_record!(
    /// Transaction committed
    TxnCommit => EntryType::TXN_COMMIT
);
marker_record!(
    /// Transaction rolled back
    TxnAbort => EntryType::TXN_ABORT
);
