//! Journal Module
//!
//! Provides durability guarantees through write-ahead logging.
//!
//! ## Responsibilities
//! - Frame records and assign Log Sequence Numbers (LSN)
//! - Buffer appends and write them to numbered log files
//! - Sync in the background so commits can share one fsync
//! - Switch files and reclaim old ones at checkpoints
//! - Recover by scanning back to the last checkpoint and redoing forwards
//!
//! ## Directory Layout
//! ```text
//! {journal_dir}/
//!   ├── 0000000007.log      (history, immutable)
//!   ├── 0000000008.log      (current, append only)
//!   └── 0000000008.log.bak  (stale file moved aside, ignored)
//! ```
//!
//! ## Record Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Record 1                                                │
//! │ ┌──────────┬───────────┬─────────┬─────────┬──────────┐ │
//! │ │ Type (1) │ TxnId (8) │ Len (2) │ Payload │ Back (2) │ │
//! │ └──────────┴───────────┴─────────┴─────────┴──────────┘ │
//! ├─────────────────────────────────────────────────────────┤
//! │ Record 2                                                │
//! │ ...                                                     │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod checkpoint;
mod entry;
mod entry_types;
mod files;
mod lsn;
mod reader;
mod recovery;
mod sync;
mod writer;

pub use checkpoint::CheckpointOutcome;
pub use entry::{
    framed_len, Checkpoint, EntryHeader, LogRecord, Loggable, TxnAbort, TxnCommit, TxnId,
    TxnStart, LOG_ENTRY_BASE_LEN, LOG_ENTRY_HEADER_LEN, MAX_PAYLOAD_SIZE,
};
pub use entry_types::{EntryType, EntryTypeRegistry};
pub use files::{
    discover_newest, file_for, list_log_files, parse_file_number, BAK_FILE_SUFFIX,
    LOG_FILE_SUFFIX,
};
pub use lsn::Lsn;
pub use reader::{BackwardIter, LogFileReader, RecordIter};
pub use recovery::{RecoveryReport, RecoveryScanner, RecoveryState};
pub use sync::SyncWorker;
pub use writer::{Journal, JournalListener};
