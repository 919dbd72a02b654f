//! Error types for xjournal
//!
//! Provides a unified error type for all journal operations.
//!
//! Contract violations by callers (appending during recovery, a loggable whose
//! declared payload size disagrees with what it wrote) are not represented
//! here. They panic, because they mean the producer of the record is broken.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using JournalError
pub type Result<T> = std::result::Result<T, JournalError>;

/// Unified error type for journal operations
#[derive(Debug, Error)]
pub enum JournalError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // -------------------------------------------------------------------------
    // Write Path Errors
    // -------------------------------------------------------------------------
    /// Buffered records could not be written to the current log file.
    #[error("failed to write to journal file {file_number:#x}: {source}")]
    Durability {
        file_number: u32,
        #[source]
        source: io::Error,
    },

    /// A background fsync failed. Reported on the next explicit flush.
    #[error("journal sync failed: {0}")]
    Sync(#[source] io::Error),

    // -------------------------------------------------------------------------
    // Rotation Errors
    // -------------------------------------------------------------------------
    /// A new log file could not be created. The previous file stays current.
    #[error("failed to open new journal file {}: {source}", path.display())]
    Rotation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("entry type {code} is already registered as '{existing}'")]
    DuplicateEntryType { code: u8, existing: String },

    #[error("journal corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl JournalError {
    /// True for failures that indicate the journal can no longer guarantee
    /// durability of already-acknowledged records.
    pub fn is_durability_failure(&self) -> bool {
        matches!(self, JournalError::Durability { .. } | JournalError::Sync(_))
    }
}
