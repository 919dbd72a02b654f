//! # xjournal
//!
//! The write-ahead journal of a native XML database:
//! - Log Sequence Numbers that stay ordered across file rotation
//! - Buffered appends with a background, group-commit fsync
//! - Numbered log files, switched and reclaimed at checkpoints
//! - Crash recovery with torn-tail handling
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Transactions / Storage Layer                    │
//! │          (append records, request checkpoints)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Journal                                  │
//! │      append lock: buffer + LSN  │  file lock: current file   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Log Files  │ ◄─fsync─ │ Sync Worker │
//!   │ (numbered)  │          │  (thread)   │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │  Recovery   │
//!   │  Scanner    │
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod journal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{JournalConfig, JournalConfigBuilder};
pub use error::{JournalError, Result};
pub use journal::{
    EntryType, EntryTypeRegistry, Journal, JournalListener, LogRecord, Loggable, Lsn,
    RecoveryReport,
};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of xjournal
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
