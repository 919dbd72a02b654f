//! Journal recovery
//!
//! Replays the journal after a crash.
//!
//! ## Protocol
//! 1. Open the newest log file and walk backwards from the end of its valid
//!    records, one back-link at a time, looking for a checkpoint
//! 2. Continue into older files until a checkpoint turns up or the oldest
//!    retained file is exhausted
//! 3. Redo forwards from just after the checkpoint (or from the first record
//!    of the oldest file) through the end of the newest file
//!
//! ```text
//!   0000000003.log          0000000004.log
//! ┌────┬────┬────┬────┐   ┌────┬────┬──────┐
//! │ r1 │ CP │ r2 │ r3 │   │ r4 │ r5 │ torn │
//! └────┴────┴────┴────┘   └────┴────┴──────┘
//!        ◄──────────────── backward scan ◄──┘
//!        └─► redo: r2 r3 r4 r5
//! ```
//!
//! Torn bytes at the end of a file are where a crash interrupted a write.
//! They end that file's valid data and are never reported as an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Result;

use super::entry::LogRecord;
use super::entry_types::EntryTypeRegistry;
use super::files::list_log_files;
use super::lsn::Lsn;
use super::reader::LogFileReader;
use super::writer::Journal;

/// Where a recovery pass currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    /// Not started
    Idle,

    /// Walking backwards through `file`, next record ends at `offset`
    Scanning { file: u32, offset: usize },

    /// The redo boundary was found
    FoundCheckpoint(Lsn),

    /// Replaying `file` from `offset`
    Redoing { file: u32, offset: usize },

    Done,
}

/// Result of a recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Log files opened during the pass
    pub files_scanned: usize,

    /// Records handed to the redo callback
    pub records_replayed: u64,

    /// The checkpoint redo started after, if one was found
    pub checkpoint: Option<Lsn>,

    /// Bytes discarded as torn tails, across all files
    pub torn_bytes: u64,

    /// LSN of the last replayed record
    pub last_lsn: Option<Lsn>,
}

/// Backward-scan / forward-redo over a journal directory
pub struct RecoveryScanner {
    dir: PathBuf,
    registry: Arc<EntryTypeRegistry>,
    /// Only files numbered below this are considered
    below: Option<u32>,
    state: RecoveryState,
}

impl RecoveryScanner {
    pub fn new(dir: impl Into<PathBuf>, registry: Arc<EntryTypeRegistry>) -> Self {
        Self {
            dir: dir.into(),
            registry,
            below: None,
            state: RecoveryState::Idle,
        }
    }

    /// Ignore files numbered `file` and higher
    pub fn below(mut self, file: u32) -> Self {
        self.below = Some(file);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// Find the redo boundary and feed every record after it to `redo`
    ///
    /// Records are delivered in their original order. An error from `redo`
    /// stops the pass and is returned.
    pub fn run<F>(&mut self, mut redo: F) -> Result<RecoveryReport>
    where
        F: FnMut(&LogRecord) -> Result<()>,
    {
        let files: Vec<(u32, PathBuf)> = list_log_files(&self.dir)?
            .into_iter()
            .filter(|(number, _)| self.below.map_or(true, |below| *number < below))
            .collect();

        let mut report = RecoveryReport::default();
        if files.is_empty() {
            debug!(dir = %self.dir.display(), "no journal files to recover");
            self.state = RecoveryState::Done;
            return Ok(report);
        }

        // Backward scan. Readers are kept, newest first, for the redo phase.
        let mut loaded: Vec<LogFileReader> = Vec::new();
        let mut boundary: Option<(u32, usize, Lsn)> = None;

        'files: for (number, path) in files.iter().rev() {
            let reader = LogFileReader::open(path, *number, &self.registry)?;
            report.files_scanned += 1;
            if reader.torn_bytes() > 0 {
                warn!(
                    file = number,
                    valid = reader.valid_len(),
                    torn = reader.torn_bytes(),
                    "ignoring torn tail of journal file"
                );
                report.torn_bytes += reader.torn_bytes() as u64;
            }

            let mut end = reader.valid_len();
            self.state = RecoveryState::Scanning { file: *number, offset: end };
            while let Some(start) = reader.previous_offset(end) {
                if let Some(record) = reader.record_at(start).filter(LogRecord::is_checkpoint) {
                    boundary = Some((*number, start + record.framed_len(), record.lsn));
                    loaded.push(reader);
                    break 'files;
                }
                end = start;
                self.state = RecoveryState::Scanning { file: *number, offset: end };
            }
            loaded.push(reader);
        }
        loaded.reverse();

        let (first_file, first_offset) = match boundary {
            Some((file, offset, lsn)) => {
                debug!(%lsn, "found checkpoint");
                self.state = RecoveryState::FoundCheckpoint(lsn);
                report.checkpoint = Some(lsn);
                (file, offset)
            }
            None => {
                debug!("no checkpoint found, replaying from the oldest journal file");
                (loaded[0].number(), 0)
            }
        };

        // Forward redo from the boundary through the newest file.
        for reader in &loaded {
            let start = if reader.number() == first_file { first_offset } else { 0 };
            let mut offset = start;
            self.state = RecoveryState::Redoing {
                file: reader.number(),
                offset,
            };
            for record in reader.iter_from(start) {
                redo(&record)?;
                offset += record.framed_len();
                report.records_replayed += 1;
                report.last_lsn = Some(record.lsn);
                self.state = RecoveryState::Redoing {
                    file: reader.number(),
                    offset,
                };
            }
        }

        self.state = RecoveryState::Done;
        info!(
            files = report.files_scanned,
            replayed = report.records_replayed,
            checkpoint = ?report.checkpoint,
            torn_bytes = report.torn_bytes,
            "journal recovery finished"
        );
        Ok(report)
    }
}

/// Clears the recovery flag when dropped, including on error or panic
struct RecoveryGuard<'a> {
    journal: &'a Journal,
}

impl Drop for RecoveryGuard<'_> {
    fn drop(&mut self) {
        self.journal.set_in_recovery(false);
    }
}

impl Journal {
    /// Replay the files left by earlier runs
    ///
    /// The journal is in recovery mode for the duration: appending panics and
    /// flushes do nothing. Call this after opening and before any append.
    pub fn recover<F>(&self, redo: F) -> Result<RecoveryReport>
    where
        F: FnMut(&LogRecord) -> Result<()>,
    {
        self.set_in_recovery(true);
        let _guard = RecoveryGuard { journal: self };

        RecoveryScanner::new(self.dir(), Arc::clone(&self.registry))
            .below(self.current_file())
            .run(redo)
    }
}
