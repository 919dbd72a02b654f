//! Checkpoints and log file retention
//!
//! A checkpoint record marks the point recovery starts from. Once it is on
//! disk, nothing before it is needed any more, so a large enough current file
//! can be replaced by a new one and the old files deleted.
//!
//! The whole sequence runs under the append lock. No other record can land in
//! the superseded file between the checkpoint and its deletion.

use std::fs;

use tracing::{debug, info, warn};

use crate::error::Result;

use super::entry::{Checkpoint, TxnId};
use super::lsn::Lsn;
use super::writer::Journal;

/// What a checkpoint did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointOutcome {
    /// LSN of the checkpoint record
    pub lsn: Lsn,

    /// New current file, if the checkpoint switched files
    pub rotated_to: Option<u32>,

    /// Log files deleted after the switch
    pub removed: Vec<u32>,
}

impl Journal {
    /// Write a checkpoint record and force it to disk
    ///
    /// If `switch_files` is set and the current file is larger than the
    /// configured minimum, a new file is started and every file up to the
    /// superseded one is deleted. A failed switch leaves all files in place
    /// and is returned as an error.
    pub fn checkpoint(&self, transaction_id: TxnId, switch_files: bool) -> Result<CheckpointOutcome> {
        let mut state = self.state.lock();

        let mut record = Checkpoint::new(transaction_id);
        let (lsn, _) = self.append_locked(&mut state, &mut record)?;

        // Checkpoints go to disk regardless of the sync-on-commit setting, and
        // nothing may be deleted before they have.
        self.write_buffer(&mut state)?;
        if let Some(generation) = self.request_sync_locked(&mut state, true, true)? {
            self.sync.wait_for(generation)?;
        }
        debug!(txn = transaction_id, %lsn, "checkpoint written");

        let mut outcome = CheckpointOutcome {
            lsn,
            rotated_to: None,
            removed: Vec::new(),
        };

        let size = self.file_size();
        if !switch_files || size <= self.config.min_reclaim_size {
            drop(state);
            self.check_oversize(size);
            return Ok(outcome);
        }

        let superseded = self.current_file();
        self.rotate_locked(&mut state)?;
        drop(state);

        outcome.rotated_to = Some(self.current_file());
        outcome.removed = self.reclaim_through(superseded)?;
        info!(
            txn = transaction_id,
            %lsn,
            superseded,
            removed = outcome.removed.len(),
            "checkpoint switched journal files"
        );
        Ok(outcome)
    }

    /// Delete every live log file numbered `superseded` or lower
    ///
    /// Only valid once a checkpoint in a later position is durable. Files that
    /// cannot be deleted are left behind with a warning; keeping a file is
    /// always safe.
    fn reclaim_through(&self, superseded: u32) -> Result<Vec<u32>> {
        let mut removed = Vec::new();
        for (number, path) in self.log_files()? {
            if number > superseded {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(file = number, "removed obsolete journal file");
                    removed.push(number);
                }
                Err(e) => {
                    warn!(file = number, error = %e, "failed to remove obsolete journal file");
                }
            }
        }
        Ok(removed)
    }
}
