//! Background sync worker
//!
//! Moves the physical fsync of the current log file off the write path.
//! `flush` only requests a sync; the worker performs it later. Requests that
//! arrive while the worker is busy or asleep collapse into a single wake-up,
//! so transactions committing close together share one fsync (group commit).
//!
//! ```text
//!  flush ──request()──► [wake: bounded(1)] ──► worker: sync_all(current file)
//!                                                  │
//!  wait_for(gen) ◄──────── completed gen ◄─────────┘
//! ```
//!
//! Each request is numbered. Callers that need the sync to have happened
//! before acknowledging a commit wait for their number to complete.

use std::fs::File;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{JournalError, Result};

/// Progress counters shared with the worker thread
#[derive(Debug, Default)]
struct SyncProgress {
    /// Last request number handed out
    requested: u64,
    /// Every request up to this number has been synced
    completed: u64,
    /// First sync failure not yet reported to a caller
    failure: Option<io::Error>,
}

struct SyncShared {
    /// File the worker syncs; swapped on rotation
    file: Mutex<Arc<File>>,
    progress: Mutex<SyncProgress>,
    synced: Condvar,
}

impl SyncShared {
    /// Sync the current file and publish the outcome for requests up to `target`
    fn sync_up_to(&self, target: u64) {
        let file = Arc::clone(&*self.file.lock());
        let result = file.sync_all();

        let mut progress = self.progress.lock();
        if let Err(e) = result {
            warn!(error = %e, "journal sync failed");
            if progress.failure.is_none() {
                progress.failure = Some(e);
            }
        }
        progress.completed = progress.completed.max(target);
        self.synced.notify_all();
    }
}

/// Handle to the background sync thread
pub struct SyncWorker {
    shared: Arc<SyncShared>,
    wake: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SyncWorker {
    /// Spawn the worker for `file`
    pub fn start(file: Arc<File>) -> Result<Self> {
        let shared = Arc::new(SyncShared {
            file: Mutex::new(file),
            progress: Mutex::new(SyncProgress::default()),
            synced: Condvar::new(),
        });
        let (wake_tx, wake_rx) = bounded(1);

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("journal-sync".into())
            .spawn(move || Self::run(worker_shared, wake_rx))?;

        Ok(Self {
            shared,
            wake: Some(wake_tx),
            handle: Some(handle),
        })
    }

    fn run(shared: Arc<SyncShared>, wake: Receiver<()>) {
        debug!("journal sync worker started");
        // recv() keeps returning queued wake-ups after the sender is dropped,
        // so a request made right before shutdown is still served.
        while wake.recv().is_ok() {
            let target = shared.progress.lock().requested;
            shared.sync_up_to(target);
        }
        debug!("journal sync worker stopped");
    }

    /// Ask for a sync of the current file without waiting for it
    ///
    /// Returns the request number to pass to [`SyncWorker::wait_for`].
    pub fn request(&self) -> u64 {
        let generation = {
            let mut progress = self.shared.progress.lock();
            progress.requested += 1;
            progress.requested
        };

        match self.wake.as_ref().map(|tx| tx.try_send(())) {
            // Full: a wake-up is already queued and will cover this request.
            Some(Ok(())) | Some(Err(TrySendError::Full(()))) => {}
            Some(Err(TrySendError::Disconnected(()))) | None => {
                self.shared.sync_up_to(generation);
            }
        }
        generation
    }

    /// Block until request `generation` has been synced
    ///
    /// Returns the pending sync failure, if any.
    pub fn wait_for(&self, generation: u64) -> Result<()> {
        let mut progress = self.shared.progress.lock();
        while progress.completed < generation {
            self.shared.synced.wait(&mut progress);
        }
        match progress.failure.take() {
            Some(e) => Err(JournalError::Sync(e)),
            None => Ok(()),
        }
    }

    /// Take a sync failure that no caller has seen yet
    pub fn take_failure(&self) -> Option<io::Error> {
        self.shared.progress.lock().failure.take()
    }

    /// Point the worker at a new current file
    pub fn set_file(&self, file: Arc<File>) {
        *self.shared.file.lock() = file;
    }

    /// Number of the most recent request known to be synced
    pub fn completed(&self) -> u64 {
        self.shared.progress.lock().completed
    }

    /// Record a sync failure as if the worker had hit it
    #[cfg(test)]
    pub(crate) fn inject_failure(&self, error: io::Error) {
        self.shared.progress.lock().failure = Some(error);
    }

    /// Stop the worker once every queued request has been served
    pub fn shutdown(&mut self) {
        drop(self.wake.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("journal sync worker panicked");
            }
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
