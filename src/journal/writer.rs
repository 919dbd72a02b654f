//! Journal writer
//!
//! Owns the append buffer and the current log file. Records are framed into
//! the buffer under one lock, which also assigns their LSNs, and the buffer is
//! written out to the file under a second lock shared with rotation.
//!
//! ## Responsibilities
//! - Assign strictly increasing LSNs in append order
//! - Buffer records and write them out when the buffer fills or on flush
//! - Request background syncs according to the sync-on-commit policy
//! - Tell the owning database when the current file outgrows its limit
//! - Switch to a new numbered file without splitting a record across files

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::JournalConfig;
use crate::error::{JournalError, Result};

use super::entry::{frame_into, framed_len, Loggable};
use super::entry_types::EntryTypeRegistry;
use super::files::{backup_path, discover_newest, file_for, list_log_files};
use super::lsn::Lsn;
use super::sync::SyncWorker;

/// Callback into the database that owns the journal
pub trait JournalListener: Send + Sync {
    /// The current file reached the configured size limit
    ///
    /// Called with no journal lock held. Implementations should only schedule
    /// a checkpoint, not run one inline.
    fn on_log_oversize(&self, file_size: u64);
}

/// Buffer and LSN bookkeeping, guarded by the append lock
pub(crate) struct WriterState {
    pub(crate) buffer: BytesMut,
    pub(crate) current_lsn: Lsn,
    pub(crate) last_synced_lsn: Lsn,
}

/// The file currently open for append, guarded by the file lock
struct ActiveFile {
    number: u32,
    path: PathBuf,
    file: Arc<File>,
    /// Bytes written to the file so far
    written: u64,
}

/// The write-ahead journal of one database
///
/// ## Locking
///
/// - `state` (append lock): buffer contents and LSN assignment
/// - `active` (file lock): the open file and its size
///
/// Whenever both are needed, `state` is taken first. Rotation holds both, so
/// it can never interleave with a buffer write.
pub struct Journal {
    pub(crate) config: JournalConfig,

    /// Resolved journal directory
    dir: PathBuf,

    pub(crate) registry: Arc<EntryTypeRegistry>,

    listener: Option<Arc<dyn JournalListener>>,

    pub(crate) state: Mutex<WriterState>,

    active: Mutex<ActiveFile>,

    pub(crate) sync: SyncWorker,

    pub(crate) in_recovery: AtomicBool,
}

impl Journal {
    /// Open the journal with the built-in entry types and no listener
    pub fn open(config: JournalConfig) -> Result<Self> {
        Self::open_with(config, Arc::new(EntryTypeRegistry::with_builtins()), None)
    }

    /// Open the journal
    ///
    /// On startup:
    /// 1. Resolve (and create) the journal directory
    /// 2. Find the newest existing log file
    /// 3. Start a fresh file numbered one past it, so a file a crash may have
    ///    left torn is never appended to
    /// 4. Start the sync worker on the fresh file
    pub fn open_with(
        config: JournalConfig,
        registry: Arc<EntryTypeRegistry>,
        listener: Option<Arc<dyn JournalListener>>,
    ) -> Result<Self> {
        config.validate()?;
        let dir = config.resolve_dir()?;
        debug!(dir = %dir.display(), "using journal directory");

        let names: Vec<String> = list_log_files(&dir)?
            .iter()
            .filter_map(|(_, path)| path.file_name()?.to_str().map(str::to_owned))
            .collect();
        let number = match discover_newest(&names) {
            Some(u32::MAX) => {
                return Err(JournalError::Config(
                    "journal file numbers are exhausted".into(),
                ))
            }
            Some(newest) => newest + 1,
            None => 0,
        };

        let path = dir.join(file_for(number));
        let file = Arc::new(create_log_file(&path)?);
        let sync = SyncWorker::start(Arc::clone(&file))?;

        info!(
            dir = %dir.display(),
            file = number,
            existing = names.len(),
            sync_on_commit = config.sync_on_commit,
            "journal opened"
        );

        Ok(Self {
            state: Mutex::new(WriterState {
                buffer: BytesMut::with_capacity(config.buffer_capacity),
                current_lsn: Lsn::INVALID,
                last_synced_lsn: Lsn::INVALID,
            }),
            active: Mutex::new(ActiveFile {
                number,
                path,
                file,
                written: 0,
            }),
            config,
            dir,
            registry,
            listener,
            sync,
            in_recovery: AtomicBool::new(false),
        })
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Append a record to the journal and return its LSN
    ///
    /// The record is only buffered; call [`Journal::flush`] to write it out.
    ///
    /// # Panics
    ///
    /// If the journal is in recovery, if the record's type is not registered,
    /// or if the record writes a different number of bytes than it declares.
    pub fn append(&self, record: &mut dyn Loggable) -> Result<Lsn> {
        let (lsn, flushed_size) = {
            let mut state = self.state.lock();
            self.append_locked(&mut state, record)?
        };

        // A full buffer was written out on the way; that counts as a flush.
        if let Some(file_size) = flushed_size {
            self.check_oversize(file_size);
        }
        Ok(lsn)
    }

    /// Append under the append lock
    ///
    /// Also returns the file size if the buffer had to be written out first.
    pub(crate) fn append_locked(
        &self,
        state: &mut WriterState,
        record: &mut dyn Loggable,
    ) -> Result<(Lsn, Option<u64>)> {
        assert!(
            !self.in_recovery.load(Ordering::Acquire),
            "write to journal during recovery"
        );
        let entry_type = record.entry_type();
        assert!(
            self.registry.contains(entry_type),
            "entry type {entry_type} is not registered"
        );

        let required = framed_len(record.payload_size());
        let mut flushed_size = None;
        if required > self.config.buffer_capacity.saturating_sub(state.buffer.len()) {
            self.write_buffer(state)?;
            flushed_size = Some(self.active.lock().written);
        }

        let (file_number, written) = {
            let active = self.active.lock();
            (active.number, active.written)
        };
        // The header will land right after everything already written or
        // buffered; offsets are stored one-based.
        let position = written + state.buffer.len() as u64 + 1;
        let offset = u32::try_from(position).unwrap_or_else(|_| {
            panic!("journal file {file_number:#x} outgrew 32-bit offsets at {position}")
        });
        let lsn = Lsn::encode(file_number, offset);

        frame_into(&mut state.buffer, record);
        record.set_lsn(lsn);
        state.current_lsn = lsn;
        Ok((lsn, flushed_size))
    }

    /// Write buffered records to the current file
    ///
    /// Requests a background sync if `override_policy` is set, or if
    /// `force_sync` is set, sync-on-commit is enabled and something was
    /// appended since the last sync request. Does not wait for the sync.
    /// No-op during recovery.
    pub fn flush(&self, force_sync: bool, override_policy: bool) -> Result<()> {
        self.flush_inner(force_sync, override_policy).map(|_| ())
    }

    /// Flush, force a sync and wait until it has reached the disk
    pub fn flush_and_wait(&self) -> Result<()> {
        match self.flush_inner(true, true)? {
            Some(generation) => self.sync.wait_for(generation),
            None => Ok(()),
        }
    }

    fn flush_inner(&self, force_sync: bool, override_policy: bool) -> Result<Option<u64>> {
        if self.is_in_recovery() {
            return Ok(None);
        }

        let (generation, file_size) = {
            let mut state = self.state.lock();
            self.write_buffer(&mut state)?;
            let generation = self.request_sync_locked(&mut state, force_sync, override_policy)?;
            (generation, self.active.lock().written)
        };

        self.check_oversize(file_size);
        Ok(generation)
    }

    /// Write the buffer out to the current file and clear it
    ///
    /// On failure, partially written bytes are cut off again and the buffer
    /// is kept, so nothing is silently dropped.
    pub(crate) fn write_buffer(&self, state: &mut WriterState) -> Result<()> {
        if state.buffer.is_empty() {
            return Ok(());
        }

        let mut active = self.active.lock();
        if let Err(source) = (&*active.file).write_all(&state.buffer) {
            warn!(file = active.number, error = %source, "flushing journal buffer failed");
            if let Err(e) = active.file.set_len(active.written) {
                warn!(file = active.number, error = %e, "could not cut off partial journal write");
            }
            return Err(JournalError::Durability {
                file_number: active.number,
                source,
            });
        }

        active.written += state.buffer.len() as u64;
        state.buffer.clear();
        Ok(())
    }

    /// Apply the sync policy; returns the sync request number if one was made
    pub(crate) fn request_sync_locked(
        &self,
        state: &mut WriterState,
        force_sync: bool,
        override_policy: bool,
    ) -> Result<Option<u64>> {
        if let Some(e) = self.sync.take_failure() {
            return Err(JournalError::Sync(e));
        }

        let wanted = override_policy
            || (force_sync
                && self.config.sync_on_commit
                && state.current_lsn.is_newer_than(state.last_synced_lsn));
        if !wanted {
            return Ok(None);
        }

        let generation = self.sync.request();
        state.last_synced_lsn = state.current_lsn;
        Ok(Some(generation))
    }

    pub(crate) fn check_oversize(&self, file_size: u64) {
        if file_size < self.config.size_limit_bytes() {
            return;
        }
        debug!(file_size, limit = self.config.size_limit_bytes(), "journal over size limit");
        if let Some(listener) = &self.listener {
            listener.on_log_oversize(file_size);
        }
    }

    // =========================================================================
    // Rotation
    // =========================================================================

    /// Start a new log file numbered one past the current one
    ///
    /// Buffered records are written to the old file first since their LSNs
    /// point into it. If the new file cannot be created the old one stays
    /// current.
    pub fn rotate(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.rotate_locked(&mut state)
    }

    pub(crate) fn rotate_locked(&self, state: &mut WriterState) -> Result<()> {
        self.write_buffer(state)?;

        let mut active = self.active.lock();
        let Some(next) = active.number.checked_add(1) else {
            panic!("journal file number {:#x} cannot be incremented", active.number);
        };

        // The sync worker moves to the new file, so nothing may be left
        // unsynced in the old one.
        active.file.sync_all().map_err(JournalError::Sync)?;

        let path = self.dir.join(file_for(next));
        let file = Arc::new(create_log_file(&path)?);

        let previous = std::mem::replace(
            &mut *active,
            ActiveFile {
                number: next,
                path,
                file: Arc::clone(&file),
                written: 0,
            },
        );
        self.sync.set_file(file);

        info!(
            from = previous.number,
            to = next,
            closed_size = previous.written,
            "switched journal file"
        );
        Ok(())
    }

    // =========================================================================
    // Recovery Mode
    // =========================================================================

    /// Mark the journal as replaying. Appends panic and flushes do nothing
    /// until it is cleared.
    pub fn set_in_recovery(&self, value: bool) {
        self.in_recovery.store(value, Ordering::Release);
    }

    pub fn is_in_recovery(&self) -> bool {
        self.in_recovery.load(Ordering::Acquire)
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Flush everything, wait for the final sync and stop the sync worker
    pub fn close(mut self) -> Result<()> {
        let result = self.flush_and_wait();
        self.sync.shutdown();
        info!(file = self.current_file(), "journal closed");
        result
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the journal directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the configuration
    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    /// Get the entry type registry
    pub fn registry(&self) -> &EntryTypeRegistry {
        &self.registry
    }

    /// Number of the file open for append
    pub fn current_file(&self) -> u32 {
        self.active.lock().number
    }

    /// Path of the file open for append
    pub fn current_path(&self) -> PathBuf {
        self.active.lock().path.clone()
    }

    /// Bytes written to the current file (excluding the buffer)
    pub fn file_size(&self) -> u64 {
        self.active.lock().written
    }

    /// Bytes waiting in the append buffer
    pub fn buffered_len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// LSN of the last appended record
    pub fn current_lsn(&self) -> Lsn {
        self.state.lock().current_lsn
    }

    /// LSN covered by the last sync request
    pub fn last_synced_lsn(&self) -> Lsn {
        self.state.lock().last_synced_lsn
    }

    /// Path of log file `number`
    pub fn file_path(&self, number: u32) -> PathBuf {
        self.dir.join(file_for(number))
    }

    /// All live log files, oldest first
    pub fn log_files(&self) -> Result<Vec<(u32, PathBuf)>> {
        list_log_files(&self.dir)
    }
}

/// Create a fresh log file at `path`
///
/// A file already at that path (left by an unclean shutdown) is renamed to
/// `<name>.bak` instead of being overwritten.
fn create_log_file(path: &Path) -> Result<File> {
    if path.exists() {
        let backup = backup_path(path);
        debug!(
            path = %path.display(),
            backup = %backup.display(),
            "journal file already exists, moving it aside"
        );
        fs::rename(path, &backup).map_err(|source| JournalError::Rotation {
            path: path.to_path_buf(),
            source,
        })?;
    }

    debug!(path = %path.display(), "creating journal file");
    OpenOptions::new()
        .create_new(true)
        .append(true)
        .open(path)
        .map_err(|source| JournalError::Rotation {
            path: path.to_path_buf(),
            source,
        })
}
