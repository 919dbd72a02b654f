//! Configuration for xjournal
//!
//! Centralized configuration with sensible defaults.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{JournalError, Result};
use crate::journal::LOG_ENTRY_BASE_LEN;

/// Default log size limit (10 MB)
pub const DEFAULT_SIZE_LIMIT_MB: u32 = 10;

/// Default append buffer capacity (256 KB)
pub const DEFAULT_BUFFER_CAPACITY: usize = 0x40000;

/// A checkpoint only switches files once the current one is at least this big (1 MB)
pub const DEFAULT_MIN_RECLAIM_SIZE: u64 = 1024 * 1024;

/// Main configuration for a journal instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    // -------------------------------------------------------------------------
    // Location
    // -------------------------------------------------------------------------
    /// Database home directory. Relative journal directories are resolved
    /// against it.
    pub home_dir: Option<PathBuf>,

    /// Directory holding the numbered log files:
    ///   {journal_dir}/
    ///     ├── 0000000001.log
    ///     ├── 0000000002.log      (current)
    ///     └── 0000000002.log.bak  (renamed-aside collision, ignored)
    pub journal_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Size Limits
    // -------------------------------------------------------------------------
    /// Size of the current file (in MB) at which the owning database is asked
    /// to schedule a checkpoint
    pub size_limit_mb: u32,

    /// Capacity of the in-memory append buffer (in bytes)
    pub buffer_capacity: usize,

    /// Minimum size of the current file (in bytes) before a checkpoint may
    /// replace it with a new one
    pub min_reclaim_size: u64,

    // -------------------------------------------------------------------------
    // Durability
    // -------------------------------------------------------------------------
    /// Request a physical sync whenever a commit flushes the journal
    pub sync_on_commit: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            home_dir: None,
            journal_dir: PathBuf::from("journal"),
            size_limit_mb: DEFAULT_SIZE_LIMIT_MB,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            min_reclaim_size: DEFAULT_MIN_RECLAIM_SIZE,
            sync_on_commit: true,
        }
    }
}

impl JournalConfig {
    /// Create a new config builder
    pub fn builder() -> JournalConfigBuilder {
        JournalConfigBuilder::default()
    }

    /// Size limit in bytes
    pub fn size_limit_bytes(&self) -> u64 {
        u64::from(self.size_limit_mb) * 1024 * 1024
    }

    /// Check the numeric limits
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity < LOG_ENTRY_BASE_LEN {
            return Err(JournalError::Config(format!(
                "buffer capacity {} cannot hold a single record",
                self.buffer_capacity
            )));
        }
        if self.size_limit_mb == 0 {
            return Err(JournalError::Config("size limit must be at least 1 MB".into()));
        }
        // Offsets are 32 bits wide. Leave room for the file to overshoot the
        // limit by one buffer before the checkpoint lands.
        let worst_case = self.size_limit_bytes() + self.buffer_capacity as u64;
        if worst_case >= u64::from(u32::MAX) {
            return Err(JournalError::Config(format!(
                "size limit of {} MB exceeds the addressable file offset range",
                self.size_limit_mb
            )));
        }
        Ok(())
    }

    /// Resolve the journal directory, creating it if missing
    ///
    /// Relative paths are joined onto `home_dir` when one is set.
    pub fn resolve_dir(&self) -> Result<PathBuf> {
        let dir = match &self.home_dir {
            Some(home) if self.journal_dir.is_relative() => home.join(&self.journal_dir),
            _ => self.journal_dir.clone(),
        };

        if !dir.exists() {
            debug!(dir = %dir.display(), "journal directory does not exist, creating it");
            fs::create_dir_all(&dir).map_err(|e| {
                JournalError::Config(format!(
                    "failed to create journal directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        check_writable(&dir)?;
        Ok(dir)
    }
}

/// Builder for JournalConfig
#[derive(Default)]
pub struct JournalConfigBuilder {
    config: JournalConfig,
}

impl JournalConfigBuilder {
    /// Set the database home directory
    pub fn home_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.home_dir = Some(path.into());
        self
    }

    /// Set the journal directory
    pub fn journal_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.journal_dir = path.into();
        self
    }

    /// Set the size limit (in MB)
    pub fn size_limit_mb(mut self, mb: u32) -> Self {
        self.config.size_limit_mb = mb;
        self
    }

    /// Set the append buffer capacity (in bytes)
    pub fn buffer_capacity(mut self, bytes: usize) -> Self {
        self.config.buffer_capacity = bytes;
        self
    }

    /// Set the minimum file size before a checkpoint may rotate (in bytes)
    pub fn min_reclaim_size(mut self, bytes: u64) -> Self {
        self.config.min_reclaim_size = bytes;
        self
    }

    /// Set whether commits request a physical sync
    pub fn sync_on_commit(mut self, sync: bool) -> Self {
        self.config.sync_on_commit = sync;
        self
    }

    pub fn build(self) -> JournalConfig {
        self.config
    }
}

/// Name of the scratch file used to check that the directory takes writes
const WRITE_CHECK_FILE: &str = ".xjournal-write-check";

fn check_writable(dir: &Path) -> Result<()> {
    let meta = fs::metadata(dir)?;
    if !meta.is_dir() {
        return Err(JournalError::Config(format!(
            "journal path {} is not a directory",
            dir.display()
        )));
    }

    // Only a real write shows whether the directory takes writes.
    let scratch = dir.join(WRITE_CHECK_FILE);
    let written = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&scratch)
        .and_then(|mut file| file.write_all(b"x"));
    if let Err(e) = written {
        return Err(JournalError::Config(format!(
            "cannot write to journal directory {}: {}",
            dir.display(),
            e
        )));
    }
    if let Err(e) = fs::remove_file(&scratch) {
        warn!(path = %scratch.display(), error = %e, "could not remove write check file");
    }
    Ok(())
}
