//! Log file naming and discovery
//!
//! Log files are named after their number as ten lowercase hex digits plus
//! the `.log` suffix: file 255 lives in `00000000ff.log`. Recovery relies on
//! that name and the number agreeing, so the format never changes.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Suffix of live log files
pub const LOG_FILE_SUFFIX: &str = "log";

/// Appended to a stale file that is in the way of a new one, followed by
/// `.1`, `.2`, ... if that name is taken too
pub const BAK_FILE_SUFFIX: &str = ".bak";

/// File name for a log file number
pub fn file_for(number: u32) -> String {
    format!("{number:010x}.{LOG_FILE_SUFFIX}")
}

/// Parse the number out of a live log file name
///
/// Returns `None` for anything that is not `<hex>.log`, including `.bak`
/// files.
pub fn parse_file_number(name: &str) -> Option<u32> {
    let (base, suffix) = name.split_once('.')?;
    if suffix != LOG_FILE_SUFFIX || base.is_empty() {
        return None;
    }
    u32::from_str_radix(base, 16).ok()
}

/// Highest file number among `names`, or `None` if there are none
///
/// The base name is the part before the first `.`, read as hex. Names that
/// do not parse are skipped.
pub fn discover_newest<S: AsRef<str>>(names: &[S]) -> Option<u32> {
    names
        .iter()
        .filter_map(|name| {
            let (base, _) = name.as_ref().split_once('.')?;
            u32::from_str_radix(base, 16).ok()
        })
        .max()
}

/// All live log files in `dir`, ordered oldest first
pub fn list_log_files(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(number) = parse_file_number(name) {
            files.push((number, path));
        }
    }

    files.sort_by_key(|(number, _)| *number);
    Ok(files)
}

/// First unused backup name for a log file
///
/// `<name>.bak`, or `<name>.bak.1`, `<name>.bak.2`, ... when earlier backups
/// of the same file are still around. Existing backups are never reused.
pub(crate) fn backup_path(path: &Path) -> PathBuf {
    let mut base = path.as_os_str().to_owned();
    base.push(BAK_FILE_SUFFIX);

    let mut candidate = PathBuf::from(&base);
    let mut attempt = 0u32;
    while fs::symlink_metadata(&candidate).is_ok() {
        attempt += 1;
        let mut name = base.clone();
        name.push(format!(".{attempt}"));
        candidate = PathBuf::from(name);
    }
    candidate
}
