//! Tests for crash recovery
//!
//! These tests verify:
//! - Redo starts right after the newest checkpoint
//! - Without a checkpoint, redo starts at the oldest file
//! - Torn or garbage tails are skipped, never reported as errors
//! - Records come back with their LSN, transaction and payload intact
//! - The journal refuses writes while recovering

use std::cell::Cell;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Arc;

use tempfile::TempDir;
use xjournal::journal::{file_for, RecoveryScanner, RecoveryState, BAK_FILE_SUFFIX};
use xjournal::{
    EntryType, EntryTypeRegistry, Journal, JournalConfig, JournalError, LogRecord, Lsn,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn open_journal(temp: &TempDir) -> Journal {
    let config = JournalConfig::builder()
        .journal_dir(temp.path())
        .build();
    Journal::open(config).unwrap()
}

fn commit(txn: u64, payload: &[u8]) -> LogRecord {
    LogRecord::new(EntryType::TXN_COMMIT, txn, payload.to_vec())
}

/// Simulate a crash: everything flushed so far stays on disk, the rest is lost
fn crash(journal: Journal) {
    drop(journal);
}

fn replay(journal: &Journal) -> (Vec<LogRecord>, xjournal::RecoveryReport) {
    let mut seen = Vec::new();
    let report = journal
        .recover(|record| {
            seen.push(record.clone());
            Ok(())
        })
        .unwrap();
    (seen, report)
}

fn append_bytes(path: &std::path::Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
}

// =============================================================================
// Boundary Tests
// =============================================================================

#[test]
fn test_empty_directory() {
    let temp = TempDir::new().unwrap();
    let journal = open_journal(&temp);

    let (records, report) = replay(&journal);
    assert!(records.is_empty());
    assert_eq!(report.files_scanned, 0);
    assert_eq!(report.checkpoint, None);
}

#[test]
fn test_no_checkpoint_replays_everything() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    for txn in 0..5 {
        first.append(&mut commit(txn, b"data")).unwrap();
    }
    first.flush_and_wait().unwrap();
    crash(first);

    let second = open_journal(&temp);
    let (records, report) = replay(&second);

    assert_eq!(records.len(), 5);
    assert_eq!(report.records_replayed, 5);
    assert_eq!(report.checkpoint, None);
    let txns: Vec<u64> = records.iter().map(|r| r.transaction_id).collect();
    assert_eq!(txns, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_redo_starts_after_checkpoint() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    first.append(&mut commit(1, b"before")).unwrap();
    first.append(&mut commit(2, b"before")).unwrap();
    let checkpoint = first.checkpoint(2, false).unwrap().lsn;
    first.append(&mut commit(3, b"after")).unwrap();
    first.append(&mut commit(4, b"after")).unwrap();
    first.flush_and_wait().unwrap();
    crash(first);

    let second = open_journal(&temp);
    let (records, report) = replay(&second);

    assert_eq!(report.checkpoint, Some(checkpoint));
    let txns: Vec<u64> = records.iter().map(|r| r.transaction_id).collect();
    assert_eq!(txns, vec![3, 4]);
    assert!(records.iter().all(|r| &r.payload[..] == b"after"));
}

#[test]
fn test_newest_checkpoint_wins() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    first.checkpoint(1, false).unwrap();
    first.append(&mut commit(2, b"x")).unwrap();
    let newest = first.checkpoint(3, false).unwrap().lsn;
    first.append(&mut commit(4, b"x")).unwrap();
    first.flush_and_wait().unwrap();
    crash(first);

    let second = open_journal(&temp);
    let (records, report) = replay(&second);

    assert_eq!(report.checkpoint, Some(newest));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].transaction_id, 4);
}

#[test]
fn test_checkpoint_as_last_record() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    first.append(&mut commit(1, b"done")).unwrap();
    first.checkpoint(1, false).unwrap();
    crash(first);

    let second = open_journal(&temp);
    let (records, report) = replay(&second);

    assert!(records.is_empty());
    assert!(report.checkpoint.is_some());
    assert_eq!(report.last_lsn, None);
}

// =============================================================================
// Multi-File Tests
// =============================================================================

#[test]
fn test_checkpoint_in_older_file() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    first.append(&mut commit(1, b"skip")).unwrap();
    let checkpoint = first.checkpoint(1, false).unwrap().lsn;
    first.append(&mut commit(2, b"file 0")).unwrap();
    first.rotate().unwrap();
    first.append(&mut commit(3, b"file 1")).unwrap();
    first.rotate().unwrap();
    first.append(&mut commit(4, b"file 2")).unwrap();
    first.flush_and_wait().unwrap();
    crash(first);

    let second = open_journal(&temp);
    assert_eq!(second.current_file(), 3);
    let (records, report) = replay(&second);

    assert_eq!(report.checkpoint, Some(checkpoint));
    assert_eq!(report.files_scanned, 3);
    let files: Vec<u32> = records.iter().map(|r| r.lsn.file_number()).collect();
    assert_eq!(files, vec![0, 1, 2]);
    let txns: Vec<u64> = records.iter().map(|r| r.transaction_id).collect();
    assert_eq!(txns, vec![2, 3, 4]);
}

#[test]
fn test_no_checkpoint_starts_at_oldest_file() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    first.append(&mut commit(1, b"a")).unwrap();
    first.rotate().unwrap();
    first.append(&mut commit(2, b"b")).unwrap();
    first.flush_and_wait().unwrap();
    crash(first);

    let second = open_journal(&temp);
    let (records, report) = replay(&second);

    assert_eq!(report.files_scanned, 2);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].lsn, Lsn::encode(0, 1));
    assert_eq!(records[1].lsn, Lsn::encode(1, 1));
}

#[test]
fn test_current_file_is_not_replayed() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    first.append(&mut commit(1, b"old")).unwrap();
    first.flush_and_wait().unwrap();
    crash(first);

    let second = open_journal(&temp);
    let (records, _) = replay(&second);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].lsn.file_number(), 0);
}

#[test]
fn test_backup_files_are_ignored() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    first.append(&mut commit(1, b"kept")).unwrap();
    first.flush_and_wait().unwrap();
    crash(first);

    let bytes = fs::read(temp.path().join(file_for(0))).unwrap();
    let backup = temp.path().join(format!("{}{}", file_for(5), BAK_FILE_SUFFIX));
    fs::write(&backup, &bytes).unwrap();

    let second = open_journal(&temp);
    assert_eq!(second.current_file(), 1);
    let (records, report) = replay(&second);
    assert_eq!(records.len(), 1);
    assert_eq!(report.files_scanned, 1);
}

// =============================================================================
// Torn Tail Tests
// =============================================================================

#[test]
fn test_truncated_record_is_skipped() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    for txn in 0..3 {
        first.append(&mut commit(txn, b"complete")).unwrap();
    }
    first.flush_and_wait().unwrap();
    crash(first);

    // A header promising 100 payload bytes, followed by only 5
    let mut partial = vec![EntryType::TXN_COMMIT.code()];
    partial.extend_from_slice(&9u64.to_be_bytes());
    partial.extend_from_slice(&100u16.to_be_bytes());
    partial.extend_from_slice(b"trunc");
    append_bytes(&temp.path().join(file_for(0)), &partial);

    let second = open_journal(&temp);
    let (records, report) = replay(&second);

    assert_eq!(records.len(), 3);
    assert_eq!(report.torn_bytes, partial.len() as u64);
}

#[test]
fn test_garbage_tail_is_skipped() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    first.append(&mut commit(1, b"good")).unwrap();
    let checkpoint = first.checkpoint(1, false).unwrap().lsn;
    first.append(&mut commit(2, b"good")).unwrap();
    first.flush_and_wait().unwrap();
    crash(first);

    append_bytes(&temp.path().join(file_for(0)), &[0xee; 37]);

    let second = open_journal(&temp);
    let (records, report) = replay(&second);

    assert_eq!(report.checkpoint, Some(checkpoint));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].transaction_id, 2);
    assert_eq!(report.torn_bytes, 37);
}

#[test]
fn test_torn_tail_in_older_file() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    first.append(&mut commit(1, b"file 0")).unwrap();
    first.rotate().unwrap();
    first.append(&mut commit(2, b"file 1")).unwrap();
    first.flush_and_wait().unwrap();
    crash(first);

    append_bytes(&temp.path().join(file_for(0)), &[0x01, 0x00, 0x00]);

    let second = open_journal(&temp);
    let (records, report) = replay(&second);

    let txns: Vec<u64> = records.iter().map(|r| r.transaction_id).collect();
    assert_eq!(txns, vec![1, 2]);
    assert_eq!(report.torn_bytes, 3);
}

// =============================================================================
// Record Fidelity Tests
// =============================================================================

#[test]
fn test_records_round_trip_through_recovery() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    let mut written = Vec::new();
    for txn in 0..20u64 {
        let payload: Vec<u8> = (0..txn * 13).map(|b| b as u8).collect();
        let mut record = commit(txn, &payload);
        first.append(&mut record).unwrap();
        written.push(record);
    }
    first.flush_and_wait().unwrap();
    crash(first);

    let second = open_journal(&temp);
    let (records, report) = replay(&second);

    assert_eq!(records, written);
    assert_eq!(report.last_lsn, written.last().map(|r| r.lsn));
}

#[test]
fn test_custom_entry_types_are_replayed() {
    let temp = TempDir::new().unwrap();
    let mut registry = EntryTypeRegistry::with_builtins();
    registry.register(EntryType(0x20), "store-node").unwrap();
    let registry = Arc::new(registry);
    let config = JournalConfig::builder().journal_dir(temp.path()).build();

    let first = Journal::open_with(config.clone(), Arc::clone(&registry), None).unwrap();
    first
        .append(&mut LogRecord::new(EntryType(0x20), 7, b"node".to_vec()))
        .unwrap();
    first.flush_and_wait().unwrap();
    crash(first);

    let second = Journal::open_with(config, registry, None).unwrap();
    let (records, _) = replay(&second);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entry_type, EntryType(0x20));
}

// =============================================================================
// Recovery Mode Tests
// =============================================================================

#[test]
fn test_recovery_flag_during_redo() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    first.append(&mut commit(1, b"x")).unwrap();
    first.flush_and_wait().unwrap();
    crash(first);

    let second = open_journal(&temp);
    let flagged = Cell::new(false);
    second
        .recover(|_| {
            flagged.set(second.is_in_recovery());
            Ok(())
        })
        .unwrap();

    assert!(flagged.get());
    assert!(!second.is_in_recovery());
}

#[test]
#[should_panic(expected = "write to journal during recovery")]
fn test_append_during_redo_panics() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    first.append(&mut commit(1, b"x")).unwrap();
    first.flush_and_wait().unwrap();
    crash(first);

    let second = open_journal(&temp);
    let _ = second.recover(|_| {
        second.append(&mut commit(2, b"y"))?;
        Ok(())
    });
}

#[test]
fn test_redo_error_stops_recovery() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    for txn in 0..5 {
        first.append(&mut commit(txn, b"x")).unwrap();
    }
    first.flush_and_wait().unwrap();
    crash(first);

    let second = open_journal(&temp);
    let mut calls = 0;
    let err = second
        .recover(|record| {
            calls += 1;
            if record.transaction_id == 1 {
                return Err(JournalError::Corruption("bad page".into()));
            }
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, JournalError::Corruption(_)));
    assert_eq!(calls, 2);
    assert!(!second.is_in_recovery());

    // Normal operation resumes
    second.append(&mut commit(9, b"after")).unwrap();
}

// =============================================================================
// Scanner Tests
// =============================================================================

#[test]
fn test_scanner_reaches_done() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    first.append(&mut commit(1, b"x")).unwrap();
    first.checkpoint(1, false).unwrap();
    first.append(&mut commit(2, b"y")).unwrap();
    first.close().unwrap();

    let mut scanner =
        RecoveryScanner::new(temp.path(), Arc::new(EntryTypeRegistry::with_builtins()));
    assert_eq!(scanner.state(), RecoveryState::Idle);

    let mut replayed = 0;
    let report = scanner
        .run(|_| {
            replayed += 1;
            Ok(())
        })
        .unwrap();

    assert_eq!(scanner.state(), RecoveryState::Done);
    assert_eq!(replayed, 1);
    assert_eq!(report.records_replayed, 1);
}

#[test]
fn test_scanner_below_limits_files() {
    let temp = TempDir::new().unwrap();
    let first = open_journal(&temp);
    first.append(&mut commit(1, b"x")).unwrap();
    first.rotate().unwrap();
    first.append(&mut commit(2, b"y")).unwrap();
    first.close().unwrap();

    let mut scanner =
        RecoveryScanner::new(temp.path(), Arc::new(EntryTypeRegistry::with_builtins()))
            .below(1);
    let mut txns = Vec::new();
    let report = scanner
        .run(|record| {
            txns.push(record.transaction_id);
            Ok(())
        })
        .unwrap();

    assert_eq!(txns, vec![1]);
    assert_eq!(report.files_scanned, 1);
}
