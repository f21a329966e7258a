//! Tests for the Write-Ahead Log
//!
//! These tests verify:
//! - Frame encoding and CRC checks
//! - Writer LSN sequencing and sync strategies
//! - Reader handling of torn tails and corrupt frames
//! - Recovery truncation
//! - Sequence-numbered WAL files

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use lsmkv::config::WalSyncStrategy;
use lsmkv::wal::{
    list_wal_files, Operation, Wal, WalEntry, WalReader, WalRecovery, WalWriter, HEADER_SIZE,
};
use lsmkv::KvError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn put(key: &str, value: &str) -> Operation {
    Operation::Put {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
    }
}

fn write_entries_via_writer(path: &Path, count: usize) {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        writer
            .append(put(&format!("key{}", i), &format!("value{}", i)))
            .unwrap();
    }
}

// =============================================================================
// Entry Framing Tests
// =============================================================================

#[test]
fn test_entry_frame_layout() {
    let entry = WalEntry::new(7, put("key", "value"));
    let bytes = entry.serialize().unwrap();

    assert_eq!(&bytes[0..8], &7u64.to_le_bytes());
    let len = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
    assert_eq!(bytes.len(), HEADER_SIZE + len);

    let crc = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    assert_eq!(crc, WalEntry::compute_crc(&bytes[HEADER_SIZE..]));
}

#[test]
fn test_entry_roundtrip_preserves_operation() {
    let entry = WalEntry::new(3, Operation::Delete { key: b"gone".to_vec() });
    let recovered = WalEntry::deserialize(&entry.serialize().unwrap()).unwrap();

    assert_eq!(recovered, entry);
    assert_eq!(recovered.operation.key(), b"gone");
}

#[test]
fn test_crc_corruption_detected() {
    let entry = WalEntry::new(1, put("key", "value"));
    let mut bytes = entry.serialize().unwrap();

    if let Some(byte) = bytes.last_mut() {
        *byte ^= 0xFF;
    }

    let result = WalEntry::deserialize(&bytes);
    assert!(matches!(result, Err(KvError::WalCorruption(_))));
}

#[test]
fn test_header_too_small() {
    let result = WalEntry::deserialize(&[0u8; 10]);
    assert!(matches!(result, Err(KvError::WalCorruption(_))));
}

#[test]
fn test_truncated_payload_rejected() {
    let bytes = WalEntry::new(1, put("key", "value")).serialize().unwrap();
    assert!(WalEntry::deserialize(&bytes[..HEADER_SIZE + 2]).is_err());
}

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_writer_assigns_sequential_lsns() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    assert_eq!(writer.append(put("a", "1")).unwrap(), 1);
    assert_eq!(writer.append(put("b", "2")).unwrap(), 2);
    assert_eq!(
        writer
            .append(Operation::Delete { key: b"a".to_vec() })
            .unwrap(),
        3
    );
    assert_eq!(writer.current_lsn(), 4);
}

#[test]
fn test_writer_reopen_continues_lsn() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 5);

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.current_lsn(), 6);
    assert_eq!(writer.append(put("next", "v")).unwrap(), 6);

    let entries: Vec<_> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 6);
}

#[test]
fn test_every_write_leaves_nothing_uncommitted() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    writer.append(put("k", "v")).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

#[test]
fn test_every_n_entries_syncs_on_threshold() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer =
        WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 3 }).unwrap();

    writer.append(put("a", "1")).unwrap();
    writer.append(put("b", "2")).unwrap();
    assert_eq!(writer.uncommitted_count(), 2);

    writer.append(put("c", "3")).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);

    writer.append(put("d", "4")).unwrap();
    writer.sync().unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

#[test]
fn test_unsynced_entries_are_readable() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer =
        WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 100 }).unwrap();
    writer.append(put("a", "1")).unwrap();

    // Entries reach the OS on every append even without an fsync
    let mut reader = WalReader::open(&wal_path).unwrap();
    let entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.operation, put("a", "1"));
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_reader_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.file_len(), 0);
}

#[test]
fn test_reader_returns_entries_in_order() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 10);

    let lsns: Vec<u64> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .map(|e| e.unwrap().lsn)
        .collect();
    assert_eq!(lsns, (1..=10).collect::<Vec<_>>());
}

#[test]
fn test_reader_torn_tail_reads_as_end() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);
    let full_len = fs::metadata(&wal_path).unwrap().len();

    let torn = WalEntry::new(3, put("torn", "value")).serialize().unwrap();
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&torn[..torn.len() - 3]).unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.next_entry().unwrap().is_some());
    assert!(reader.next_entry().unwrap().is_some());
    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.position(), full_len);
}

#[test]
fn test_reader_partial_header_reads_as_end() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 1);
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[0u8; 5]).unwrap();

    let entries: Vec<_> = WalReader::open(&wal_path).unwrap().entries().collect();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_ok());
}

#[test]
fn test_reader_corrupt_frame_is_error() {
    let (_temp, wal_path) = setup_temp_wal();
    let good = WalEntry::new(1, put("k1", "v1")).serialize().unwrap();
    let mut bad = WalEntry::new(2, put("k2", "v2")).serialize().unwrap();
    if let Some(byte) = bad.last_mut() {
        *byte ^= 0xFF;
    }

    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&good).unwrap();
    file.write_all(&bad).unwrap();
    file.sync_all().unwrap();

    let mut iter = WalReader::open(&wal_path).unwrap().entries();
    assert!(iter.next().unwrap().is_ok());
    assert!(matches!(iter.next(), Some(Err(KvError::WalCorruption(_)))));
    assert!(iter.next().is_none());
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recover_clean_wal() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 5);
    let len_before = fs::metadata(&wal_path).unwrap().len();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 5);
    assert_eq!(result.entries_recovered, 5);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 5);
    assert!(!result.was_truncated);
    assert_eq!(result.valid_len, len_before);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), len_before);
}

#[test]
fn test_recover_truncates_partial_write() {
    let (_temp, wal_path) = setup_temp_wal();
    let good = WalEntry::new(1, put("k", "v")).serialize().unwrap();
    let partial = WalEntry::new(2, put("k2", "v2")).serialize().unwrap();

    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&good).unwrap();
    file.write_all(&partial[..partial.len() / 2]).unwrap();
    file.sync_all().unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(result.entries_corrupted, 0);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), good.len() as u64);
}

#[test]
fn test_recover_stops_at_corrupted_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    let first = WalEntry::new(1, put("k1", "v1")).serialize().unwrap();
    let mut second = WalEntry::new(2, put("k2", "v2")).serialize().unwrap();
    let third = WalEntry::new(3, put("k3", "v3")).serialize().unwrap();
    second[HEADER_SIZE + 1] ^= 0xFF;

    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&first).unwrap();
    file.write_all(&second).unwrap();
    file.write_all(&third).unwrap();
    file.sync_all().unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    // Nothing after the corruption is trusted, even a valid-looking frame
    assert_eq!(entries.len(), 1);
    assert_eq!(result.entries_recovered, 1);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.last_lsn, 1);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), first.len() as u64);
}

#[test]
fn test_verify_does_not_modify_file() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 3);
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[1u8; 7]).unwrap();
    let len_before = fs::metadata(&wal_path).unwrap().len();

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 3);
    assert!(result.was_truncated);
    assert!(result.valid_len < len_before);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), len_before);
}

#[test]
fn test_recover_and_verify_agree() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 20);

    let verify_result = WalRecovery::verify(&wal_path).unwrap();
    let (entries, recover_result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len() as u64, recover_result.entries_recovered);
    assert_eq!(recover_result, verify_result);
}

// =============================================================================
// Sequence-numbered WAL Tests
// =============================================================================

#[test]
fn test_wal_file_naming() {
    assert_eq!(Wal::file_name(42), "wal_000042.log");
    assert_eq!(Wal::parse_seq(&PathBuf::from("wal_000042.log")), Some(42));
    assert_eq!(Wal::parse_seq(&PathBuf::from("/x/wal_000001.log")), Some(1));
    assert_eq!(Wal::parse_seq(&PathBuf::from("wal_000042.tmp")), None);
    assert_eq!(Wal::parse_seq(&PathBuf::from("log_000042.log")), None);
    assert_eq!(Wal::parse_seq(&PathBuf::from("wal_abc.log")), None);
}

#[test]
fn test_wal_open_creates_file() {
    let temp = TempDir::new().unwrap();
    let mut wal = Wal::open(temp.path(), 3, WalSyncStrategy::EveryWrite).unwrap();

    assert_eq!(wal.seq(), 3);
    assert_eq!(wal.path(), Wal::path_for(temp.path(), 3));
    assert!(wal.path().exists());

    assert_eq!(wal.append(put("a", "1")).unwrap(), 1);
}

#[test]
fn test_wal_open_and_replay() {
    let temp = TempDir::new().unwrap();
    {
        let mut wal = Wal::open(temp.path(), 1, WalSyncStrategy::EveryWrite).unwrap();
        wal.append(put("a", "1")).unwrap();
        wal.append(Operation::Delete { key: b"a".to_vec() }).unwrap();
    }

    let (mut wal, entries) =
        Wal::open_and_replay(temp.path(), 1, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].operation, Operation::Delete { key: b"a".to_vec() });

    // Appends continue after the replayed entries
    assert_eq!(wal.append(put("b", "2")).unwrap(), 3);
}

#[test]
fn test_wal_open_and_replay_missing_file() {
    let temp = TempDir::new().unwrap();
    let (wal, entries) =
        Wal::open_and_replay(temp.path(), 9, WalSyncStrategy::EveryWrite).unwrap();

    assert!(entries.is_empty());
    assert!(wal.path().exists());
}

#[test]
fn test_wal_close_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let mut wal = Wal::open(temp.path(), 1, WalSyncStrategy::EveryWrite).unwrap();
    wal.append(put("a", "1")).unwrap();

    wal.close().unwrap();
    wal.close().unwrap();
    assert!(wal.is_closed());
    assert!(wal.append(put("b", "2")).is_err());
    assert!(wal.path().exists());
}

#[test]
fn test_wal_remove_deletes_file() {
    let temp = TempDir::new().unwrap();
    let mut wal = Wal::open(temp.path(), 1, WalSyncStrategy::EveryWrite).unwrap();
    wal.append(put("a", "1")).unwrap();

    wal.remove().unwrap();
    assert!(!wal.path().exists());
    assert!(wal.is_closed());

    // Removing twice is not an error
    wal.remove().unwrap();
}

#[test]
fn test_list_wal_files_sorted() {
    let temp = TempDir::new().unwrap();
    for seq in [5, 1, 12] {
        Wal::open(temp.path(), seq, WalSyncStrategy::EveryWrite).unwrap();
    }
    File::create(temp.path().join("notes.txt")).unwrap();
    fs::create_dir(temp.path().join("wal_000099.log.d")).unwrap();

    assert_eq!(list_wal_files(temp.path()).unwrap(), vec![1, 5, 12]);
}
