//! Tests for SSTable builder, reader and iterator
//!
//! These tests verify:
//! - Building tables from sorted entries
//! - Point lookups, tombstones and range checks
//! - Sequential iteration
//! - Atomic publication via temporary files
//! - Corruption detection on open
//! - File naming

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use lsmkv::storage::{parse_table_name, table_file_name, SSTableBuilder, SSTableReader};
use lsmkv::{Entry, KvError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(table_file_name(0, 1));
    (temp_dir, path)
}

fn build_table(path: &Path, count: usize) {
    let mut builder = SSTableBuilder::new(path).unwrap();
    for i in 0..count {
        builder
            .add(
                format!("key{:04}", i).as_bytes(),
                format!("value{:04}", i).as_bytes(),
            )
            .unwrap();
    }
    builder.finish().unwrap();
}

// =============================================================================
// Builder Tests
// =============================================================================

#[test]
fn test_builder_returns_metadata() {
    let (_temp, path) = setup_temp_dir();
    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.set_covered_wal_seq(7);
    builder.add(b"apple", b"red").unwrap();
    builder.add_tombstone(b"banana").unwrap();
    builder.add(b"cherry", b"dark").unwrap();
    assert_eq!(builder.entry_count(), 3);

    let table = builder.finish().unwrap();

    assert_eq!(table.path, path);
    assert_eq!(table.entry_count(), 3);
    assert_eq!(table.min_key, b"apple");
    assert_eq!(table.max_key, b"cherry");
    assert_eq!(table.covered_wal_seq, 7);
    assert_eq!(table.file_size, fs::metadata(&path).unwrap().len());
    assert!(table.might_contain(b"blueberry"));
    assert!(!table.might_contain(b"zucchini"));
}

#[test]
fn test_builder_rejects_unsorted_keys() {
    let (_temp, path) = setup_temp_dir();
    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.add(b"b", b"2").unwrap();

    assert!(matches!(
        builder.add(b"a", b"1"),
        Err(KvError::InvariantViolation(_))
    ));
    // A failed builder never publishes its table
    assert!(builder.finish().is_err());
    assert!(!path.exists());
}

#[test]
fn test_builder_rejects_duplicate_keys() {
    let (_temp, path) = setup_temp_dir();
    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.add(b"a", b"1").unwrap();

    assert!(builder.add_tombstone(b"a").is_err());
}

#[test]
fn test_unfinished_builder_leaves_no_files() {
    let (temp, path) = setup_temp_dir();
    {
        let mut builder = SSTableBuilder::new(&path).unwrap();
        builder.add(b"a", b"1").unwrap();
        assert!(path.with_extension("tmp").exists());
    }

    assert!(!path.exists());
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[test]
fn test_finished_builder_removes_temp_file() {
    let (temp, path) = setup_temp_dir();
    build_table(&path, 3);

    let names: Vec<_> = fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names.len(), 1);
    assert_eq!(names[0], path.file_name().unwrap());
}

#[test]
fn test_empty_table() {
    let (_temp, path) = setup_temp_dir();
    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.set_covered_wal_seq(3);
    let table = builder.finish().unwrap();
    assert_eq!(table.entry_count(), 0);
    assert!(!table.might_contain(b"anything"));

    let reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.entry_count(), 0);
    assert_eq!(reader.covered_wal_seq(), 3);
    assert_eq!(reader.get(b"anything").unwrap(), None);
    assert!(!reader.might_contain(b"anything"));
    assert_eq!(reader.iter().unwrap().count(), 0);
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_reader_point_lookups() {
    let (_temp, path) = setup_temp_dir();
    build_table(&path, 100);

    let reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.entry_count(), 100);
    assert_eq!(
        reader.get(b"key0042").unwrap(),
        Some(Entry::Value(b"value0042".to_vec()))
    );
    assert_eq!(reader.get(b"key9999").unwrap(), None);
    assert_eq!(reader.min_key(), Some(&b"key0000"[..]));
    assert_eq!(reader.max_key(), Some(&b"key0099"[..]));
}

#[test]
fn test_reader_tombstone_and_empty_value() {
    let (_temp, path) = setup_temp_dir();
    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.add_entry(b"a", &Entry::Value(Vec::new())).unwrap();
    builder.add_entry(b"b", &Entry::Tombstone).unwrap();
    builder.finish().unwrap();

    let reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.get(b"a").unwrap(), Some(Entry::Value(Vec::new())));
    assert_eq!(reader.get(b"b").unwrap(), Some(Entry::Tombstone));
}

#[test]
fn test_reader_parses_level_and_token() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(table_file_name(2, 12345));
    build_table(&path, 1);

    let reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.level(), 2);
    assert_eq!(reader.token(), 12345);
    assert_eq!(reader.path(), path.as_path());
}

#[test]
fn test_reader_rejects_bad_magic() {
    let (_temp, path) = setup_temp_dir();
    build_table(&path, 5);

    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.write_all(b"XXXX").unwrap();

    assert!(matches!(
        SSTableReader::open(&path),
        Err(KvError::Storage(_))
    ));
}

#[test]
fn test_reader_detects_data_corruption() {
    let (_temp, path) = setup_temp_dir();
    build_table(&path, 5);

    // First data byte sits right after the 22-byte header
    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(30)).unwrap();
    file.write_all(&[0xAB]).unwrap();

    assert!(matches!(
        SSTableReader::open(&path),
        Err(KvError::CorruptRecord { .. })
    ));
}

#[test]
fn test_reader_rejects_truncated_file() {
    let (_temp, path) = setup_temp_dir();
    fs::write(&path, b"LSKV").unwrap();

    assert!(SSTableReader::open(&path).is_err());
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_iterator_yields_all_entries_in_order() {
    let (_temp, path) = setup_temp_dir();
    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.add(b"a", b"1").unwrap();
    builder.add_tombstone(b"b").unwrap();
    builder.add(b"c", b"3").unwrap();
    builder.finish().unwrap();

    let reader = SSTableReader::open(&path).unwrap();
    let entries: Vec<_> = reader.iter().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(
        entries,
        vec![
            (b"a".to_vec(), Entry::Value(b"1".to_vec())),
            (b"b".to_vec(), Entry::Tombstone),
            (b"c".to_vec(), Entry::Value(b"3".to_vec())),
        ]
    );
}

#[test]
fn test_iterator_independent_of_lookups() {
    let (_temp, path) = setup_temp_dir();
    build_table(&path, 50);
    let reader = SSTableReader::open(&path).unwrap();

    let mut iter = reader.iter().unwrap();
    let first = iter.next().unwrap().unwrap();
    assert!(reader.get(b"key0049").unwrap().is_some());
    let second = iter.next().unwrap().unwrap();

    assert_eq!(first.0, b"key0000");
    assert_eq!(second.0, b"key0001");
    assert_eq!(iter.count(), 48);
}

// =============================================================================
// Naming Tests
// =============================================================================

#[test]
fn test_table_file_name_roundtrip() {
    let name = table_file_name(3, 1_700_000_000_000_000_000);
    assert_eq!(name, "L3_01700000000000000000.sst");
    assert_eq!(
        parse_table_name(Path::new(&name)),
        Some((3, 1_700_000_000_000_000_000))
    );
}

#[test]
fn test_table_file_names_sort_by_token() {
    let older = table_file_name(0, 99);
    let newer = table_file_name(0, 100);
    assert!(older < newer);
}

#[test]
fn test_parse_table_name_rejects_other_files() {
    assert_eq!(parse_table_name(Path::new("L0_0001.tmp")), None);
    assert_eq!(parse_table_name(Path::new("wal_000001.log")), None);
    assert_eq!(parse_table_name(Path::new("X0_0001.sst")), None);
    assert_eq!(parse_table_name(Path::new("L0.sst")), None);
}
