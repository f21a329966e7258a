//! SSTable Builder
//!
//! Writes sorted key-value entries to a new SSTable file.
//!
//! Entries go to `<path>.tmp`; `finish()` fsyncs and renames it into place.
//! A builder that is dropped without finishing, or whose `finish()` fails,
//! removes the temporary file, so a partially written table is never
//! visible under a readable name.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{KvError, Result};
use crate::types::Entry;

use super::{SSTable, HEADER_SIZE, MAGIC, TEMP_EXTENSION, TOMBSTONE_MARKER, VERSION};

/// Builder for creating new SSTables from sorted entries
pub struct SSTableBuilder {
    /// Final file path
    path: PathBuf,
    /// Where bytes are written until `finish()`
    tmp_path: PathBuf,
    /// Buffered writer; taken by `finish()`
    writer: Option<BufWriter<File>>,
    /// Number of entries written
    entry_count: u64,
    /// Current write position (for index)
    current_offset: u64,
    /// Index: key → file offset of entry
    index: Vec<(Vec<u8>, u64)>,
    /// Highest WAL sequence captured by this table
    covered_wal_seq: u64,
    /// Set when any write failed; `finish()` refuses to publish the table
    failed: bool,
    finished: bool,
    /// Running CRC hasher for data section
    data_hasher: crc32fast::Hasher,
}

impl SSTableBuilder {
    /// Create a new SSTable builder
    ///
    /// Writes header immediately; call `add()`/`add_tombstone()` in strictly
    /// ascending key order, then `finish()` to write index and footer.
    pub fn new(path: &Path) -> Result<Self> {
        Self::with_capacity(path, 0)
    }

    /// Create a builder that expects roughly `expected_entries` entries
    pub fn with_capacity(path: &Path, expected_entries: usize) -> Result<Self> {
        let tmp_path = path.with_extension(TEMP_EXTENSION);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut builder = Self {
            path: path.to_path_buf(),
            tmp_path,
            writer: Some(BufWriter::new(file)),
            entry_count: 0,
            current_offset: HEADER_SIZE,
            index: Vec::with_capacity(expected_entries),
            covered_wal_seq: 0,
            failed: false,
            finished: false,
            data_hasher: crc32fast::Hasher::new(),
        };

        // Header; entry count and covered seq are patched in finish()
        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.extend_from_slice(&0u64.to_le_bytes());
        header.extend_from_slice(&0u64.to_le_bytes());
        builder.write_raw(&header)?;

        Ok(builder)
    }

    /// Record the highest WAL sequence this table makes durable
    pub fn set_covered_wal_seq(&mut self, seq: u64) {
        self.covered_wal_seq = seq;
    }

    /// Add a key-value pair (must be called in sorted key order)
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write_entry(key, Some(value))
    }

    /// Add a tombstone (must be called in sorted key order)
    pub fn add_tombstone(&mut self, key: &[u8]) -> Result<()> {
        self.write_entry(key, None)
    }

    /// Add either kind of entry
    pub fn add_entry(&mut self, key: &[u8], entry: &Entry) -> Result<()> {
        match entry {
            Entry::Value(v) => self.add(key, v),
            Entry::Tombstone => self.add_tombstone(key),
        }
    }

    /// Number of entries added so far
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Internal: write an entry (value=None means tombstone)
    fn write_entry(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if let Some((last, _)) = self.index.last() {
            if key <= last.as_slice() {
                self.failed = true;
                return Err(KvError::InvariantViolation(format!(
                    "SSTable keys must be strictly ascending: {:?} after {:?}",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(last)
                )));
            }
        }

        let key_len = u32::try_from(key.len())
            .map_err(|_| KvError::Storage(format!("key too large: {} bytes", key.len())))?;
        let val_len = match value {
            Some(v) if v.len() >= TOMBSTONE_MARKER as usize => {
                return Err(KvError::Storage(format!("value too large: {} bytes", v.len())))
            }
            Some(v) => v.len() as u32,
            None => TOMBSTONE_MARKER,
        };

        // Prepare entry bytes: [key_len(4)][val_len(4)][key][value]
        let mut buf = Vec::with_capacity(8 + key.len() + value.map_or(0, |v| v.len()));
        buf.extend_from_slice(&key_len.to_le_bytes());
        buf.extend_from_slice(&val_len.to_le_bytes());
        buf.extend_from_slice(key);
        if let Some(v) = value {
            buf.extend_from_slice(v);
        }

        self.write_raw(&buf)?;
        self.data_hasher.update(&buf);

        self.index.push((key.to_vec(), self.current_offset));
        self.current_offset += buf.len() as u64;
        self.entry_count += 1;

        Ok(())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| KvError::Storage("SSTable builder already finished".to_string()))?;
        if let Err(e) = writer.write_all(bytes) {
            self.failed = true;
            return Err(e.into());
        }
        Ok(())
    }

    /// Finish building: write index block, footer, fsync, publish, and
    /// return metadata
    pub fn finish(mut self) -> Result<SSTable> {
        if self.failed {
            return Err(KvError::Storage(format!(
                "refusing to finish SSTable {} after a failed write",
                self.path.display()
            )));
        }

        // Record where index block starts
        let index_offset = self.current_offset;

        // Write index block: [key_len(4)][offset(8)][key] for each entry
        let mut block = Vec::new();
        for (key, offset) in &self.index {
            block.extend_from_slice(&(key.len() as u32).to_le_bytes());
            block.extend_from_slice(&offset.to_le_bytes());
            block.extend_from_slice(key);
        }

        // Footer: index_offset (8) + data_crc (4) + padding (4)
        let data_crc = self.data_hasher.clone().finalize();
        block.extend_from_slice(&index_offset.to_le_bytes());
        block.extend_from_slice(&data_crc.to_le_bytes());
        block.extend_from_slice(&[0u8; 4]);
        self.write_raw(&block)?;

        let writer = self
            .writer
            .take()
            .ok_or_else(|| KvError::Storage("SSTable builder already finished".to_string()))?;
        let mut file = writer.into_inner().map_err(|e| {
            KvError::Storage(format!("Failed to flush SSTable: {}", e.error()))
        })?;

        // Patch entry count and covered seq in the header (after magic + version)
        file.seek(SeekFrom::Start(6))?;
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.write_all(&self.covered_wal_seq.to_le_bytes())?;
        file.sync_all()?;
        let file_size = file.metadata()?.len();
        drop(file);

        fs::rename(&self.tmp_path, &self.path)?;
        if let Some(dir) = self.path.parent() {
            // Persist the rename; not every platform can fsync a directory
            if let Ok(dir) = File::open(dir) {
                let _ = dir.sync_all();
            }
        }
        self.finished = true;

        let min_key = self.index.first().map(|(k, _)| k.clone()).unwrap_or_default();
        let max_key = self.index.last().map(|(k, _)| k.clone()).unwrap_or_default();

        Ok(SSTable {
            path: self.path.clone(),
            entry_count: self.entry_count,
            min_key,
            max_key,
            file_size,
            covered_wal_seq: self.covered_wal_seq,
        })
    }
}

impl Drop for SSTableBuilder {
    fn drop(&mut self) {
        if !self.finished {
            self.writer.take();
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}
