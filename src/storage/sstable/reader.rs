//! SSTable Reader
//!
//! Opens SSTable files and provides O(log n) key lookups via in-memory index.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{KvError, Result};
use crate::types::{read_u32_le, read_u64_le, Entry};

use super::iterator::SSTableIterator;
use super::{parse_table_name, FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Reader for SSTable files with in-memory index for O(log n) lookups
///
/// Lookups take `&self`: the file cursor sits behind a mutex so one reader
/// can be shared between threads.
pub struct SSTableReader {
    path: PathBuf,
    /// File handle for point lookups
    file: Mutex<BufReader<File>>,
    /// In-memory index: key → file offset
    index: BTreeMap<Vec<u8>, u64>,
    entry_count: u64,
    covered_wal_seq: u64,
    /// Index block starting offset (end of data, for iteration)
    index_offset: u64,
    file_size: u64,
    level: usize,
    token: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Validates header and data checksum, then loads the entire index into
    /// memory. Level and token come from the file name when it follows the
    /// `L{level}_{token}.sst` convention, and default to zero otherwise.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let file_size = bytes.len() as u64;

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(KvError::corrupt(
                0,
                format!("SSTable too small: {} bytes", file_size),
            ));
        }

        // Header
        if &bytes[0..4] != MAGIC {
            return Err(KvError::Storage(format!(
                "Invalid SSTable magic: expected LSKV, got {:?}",
                &bytes[0..4]
            )));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(KvError::Storage(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }
        let entry_count = read_u64_le(&bytes, 6, 0)?;
        let covered_wal_seq = read_u64_le(&bytes, 14, 0)?;

        // Footer
        let footer_start = (file_size - FOOTER_SIZE) as usize;
        let index_offset = read_u64_le(&bytes, footer_start, 0)?;
        let data_crc = read_u32_le(&bytes, footer_start + 8, 0)?;

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(KvError::corrupt(
                footer_start as u64,
                format!("index offset {} out of bounds", index_offset),
            ));
        }

        let data = &bytes[HEADER_SIZE as usize..index_offset as usize];
        if crc32fast::hash(data) != data_crc {
            return Err(KvError::corrupt(HEADER_SIZE, "SSTable data checksum mismatch"));
        }

        // Index entries: [key_len(4)][offset(8)][key]
        let index_data = &bytes[index_offset as usize..footer_start];
        let mut index = BTreeMap::new();
        let mut pos = 0;
        while pos < index_data.len() {
            let key_len = read_u32_le(index_data, pos, index_offset)? as usize;
            let offset = read_u64_le(index_data, pos + 4, index_offset)?;
            pos += 12;

            let key = index_data.get(pos..pos + key_len).ok_or_else(|| {
                KvError::corrupt(index_offset + pos as u64, "truncated index key")
            })?;
            pos += key_len;

            if offset < HEADER_SIZE || offset >= index_offset {
                return Err(KvError::corrupt(
                    index_offset + pos as u64,
                    format!("index entry points outside data block: {}", offset),
                ));
            }
            index.insert(key.to_vec(), offset);
        }

        if index.len() as u64 != entry_count {
            return Err(KvError::corrupt(
                6,
                format!(
                    "header claims {} entries, index holds {}",
                    entry_count,
                    index.len()
                ),
            ));
        }

        let (level, token) = parse_table_name(path).unwrap_or((0, 0));

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(File::open(path)?)),
            index,
            entry_count,
            covered_wal_seq,
            index_offset,
            file_size,
            level,
            token,
        })
    }

    /// Get a value by key with an O(log n) lookup via in-memory index
    ///
    /// Returns:
    /// - `Ok(Some(Entry::Value))`: key found with value
    /// - `Ok(Some(Entry::Tombstone))`: key found but deleted
    /// - `Ok(None)`: key not in this SSTable
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        let offset = match self.index.get(key) {
            Some(&off) => off,
            None => return Ok(None),
        };

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;
        let key_len = read_u32_le(&header, 0, offset)? as usize;
        let val_len = read_u32_le(&header, 4, offset)?;

        if key_len != key.len() {
            return Err(KvError::corrupt(offset, "entry key length disagrees with index"));
        }
        let mut stored_key = vec![0u8; key_len];
        file.read_exact(&mut stored_key)?;
        if stored_key != key {
            return Err(KvError::corrupt(offset, "entry key disagrees with index"));
        }

        if val_len == TOMBSTONE_MARKER {
            return Ok(Some(Entry::Tombstone));
        }

        let mut value = vec![0u8; val_len as usize];
        file.read_exact(&mut value)?;

        Ok(Some(Entry::Value(value)))
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Highest WAL sequence captured by this table
    pub fn covered_wal_seq(&self) -> u64 {
        self.covered_wal_seq
    }

    /// Get the minimum key in this SSTable (for range filtering)
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    /// Get the maximum key in this SSTable (for range filtering)
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false, // Empty SSTable
        }
    }

    /// Iterate over all entries in key order through a separate file handle
    pub fn iter(&self) -> Result<SSTableIterator> {
        SSTableIterator::open(&self.path, self.index_offset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Recency token; larger is newer within a level
    pub fn token(&self) -> u64 {
        self.token
    }
}

impl std::fmt::Debug for SSTableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTableReader")
            .field("path", &self.path)
            .field("level", &self.level)
            .field("token", &self.token)
            .field("entry_count", &self.entry_count)
            .finish()
    }
}
