//! SSTable Iterator
//!
//! Sequential iteration over all entries in an SSTable.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{KvError, Result};
use crate::types::Entry;

use super::{HEADER_SIZE, TOMBSTONE_MARKER};

/// Iterator over SSTable entries in sorted key order
///
/// Owns its own file handle, so iterating never contends with point lookups
/// on the same table.
pub struct SSTableIterator {
    file: BufReader<File>,
    /// Stop reading when we reach this offset (start of index block)
    end_offset: u64,
    /// Current position in file
    current_offset: u64,
    failed: bool,
}

impl SSTableIterator {
    /// Create a new iterator starting from the data block
    pub(super) fn open(path: &Path, end_offset: u64) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        Ok(Self {
            file,
            end_offset,
            current_offset: HEADER_SIZE,
            failed: false,
        })
    }

    fn read_entry(&mut self) -> Result<(Vec<u8>, Entry)> {
        let mut header = [0u8; 8];
        self.file.read_exact(&mut header)?;

        let key_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let val_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let mut key = vec![0u8; key_len];
        self.file.read_exact(&mut key)?;

        let mut entry_size = 8 + key_len as u64;
        let entry = if val_len == TOMBSTONE_MARKER {
            Entry::Tombstone
        } else {
            let mut v = vec![0u8; val_len as usize];
            self.file.read_exact(&mut v)?;
            entry_size += val_len as u64;
            Entry::Value(v)
        };

        if self.current_offset + entry_size > self.end_offset {
            return Err(KvError::corrupt(
                self.current_offset,
                "entry runs into the index block",
            ));
        }
        self.current_offset += entry_size;

        Ok((key, entry))
    }
}

impl Iterator for SSTableIterator {
    type Item = Result<(Vec<u8>, Entry)>;

    fn next(&mut self) -> Option<Self::Item> {
        // Stop at index block
        if self.failed || self.current_offset >= self.end_offset {
            return None;
        }

        let result = self.read_entry();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}
