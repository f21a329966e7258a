//! MemTable implementation
//!
//! Arena-backed memtable with a WAL and an RwLock for concurrency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::arena::Arena;
use crate::error::{KvError, Result};
use crate::types::Entry;
use crate::wal::{Operation, Wal, WalEntry};

struct TableData {
    /// key → offset of the latest record for that key
    index: HashMap<Vec<u8>, usize>,
    arena: Arena,
}

/// In-memory table for recent writes
///
/// ## Concurrency
/// - Writers are serialized by the `wal` mutex, which is held for the whole
///   log-then-apply sequence so WAL order matches arena order.
/// - Readers take the `data` read lock only; they never wait on an fsync.
pub struct MemTable {
    data: RwLock<TableData>,
    wal: Mutex<Wal>,
    /// Approximate size in bytes (sum of arena record sizes)
    size: AtomicUsize,
    frozen: AtomicBool,
}

impl MemTable {
    /// Create an empty memtable logging to `wal`
    pub fn new(wal: Wal, arena_capacity: usize) -> Self {
        Self::with_arena(wal, Arena::new(arena_capacity))
    }

    /// Create an empty memtable over a caller-supplied arena
    pub fn with_arena(wal: Wal, arena: Arena) -> Self {
        Self {
            data: RwLock::new(TableData {
                index: HashMap::new(),
                arena,
            }),
            wal: Mutex::new(wal),
            size: AtomicUsize::new(0),
            frozen: AtomicBool::new(false),
        }
    }

    /// Put a key-value pair, returning the new table size
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<usize> {
        self.write(key, value, false)
    }

    /// Delete a key by writing a tombstone, returning the new table size
    pub fn delete(&self, key: &[u8]) -> Result<usize> {
        self.write(key, &[], true)
    }

    fn write(&self, key: &[u8], value: &[u8], tombstone: bool) -> Result<usize> {
        let mut wal = self.wal.lock();

        if self.is_frozen() {
            return Err(KvError::InvariantViolation(format!(
                "write to frozen memtable (wal {})",
                wal.seq()
            )));
        }

        // Fail before logging if the arena cannot take the record; a record in
        // the WAL must always be applicable on replay.
        let record_size = Arena::record_size(key, value);
        {
            let data = self.data.read();
            let remaining = data.arena.limit().saturating_sub(data.arena.len());
            if record_size > remaining {
                return Err(KvError::ArenaFull {
                    requested: record_size,
                    remaining,
                });
            }
        }

        let operation = if tombstone {
            Operation::Delete { key: key.to_vec() }
        } else {
            Operation::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            }
        };
        wal.append(operation)?;

        self.apply(key, value, tombstone)
    }

    /// Arena append + index update; the visibility point for readers
    fn apply(&self, key: &[u8], value: &[u8], tombstone: bool) -> Result<usize> {
        let mut data = self.data.write();
        let offset = data.arena.put(key, value, tombstone)?;
        data.index.insert(key.to_vec(), offset);
        let added = Arena::record_size(key, value);
        Ok(self.size.fetch_add(added, Ordering::SeqCst) + added)
    }

    /// Apply entries recovered from this table's WAL without re-logging them
    pub fn replay(&self, entries: &[WalEntry]) -> Result<()> {
        let _wal = self.wal.lock();
        for entry in entries {
            match &entry.operation {
                Operation::Put { key, value } => self.apply(key, value, false)?,
                Operation::Delete { key } => self.apply(key, &[], true)?,
            };
        }
        Ok(())
    }

    /// Look up a key
    ///
    /// - `Ok(Some(Entry::Value))`: live value
    /// - `Ok(Some(Entry::Tombstone))`: deleted here; older tables must not be consulted
    /// - `Ok(None)`: this table knows nothing about the key
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        let data = self.data.read();
        let offset = match data.index.get(key) {
            Some(&offset) => offset,
            None => return Ok(None),
        };

        let (value, tombstone) = data.arena.get(offset)?;
        Ok(Some(if tombstone {
            Entry::Tombstone
        } else {
            Entry::Value(value)
        }))
    }

    /// All live index entries in ascending key order
    pub fn sorted_entries(&self) -> Result<Vec<(Vec<u8>, Entry)>> {
        let data = self.data.read();
        let mut keys: Vec<&Vec<u8>> = data.index.keys().collect();
        keys.sort_unstable();

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let (value, tombstone) = data.arena.get(data.index[key])?;
            let entry = if tombstone {
                Entry::Tombstone
            } else {
                Entry::Value(value)
            };
            entries.push((key.clone(), entry));
        }
        Ok(entries)
    }

    /// Mark the table read-only; waits for any in-flight write to finish
    pub fn freeze(&self) {
        let _wal = self.wal.lock();
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Number of distinct keys (tombstones included)
    pub fn entry_count(&self) -> usize {
        self.data.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().index.is_empty()
    }

    /// Sequence number of the backing WAL
    pub fn wal_seq(&self) -> u64 {
        self.wal.lock().seq()
    }

    /// Whether the WAL can no longer take appends
    pub fn wal_poisoned(&self) -> bool {
        self.wal.lock().is_poisoned()
    }

    /// Release the WAL file handle
    pub fn close_wal(&self) -> Result<()> {
        self.wal.lock().close()
    }

    /// Delete the WAL file; call only after the contents are in an SSTable
    pub fn remove_wal(&self) -> Result<()> {
        self.wal.lock().remove()
    }
}
