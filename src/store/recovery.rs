//! Crash recovery
//!
//! WAL files whose sequence is covered by an existing SSTable are leftovers
//! from a flush that could not delete them, and are removed. Every other WAL
//! is replayed, oldest first, into its own memtable, flushed to level 0 and
//! then removed.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::memtable::MemTable;
use crate::storage::StorageManager;
use crate::wal::{list_wal_files, Wal};

use super::worker::write_level0;

/// Replay un-flushed WALs and return the sequence for the new active WAL
pub(super) fn replay_wals(config: &Config, wal_dir: &Path, storage: &StorageManager) -> Result<u64> {
    let covered = storage.covered_wal_seq();
    let seqs = list_wal_files(wal_dir)?;
    let mut replayed = 0;

    for &seq in &seqs {
        if seq <= covered {
            debug!(seq, covered, "removing obsolete WAL");
            fs::remove_file(Wal::path_for(wal_dir, seq))?;
            continue;
        }

        let (wal, entries) = Wal::open_and_replay(wal_dir, seq, config.wal_sync_strategy)?;
        let memtable = MemTable::new(wal, config.arena_capacity);
        memtable.replay(&entries)?;

        if !memtable.is_empty() {
            write_level0(storage, &memtable)?;
            replayed += 1;
        }
        memtable.remove_wal()?;
    }

    if replayed > 0 {
        info!(tables = replayed, "recovered un-flushed WAL files");
    }

    let last_seen = seqs.last().copied().unwrap_or(0);
    Ok(last_seen.max(covered) + 1)
}
