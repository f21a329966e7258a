//! Compaction
//!
//! Merges every table of a level into one table at the next level.
//!
//! ## Policy
//! - A level is compacted once it holds more than `threshold` tables.
//! - Level L (L < last) merges into L+1. The last level merges into itself.
//! - Tombstones are dropped only when the output lands on the last level and
//!   nothing older can still hold the key: either the last level is merging
//!   all of its own tables, or it was empty before the merge.
//! - The output is written and registered before the inputs are
//!   unregistered and deleted. A failure leaves the inputs untouched.
//! - Inputs are deleted oldest first and deletion stops at the first error,
//!   so any table left behind is newer than every input already gone. A
//!   leftover only repeats what the output already holds for its keys.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;

use super::{MergeIterator, SSTableBuilder, SSTableReader, StorageManager};

/// Outcome of one level merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionStats {
    pub source_level: usize,
    pub target_level: usize,
    pub input_tables: usize,
    pub input_entries: u64,
    pub output_entries: u64,
    pub tombstones_purged: u64,
}

/// Runs level merges against a [`StorageManager`]
pub struct Compactor<'a> {
    storage: &'a StorageManager,
    threshold: usize,
    last_level: usize,
}

impl<'a> Compactor<'a> {
    pub fn new(storage: &'a StorageManager, threshold: usize, max_levels: usize) -> Self {
        Self {
            storage,
            threshold,
            last_level: max_levels.saturating_sub(1),
        }
    }

    /// Whether `level` holds more tables than the threshold allows
    pub fn needs_compaction(&self, level: usize) -> bool {
        self.storage.level_tables(level).len() > self.threshold
    }

    /// Check `start_level` and every deeper level, compacting where needed
    pub fn run(&self, start_level: usize) -> Result<Vec<CompactionStats>> {
        let mut done = Vec::new();
        for level in start_level..=self.last_level {
            if self.needs_compaction(level) {
                if let Some(stats) = self.compact_level(level)? {
                    done.push(stats);
                }
            }
        }
        Ok(done)
    }

    /// Push everything down to the last level, ignoring the threshold
    pub fn compact_all(&self) -> Result<Vec<CompactionStats>> {
        let mut done = Vec::new();
        for level in 0..self.last_level {
            if !self.storage.level_tables(level).is_empty() {
                if let Some(stats) = self.compact_level(level)? {
                    done.push(stats);
                }
            }
        }
        if self.storage.level_tables(self.last_level).len() > 1 {
            if let Some(stats) = self.compact_level(self.last_level)? {
                done.push(stats);
            }
        }
        Ok(done)
    }

    /// Merge every table currently at `level` into the next level
    pub fn compact_level(&self, level: usize) -> Result<Option<CompactionStats>> {
        let inputs = self.storage.level_tables(level);
        if inputs.is_empty() {
            return Ok(None);
        }

        let target_level = if level >= self.last_level {
            self.last_level
        } else {
            level + 1
        };
        let purge_tombstones = target_level == self.last_level
            && (level == self.last_level || self.storage.level_tables(target_level).is_empty());

        let input_entries: u64 = inputs.iter().map(|t| t.entry_count()).sum();
        let covered = inputs.iter().map(|t| t.covered_wal_seq()).max().unwrap_or(0);

        let path = self.storage.next_table_path(target_level);
        let mut builder = SSTableBuilder::with_capacity(&path, input_entries as usize)?;
        builder.set_covered_wal_seq(covered);

        // inputs are newest first, which is the order the merge expects
        let sources = inputs
            .iter()
            .map(|t| t.iter())
            .collect::<Result<Vec<_>>>()?;

        let mut tombstones_purged = 0;
        for item in MergeIterator::new(sources)? {
            let (key, entry) = item?;
            if purge_tombstones && entry.is_tombstone() {
                tombstones_purged += 1;
                continue;
            }
            builder.add_entry(&key, &entry)?;
        }

        let table = builder.finish()?;
        let reader = SSTableReader::open(&table.path)?;

        let removed: Vec<PathBuf> = inputs.iter().map(|t| t.path().to_path_buf()).collect();
        self.storage.replace_tables(&removed, vec![reader]);
        delete_inputs(&removed);

        let stats = CompactionStats {
            source_level: level,
            target_level,
            input_tables: inputs.len(),
            input_entries,
            output_entries: table.entry_count,
            tombstones_purged,
        };
        info!(
            from = level,
            to = target_level,
            inputs = stats.input_tables,
            input_entries,
            output_entries = stats.output_entries,
            tombstones_purged,
            "compaction finished"
        );
        Ok(Some(stats))
    }
}

/// Delete compacted inputs, given newest first, starting from the oldest
///
/// Stops at the first failure and returns how many files were removed. The
/// directory is synced after every removal so a crash cannot surface an older
/// input once a newer one is gone.
fn delete_inputs(paths: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in paths.iter().rev() {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    path = %path.display(),
                    error = %e,
                    remaining = paths.len() - removed,
                    "failed to delete compacted SSTable; keeping newer inputs"
                );
                return removed;
            }
        }
        sync_parent(path);
        removed += 1;
    }
    removed
}

fn sync_parent(path: &Path) {
    if let Some(dir) = path.parent() {
        if let Ok(dir) = File::open(dir) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_delete_inputs_removes_every_input() {
        let temp = TempDir::new().unwrap();
        // newest first, as the registry lists them
        let paths: Vec<PathBuf> = ["L0_3.sst", "L0_2.sst", "L0_1.sst"]
            .iter()
            .map(|name| temp.path().join(name))
            .collect();
        for path in &paths {
            fs::write(path, b"table").unwrap();
        }

        assert_eq!(delete_inputs(&paths), 3);
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[test]
    fn test_delete_inputs_stops_at_first_failure() {
        let temp = TempDir::new().unwrap();
        let newest = temp.path().join("L0_3.sst");
        let middle = temp.path().join("L0_2.sst");
        let oldest = temp.path().join("L0_1.sst");
        fs::write(&newest, b"table").unwrap();
        fs::write(&oldest, b"table").unwrap();
        // remove_file cannot delete a directory
        fs::create_dir(&middle).unwrap();
        fs::write(middle.join("pin"), b"x").unwrap();

        let removed = delete_inputs(&[newest.clone(), middle.clone(), oldest.clone()]);

        assert_eq!(removed, 1);
        assert!(!oldest.exists());
        assert!(middle.exists());
        // Only inputs newer than everything deleted may survive
        assert!(newest.exists());
    }

    #[test]
    fn test_delete_inputs_tolerates_missing_files() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("L1_2.sst");
        let missing = temp.path().join("L1_1.sst");
        fs::write(&present, b"table").unwrap();

        assert_eq!(delete_inputs(&[present.clone(), missing]), 2);
        assert!(!present.exists());
    }
}
