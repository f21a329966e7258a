//! Storage Manager
//!
//! Manages the registry of live SSTables, grouped by level.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup (and on `refresh`)
//! - Search levels ascending, tables newest → oldest within a level
//! - Hand out collision-free paths for new tables
//! - Swap compaction inputs for outputs atomically

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::Entry;

use super::sstable::{parse_table_name, table_file_name, TEMP_EXTENSION};
use super::SSTableReader;

/// Manages the storage layer
///
/// ## Concurrency:
/// - `levels`: Protected by RwLock (many concurrent readers, exclusive writer)
/// - `last_token`: Atomic counter (lock-free)
/// - All methods use `&self`
pub struct StorageManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    /// Open SSTable readers per level, each level ordered newest → oldest
    levels: RwLock<Vec<Vec<Arc<SSTableReader>>>>,

    /// Highest token handed out or seen on disk
    last_token: AtomicU64,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Remove temporary files left by interrupted builds
    /// 3. Discover existing SSTable files and open readers for each
    pub fn open(path: &Path, max_levels: usize) -> Result<Self> {
        fs::create_dir_all(path)?;

        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            let is_tmp = file_path
                .extension()
                .map_or(false, |ext| ext == TEMP_EXTENSION);
            if is_tmp && file_path.is_file() {
                warn!(path = %file_path.display(), "removing incomplete SSTable");
                fs::remove_file(&file_path)?;
            }
        }

        let manager = Self {
            data_dir: path.to_path_buf(),
            levels: RwLock::new(vec![Vec::new(); max_levels]),
            last_token: AtomicU64::new(0),
        };
        manager.refresh()?;
        Ok(manager)
    }

    /// Rebuild the registry from the directory listing
    ///
    /// Readers for files that are already open are reused.
    pub fn refresh(&self) -> Result<()> {
        let mut found: Vec<(usize, u64, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let file_path = entry?.path();
            if !file_path.is_file() {
                continue;
            }
            if let Some((level, token)) = parse_table_name(&file_path) {
                found.push((level, token, file_path));
            }
        }

        let mut open: HashMap<PathBuf, Arc<SSTableReader>> = self
            .levels
            .read()
            .iter()
            .flatten()
            .map(|r| (r.path().to_path_buf(), Arc::clone(r)))
            .collect();

        let level_count = self.levels.read().len();
        let max_level = found.iter().map(|(l, _, _)| *l + 1).max().unwrap_or(0);
        let mut levels: Vec<Vec<Arc<SSTableReader>>> =
            vec![Vec::new(); level_count.max(max_level)];

        for (level, token, file_path) in found {
            let reader = match open.remove(&file_path) {
                Some(reader) => reader,
                None => Arc::new(SSTableReader::open(&file_path)?),
            };
            self.last_token.fetch_max(token, Ordering::SeqCst);
            levels[level].push(reader);
        }
        for level in &mut levels {
            level.sort_by(|a, b| b.token().cmp(&a.token()));
        }

        debug!(
            tables = levels.iter().map(Vec::len).sum::<usize>(),
            "refreshed SSTable registry"
        );
        *self.levels.write() = levels;
        Ok(())
    }

    /// Get a value by key
    ///
    /// Returns:
    /// - `Ok(Some(Entry::Value))`: newest entry is a value
    /// - `Ok(Some(Entry::Tombstone))`: newest entry is a deletion
    /// - `Ok(None)`: no table knows the key
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        let levels = self.levels.read();

        for reader in levels.iter().flatten() {
            // Skip SSTable if key is outside its range (O(1) check)
            if !reader.might_contain(key) {
                continue;
            }
            if let Some(entry) = reader.get(key)? {
                return Ok(Some(entry));
            }
        }

        Ok(None)
    }

    /// Path for a new table at `level`, with a token newer than any seen
    pub fn next_table_path(&self, level: usize) -> PathBuf {
        self.data_dir.join(table_file_name(level, self.next_token()))
    }

    /// Nanosecond timestamp, bumped so tokens strictly increase
    fn next_token(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let mut last = self.last_token.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .last_token
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// Register a freshly written table
    pub fn add_table(&self, reader: SSTableReader) -> Arc<SSTableReader> {
        let reader = Arc::new(reader);
        let mut levels = self.levels.write();
        Self::insert(&mut levels, Arc::clone(&reader));
        reader
    }

    /// Atomically unregister `removed` and register `added`
    ///
    /// Files are not deleted here.
    pub fn replace_tables(&self, removed: &[PathBuf], added: Vec<SSTableReader>) {
        let mut levels = self.levels.write();
        for level in levels.iter_mut() {
            level.retain(|r| !removed.iter().any(|p| p == r.path()));
        }
        for reader in added {
            Self::insert(&mut levels, Arc::new(reader));
        }
    }

    fn insert(levels: &mut Vec<Vec<Arc<SSTableReader>>>, reader: Arc<SSTableReader>) {
        let level = reader.level();
        if levels.len() <= level {
            levels.resize(level + 1, Vec::new());
        }
        let tables = &mut levels[level];
        let pos = tables
            .iter()
            .position(|t| t.token() < reader.token())
            .unwrap_or(tables.len());
        tables.insert(pos, reader);
    }

    /// Tables at `level`, newest first
    pub fn level_tables(&self, level: usize) -> Vec<Arc<SSTableReader>> {
        self.levels
            .read()
            .get(level)
            .cloned()
            .unwrap_or_default()
    }

    /// Table count per level
    pub fn level_counts(&self) -> Vec<usize> {
        self.levels.read().iter().map(Vec::len).collect()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.levels.read().iter().map(Vec::len).sum()
    }

    /// Highest WAL sequence captured by any live table
    pub fn covered_wal_seq(&self) -> u64 {
        self.levels
            .read()
            .iter()
            .flatten()
            .map(|r| r.covered_wal_seq())
            .max()
            .unwrap_or(0)
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
