//! Configuration for lsmkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::arena::DEFAULT_ARENA_LIMIT;
use crate::error::{KvError, Result};

/// Main configuration for a store instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal/             (wal_{seq}.log files)
    ///     └── sstables/        (L{level}_{token}.sst files)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync the WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Size of the active memtable (in bytes) that triggers rotation
    pub memtable_size_limit: usize,

    /// Initial byte capacity reserved for each memtable arena
    pub arena_capacity: usize,

    /// How long a writer waits for a pending flush before giving up
    pub write_stall_timeout: Duration,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// A level is compacted once it holds more than this many SSTables
    pub compaction_threshold: usize,

    /// Number of levels; the last level is `max_levels - 1`
    pub max_levels: usize,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./lsmkv_data"),
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_size_limit: 4 * 1024 * 1024, // 4 MB
            arena_capacity: 64 * 1024,
            write_stall_timeout: Duration::from_secs(30),
            compaction_threshold: 4,
            max_levels: 4,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.memtable_size_limit == 0 {
            return Err(KvError::Config(
                "memtable_size_limit must be greater than zero".to_string(),
            ));
        }
        if self.memtable_size_limit > DEFAULT_ARENA_LIMIT {
            return Err(KvError::Config(format!(
                "memtable_size_limit must not exceed the arena limit of {} bytes, got {}",
                DEFAULT_ARENA_LIMIT, self.memtable_size_limit
            )));
        }
        if self.compaction_threshold == 0 {
            return Err(KvError::Config(
                "compaction_threshold must be greater than zero".to_string(),
            ));
        }
        if self.max_levels < 2 {
            return Err(KvError::Config(format!(
                "max_levels must be at least 2, got {}",
                self.max_levels
            )));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(KvError::Config(
                "EveryNEntries sync count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable rotation threshold (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the initial arena capacity (in bytes)
    pub fn arena_capacity(mut self, size: usize) -> Self {
        self.config.arena_capacity = size;
        self
    }

    /// Set the maximum back-pressure wait for writers
    pub fn write_stall_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_stall_timeout = timeout;
        self
    }

    /// Set the per-level table count that triggers compaction
    pub fn compaction_threshold(mut self, count: usize) -> Self {
        self.config.compaction_threshold = count;
        self
    }

    /// Set the number of levels
    pub fn max_levels(mut self, levels: usize) -> Self {
        self.config.max_levels = levels;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
