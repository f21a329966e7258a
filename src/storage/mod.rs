//! Storage Module
//!
//! Persistent storage layer: leveled SSTables.
//!
//! ## Responsibilities
//! - Persist memtables to disk in sorted format
//! - Point lookups across levels, newest table first
//! - Keep the in-memory table registry in sync with the directory
//! - Merge levels through compaction to bound read amplification
//!
//! ## Levels
//! ```text
//!   L0   [t9] [t8] [t7]        ← flushed memtables, newest first
//!   L1   [t6] [t3]             ← merged L0 batches
//!   L2   [t2]
//!   ...
//!   Ln   [t1]                  ← last level; tombstones can be purged here
//! ```
//! Every table at level L is newer than every table at level L+1, so a
//! lookup may stop at the first table that knows the key.

mod compaction;
mod manager;
mod merge;
mod sstable;

pub use compaction::{CompactionStats, Compactor};
pub use manager::StorageManager;
pub use merge::MergeIterator;
pub use sstable::{
    parse_table_name, table_file_name, SSTable, SSTableBuilder, SSTableIterator, SSTableReader,
};
