//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted key-value storage.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (22 bytes)                                       │
//! │   Magic: "LSKV" (4) | Version: u16 (2) | Count: u64 (8) │
//! │   CoveredWalSeq: u64 (8)                                │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]                │
//! │   ... repeated for each entry ...                       │
//! │   (ValLen = u32::MAX means tombstone, no value bytes)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block (variable)                                  │
//! │   [KeyLen: u32][Offset: u64][Key]                       │
//! │   ... repeated for each entry ...                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                       │
//! │   IndexOffset: u64 (8) | DataCRC: u32 (4) | Padding (4) │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! `CoveredWalSeq` is the highest WAL sequence whose contents are fully
//! captured by this table (or, after compaction, by its inputs). Recovery
//! skips WAL files at or below the highest covered sequence.
//!
//! Files are named `L{level}_{token}.sst`; within a level a larger token is
//! a newer table.

mod builder;
mod iterator;
mod reader;

use std::path::{Path, PathBuf};

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic bytes identifying an lsmkv SSTable file
pub(crate) const MAGIC: &[u8; 4] = b"LSKV";

/// Current SSTable format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + EntryCount (8) + CoveredWalSeq (8)
pub(crate) const HEADER_SIZE: u64 = 22;

/// Footer size: IndexOffset (8) + DataCRC (4) + Padding (4) = 16 bytes
pub(crate) const FOOTER_SIZE: u64 = 16;

/// Sentinel value indicating a tombstone (deleted key)
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

/// Extension of finished tables
pub const SSTABLE_EXTENSION: &str = "sst";

/// Extension of tables still being written
pub const TEMP_EXTENSION: &str = "tmp";

// =============================================================================
// File Naming
// =============================================================================

/// "L{level}_{token:020}.sst"
pub fn table_file_name(level: usize, token: u64) -> String {
    format!("L{}_{:020}.{}", level, token, SSTABLE_EXTENSION)
}

/// Parse `(level, token)` from a table path
/// "L1_00000001700000000000.sst" → Some((1, 1700000000000))
pub fn parse_table_name(path: &Path) -> Option<(usize, u64)> {
    if path.extension()?.to_str()? != SSTABLE_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (level, token) = stem.strip_prefix('L')?.split_once('_')?;
    Some((level.parse().ok()?, token.parse().ok()?))
}

// =============================================================================
// SSTable Metadata
// =============================================================================

/// Metadata describing a finished SSTable, returned by the builder
#[derive(Debug, Clone)]
pub struct SSTable {
    /// Path to the SSTable file
    pub path: PathBuf,
    /// Number of entries in this SSTable
    pub entry_count: u64,
    /// Smallest key (for range filtering)
    pub min_key: Vec<u8>,
    /// Largest key (for range filtering)
    pub max_key: Vec<u8>,
    /// File size in bytes
    pub file_size: u64,
    /// Highest WAL sequence captured by this table
    pub covered_wal_seq: u64,
}

impl SSTable {
    /// Get the number of entries
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false if key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.entry_count > 0 && key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }
}
