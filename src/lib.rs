//! # lsmkv
//!
//! An embedded, single-node LSM key-value storage engine with:
//! - Arena-backed memtables indexed by record offset
//! - One Write-Ahead Log (WAL) per memtable for durability
//! - Background flush of frozen memtables to sorted SSTables
//! - Leveled compaction with tombstone purging at the last level
//! - Crash recovery by WAL replay
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Store  (put / get / delete)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐  rotate   ┌─────────────┐
//!   │   Active    │ ────────► │   Frozen    │
//!   │ Arena + WAL │           │ Arena + WAL │
//!   └─────────────┘           └──────┬──────┘
//!                                    │ flush worker
//!                                    ▼
//!                           ┌─────────────────┐
//!                           │ L0 … Ln SSTables│ ◄── compaction
//!                           └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use lsmkv::{Config, Store};
//!
//! let store = Store::open(Config::builder().data_dir("/tmp/lsmkv").build())?;
//! store.put(b"a", b"1")?;
//! assert_eq!(store.get(b"a")?, Some(b"1".to_vec()));
//! store.delete(b"a")?;
//! assert_eq!(store.get(b"a")?, None);
//! store.close()?;
//! # Ok::<(), lsmkv::KvError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod types;

pub mod arena;
pub mod memtable;
pub mod storage;
pub mod store;
pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, WalSyncStrategy};
pub use error::{KvError, Result};
pub use store::Store;
pub use types::Entry;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of lsmkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
