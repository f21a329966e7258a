//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Log every mutation to the table's own WAL before applying it
//! - Store records in an append-only arena, indexed by key → offset
//! - Track size for rotation triggers
//! - Produce sorted entries for SSTable creation
//!
//! ## Data Structure Choice
//! A `HashMap<key, offset>` over an [`Arena`](crate::arena::Arena):
//! - Only the latest offset per key is kept; overwritten records stay in
//!   the arena until the whole table is dropped
//! - Keys are sorted once, at flush time
//! - Handles are plain integers, so the index has no lifetime ties to the
//!   arena buffer

mod table;

pub use table::MemTable;
