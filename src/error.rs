//! Error types for lsmkv
//!
//! Provides a unified error type for all engine operations.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for lsmkv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Record / Storage Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    #[error("Arena full: {requested} bytes requested, {remaining} bytes remaining")]
    ArenaFull { requested: usize, remaining: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Coordination Errors
    // -------------------------------------------------------------------------
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Write stalled: {0}")]
    WriteStall(String),

    #[error("Store is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        KvError::CorruptRecord {
            offset,
            reason: reason.into(),
        }
    }

    /// `true` for outcomes that represent absence rather than failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::KeyNotFound)
    }
}

impl From<bincode::Error> for KvError {
    fn from(e: bincode::Error) -> Self {
        KvError::Serialization(e.to_string())
    }
}
