//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};
use crate::types::{read_u32_le, read_u64_le};

/// Frame header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing within one file
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl Operation {
    pub fn key(&self) -> &[u8] {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key } => key,
        }
    }
}

impl WalEntry {
    /// Create an entry stamped with the current wall-clock time
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Encode as a complete frame: `[lsn][crc][len][payload]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            KvError::Serialization(format!("WAL entry too large: {} bytes", payload.len()))
        })?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(&self.lsn.to_le_bytes());
        buf.extend_from_slice(&Self::compute_crc(&payload).to_le_bytes());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode one complete frame produced by [`WalEntry::serialize`]
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(KvError::WalCorruption(format!(
                "frame shorter than header: {} bytes",
                bytes.len()
            )));
        }

        let lsn = read_u64_le(bytes, 0, 0)?;
        let crc = read_u32_le(bytes, 8, 0)?;
        let len = read_u32_le(bytes, 12, 0)? as usize;

        let payload = bytes.get(HEADER_SIZE..HEADER_SIZE + len).ok_or_else(|| {
            KvError::WalCorruption(format!(
                "frame truncated: expected {} payload bytes, have {}",
                len,
                bytes.len() - HEADER_SIZE
            ))
        })?;

        if Self::compute_crc(payload) != crc {
            return Err(KvError::WalCorruption(format!(
                "CRC mismatch for entry lsn={}",
                lsn
            )));
        }

        let entry: WalEntry = bincode::deserialize(payload)?;
        if entry.lsn != lsn {
            return Err(KvError::WalCorruption(format!(
                "LSN mismatch: header {} payload {}",
                lsn, entry.lsn
            )));
        }
        Ok(entry)
    }

    pub fn compute_crc(payload: &[u8]) -> u32 {
        crc32fast::hash(payload)
    }
}
