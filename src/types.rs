//! Shared value types

/// What a table knows about a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

impl Entry {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Entry::Tombstone)
    }

    /// Collapse into the user-facing answer: tombstones read as absent
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            Entry::Value(v) => Some(v),
            Entry::Tombstone => None,
        }
    }
}

/// Read a little-endian u32 at `pos`, reporting truncation as corruption
pub(crate) fn read_u32_le(buf: &[u8], pos: usize, base: u64) -> crate::Result<u32> {
    buf.get(pos..pos + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| crate::KvError::corrupt(base + pos as u64, "truncated u32"))
}

/// Read a little-endian u64 at `pos`, reporting truncation as corruption
pub(crate) fn read_u64_le(buf: &[u8], pos: usize, base: u64) -> crate::Result<u64> {
    buf.get(pos..pos + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| crate::KvError::corrupt(base + pos as u64, "truncated u64"))
}
