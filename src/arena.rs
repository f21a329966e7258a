//! Arena Module
//!
//! Append-only byte buffer holding the serialized records of one memtable.
//!
//! ## Record Format
//! ```text
//! ┌───────────┬─────────────┬─────────────┬─────┬───────┬───────────┐
//! │ Flags (1) │ KeyLen (4)  │ ValLen (4)  │ Key │ Value │ CRC32 (4) │
//! └───────────┴─────────────┴─────────────┴─────┴───────┴───────────┘
//! ```
//!
//! `put` returns the byte offset of the record. Offsets are plain integers
//! that stay valid for the life of the arena; nothing is ever overwritten or
//! freed individually, the whole arena is dropped with its memtable.
//!
//! The arena does no locking. The owning memtable serializes writers.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{KvError, Result};

/// Flags(1) + KeyLen(4) + ValLen(4)
pub const RECORD_HEADER_SIZE: usize = 9;

/// Trailing CRC32
pub const RECORD_TRAILER_SIZE: usize = 4;

const FLAG_TOMBSTONE: u8 = 0x01;

/// Hard ceiling when no explicit limit is given (1 GiB)
pub const DEFAULT_ARENA_LIMIT: usize = 1 << 30;

/// Append-only record buffer addressed by offset
#[derive(Debug)]
pub struct Arena {
    buf: BytesMut,
    limit: usize,
}

impl Arena {
    /// Create an arena with `capacity` bytes reserved up front
    pub fn new(capacity: usize) -> Self {
        Self::with_limit(capacity, DEFAULT_ARENA_LIMIT)
    }

    /// Create an arena that refuses to grow past `limit` bytes
    pub fn with_limit(capacity: usize, limit: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity.min(limit)),
            limit,
        }
    }

    /// Size in bytes of the frame `put` would write for this key/value
    pub fn record_size(key: &[u8], value: &[u8]) -> usize {
        RECORD_HEADER_SIZE + key.len() + value.len() + RECORD_TRAILER_SIZE
    }

    /// Append a record and return its starting offset
    ///
    /// Tombstones keep whatever value bytes they are given; readers ignore them.
    pub fn put(&mut self, key: &[u8], value: &[u8], tombstone: bool) -> Result<usize> {
        let key_len = u32::try_from(key.len())
            .map_err(|_| KvError::Storage(format!("key too large: {} bytes", key.len())))?;
        let val_len = u32::try_from(value.len())
            .map_err(|_| KvError::Storage(format!("value too large: {} bytes", value.len())))?;

        let size = Self::record_size(key, value);
        let remaining = self.limit.saturating_sub(self.buf.len());
        if size > remaining {
            return Err(KvError::ArenaFull {
                requested: size,
                remaining,
            });
        }

        let offset = self.buf.len();
        self.buf.reserve(size);

        let flags = if tombstone { FLAG_TOMBSTONE } else { 0 };
        self.buf.put_u8(flags);
        self.buf.put_u32_le(key_len);
        self.buf.put_u32_le(val_len);
        self.buf.put_slice(key);
        self.buf.put_slice(value);

        let crc = crc32fast::hash(&self.buf[offset..]);
        self.buf.put_u32_le(crc);

        Ok(offset)
    }

    /// Decode the record at `offset`, returning `(value, is_tombstone)`
    pub fn get(&self, offset: usize) -> Result<(Vec<u8>, bool)> {
        let (_, value, tombstone) = self.decode(offset)?;
        Ok((value.to_vec(), tombstone))
    }

    /// Decode the record at `offset`, returning its key as well
    pub fn get_record(&self, offset: usize) -> Result<(Vec<u8>, Vec<u8>, bool)> {
        let (key, value, tombstone) = self.decode(offset)?;
        Ok((key.to_vec(), value.to_vec(), tombstone))
    }

    fn decode(&self, offset: usize) -> Result<(&[u8], &[u8], bool)> {
        let base = offset as u64;
        if offset >= self.buf.len() {
            return Err(KvError::corrupt(
                base,
                format!("offset out of range (arena holds {} bytes)", self.buf.len()),
            ));
        }

        let mut cursor = &self.buf[offset..];
        if cursor.remaining() < RECORD_HEADER_SIZE {
            return Err(KvError::corrupt(base, "truncated record header"));
        }
        let flags = cursor.get_u8();
        let key_len = cursor.get_u32_le() as usize;
        let val_len = cursor.get_u32_le() as usize;

        let body = key_len + val_len;
        if cursor.remaining() < body + RECORD_TRAILER_SIZE {
            return Err(KvError::corrupt(base, "record extends past end of arena"));
        }

        let frame_end = offset + RECORD_HEADER_SIZE + body;
        let stored_crc = (&self.buf[frame_end..frame_end + RECORD_TRAILER_SIZE]).get_u32_le();
        if crc32fast::hash(&self.buf[offset..frame_end]) != stored_crc {
            return Err(KvError::corrupt(base, "checksum mismatch"));
        }

        let key_start = offset + RECORD_HEADER_SIZE;
        let key = &self.buf[key_start..key_start + key_len];
        let value = &self.buf[key_start + key_len..frame_end];

        Ok((key, value, flags & FLAG_TOMBSTONE != 0))
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes currently allocated for the buffer
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Maximum size this arena will grow to
    pub fn limit(&self) -> usize {
        self.limit
    }
}
