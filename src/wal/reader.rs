//! WAL Reader
//!
//! Handles reading entries from the WAL file.
//!
//! A frame that is cut short at the end of the file (a torn write from a
//! crash) reads as end-of-log. A complete frame with a bad checksum is an
//! error.

use std::fs;
use std::path::Path;

use crate::error::{KvError, Result};
use crate::types::read_u32_le;

use super::entry::{WalEntry, HEADER_SIZE};

/// Outcome of decoding the frame at the current position
pub(crate) enum Frame {
    Entry(WalEntry),
    End,
    TornTail,
    Corrupt(String),
}

/// Reads entries from the WAL file
pub struct WalReader {
    data: Vec<u8>,
    position: usize,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(Self { data, position: 0 })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at end of log, including a partially written tail.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        match self.next_frame() {
            Frame::Entry(entry) => Ok(Some(entry)),
            Frame::End | Frame::TornTail => Ok(None),
            Frame::Corrupt(reason) => Err(KvError::WalCorruption(reason)),
        }
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    /// Byte offset just past the last frame successfully decoded
    pub fn position(&self) -> u64 {
        self.position as u64
    }

    /// Total bytes in the file when it was opened
    pub fn file_len(&self) -> u64 {
        self.data.len() as u64
    }

    pub(crate) fn next_frame(&mut self) -> Frame {
        let remaining = self.data.len() - self.position;
        if remaining == 0 {
            return Frame::End;
        }
        if remaining < HEADER_SIZE {
            return Frame::TornTail;
        }

        let header = &self.data[self.position..self.position + HEADER_SIZE];
        let len = match read_u32_le(header, 12, self.position as u64) {
            Ok(len) => len as usize,
            Err(e) => return Frame::Corrupt(e.to_string()),
        };
        if remaining - HEADER_SIZE < len {
            return Frame::TornTail;
        }

        let frame_end = self.position + HEADER_SIZE + len;
        match WalEntry::deserialize(&self.data[self.position..frame_end]) {
            Ok(entry) => {
                self.position = frame_end;
                Frame::Entry(entry)
            }
            Err(e) => Frame::Corrupt(format!("at byte {}: {}", self.position, e)),
        }
    }
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
