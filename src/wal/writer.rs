//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::warn;

use crate::config::WalSyncStrategy;
use crate::error::{KvError, Result};

use super::{Operation, WalEntry, WalReader};

/// Writes entries to the WAL file
///
/// An append either lands whole or not at all: when a write, flush or fsync
/// fails, the unwritten bytes are discarded and the file is cut back to the
/// end of the last good entry. If even that fails the writer is poisoned and
/// refuses further work.
pub struct WalWriter {
    /// `None` once poisoned
    writer: Option<BufWriter<File>>,
    /// File length after the last successful append
    committed_len: u64,
    /// LSN the next append will receive
    current_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries written since the last fsync
    uncommitted: usize,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// An existing file is appended to; LSNs continue after its last valid
    /// entry.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let mut last_lsn = 0;
        if path.exists() {
            let mut reader = WalReader::open(path)?;
            while let Ok(Some(entry)) = reader.next_entry() {
                last_lsn = entry.lsn;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Self::from_file(file, sync_strategy, last_lsn + 1)
    }

    /// Wrap an already opened file; appends go to its end
    pub(crate) fn from_file(
        file: File,
        sync_strategy: WalSyncStrategy,
        next_lsn: u64,
    ) -> Result<Self> {
        let committed_len = file.metadata()?.len();
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            committed_len,
            current_lsn: next_lsn,
            sync_strategy,
            uncommitted: 0,
        })
    }

    /// Append an operation, returning the LSN it was assigned
    ///
    /// The entry is handed to the OS before returning; it is fsynced according
    /// to the sync strategy. On error nothing of the entry remains in the file.
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        let lsn = self.current_lsn;
        let bytes = WalEntry::new(lsn, operation).serialize()?;
        let should_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted + 1 >= count,
        };

        let written = match self.writer.as_mut() {
            Some(writer) => write_frame(writer, &bytes, should_sync),
            None => return Err(poisoned()),
        };
        if let Err(e) = written {
            self.rollback();
            return Err(e.into());
        }

        self.committed_len += bytes.len() as u64;
        self.current_lsn += 1;
        if should_sync {
            self.uncommitted = 0;
        } else {
            self.uncommitted += 1;
        }

        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(poisoned)?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Get the LSN the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    /// Entries appended since the last fsync
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    /// Whether a failed append could not be undone
    pub fn is_poisoned(&self) -> bool {
        self.writer.is_none()
    }

    /// Drop buffered bytes and cut the file back to the last good entry
    fn rollback(&mut self) {
        if let Some(writer) = self.writer.take() {
            let (file, _unwritten) = writer.into_parts();
            match file.set_len(self.committed_len) {
                Ok(()) => self.writer = Some(BufWriter::new(file)),
                Err(e) => {
                    warn!(error = %e, len = self.committed_len, "failed to roll back WAL tail");
                }
            }
        }
    }
}

fn write_frame(writer: &mut BufWriter<File>, bytes: &[u8], sync: bool) -> io::Result<()> {
    writer.write_all(bytes)?;
    writer.flush()?;
    if sync {
        writer.get_ref().sync_data()?;
    }
    Ok(())
}

fn poisoned() -> KvError {
    KvError::Storage("WAL writer unusable after an earlier write failure".to_string())
}
