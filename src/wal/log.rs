//! Sequence-numbered WAL files
//!
//! Each memtable owns exactly one WAL file, `wal_{seq:06}.log`. The file is
//! removed once the memtable's contents are durable in an SSTable.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::WalSyncStrategy;
use crate::error::{KvError, Result};

use super::{Operation, WalEntry, WalRecovery, WalWriter};

const WAL_PREFIX: &str = "wal_";
const WAL_EXTENSION: &str = "log";

/// The write-ahead log backing one memtable
pub struct Wal {
    seq: u64,
    path: PathBuf,
    /// `None` once closed or removed
    writer: Option<WalWriter>,
}

impl Wal {
    /// Open (creating if absent) the WAL for `seq` inside `dir`
    pub fn open(dir: &Path, seq: u64, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let path = Self::path_for(dir, seq);
        let writer = WalWriter::open(&path, sync_strategy)?;
        debug!(seq, path = %path.display(), "opened WAL");
        Ok(Self::with_writer(path, seq, writer))
    }

    pub(crate) fn with_writer(path: PathBuf, seq: u64, writer: WalWriter) -> Self {
        Self {
            seq,
            path,
            writer: Some(writer),
        }
    }

    /// Open the WAL for `seq`, first replaying whatever it already holds
    ///
    /// A torn tail left by a crash is truncated before the file is reopened
    /// for appending.
    pub fn open_and_replay(
        dir: &Path,
        seq: u64,
        sync_strategy: WalSyncStrategy,
    ) -> Result<(Self, Vec<WalEntry>)> {
        let path = Self::path_for(dir, seq);
        let entries = if path.exists() {
            let (entries, result) = WalRecovery::recover(&path)?;
            if result.entries_recovered > 0 || result.entries_corrupted > 0 {
                info!(
                    seq,
                    recovered = result.entries_recovered,
                    corrupted = result.entries_corrupted,
                    last_lsn = result.last_lsn,
                    truncated = result.was_truncated,
                    "replayed WAL"
                );
            }
            entries
        } else {
            Vec::new()
        };

        let wal = Self::open(dir, seq, sync_strategy)?;
        Ok((wal, entries))
    }

    /// Durably append one operation
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        match self.writer.as_mut() {
            Some(writer) => writer.append(operation),
            None => Err(KvError::Storage(format!("WAL {} is closed", self.seq))),
        }
    }

    /// Force buffered entries to disk
    pub fn sync(&mut self) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.sync(),
            None => Ok(()),
        }
    }

    /// Sync and release the file handle; later calls are no-ops
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            if !writer.is_poisoned() {
                writer.sync()?;
            }
        }
        Ok(())
    }

    /// Delete the WAL file
    ///
    /// Only valid once every entry is durable elsewhere.
    pub fn remove(&mut self) -> Result<()> {
        self.writer = None;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(seq = self.seq, "removed WAL");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Whether a failed append left the file in a state it could not undo
    pub fn is_poisoned(&self) -> bool {
        self.writer.as_ref().map_or(false, WalWriter::is_poisoned)
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name for a sequence number
    pub fn file_name(seq: u64) -> String {
        format!("{}{:06}.{}", WAL_PREFIX, seq, WAL_EXTENSION)
    }

    /// Full path for a sequence number inside `dir`
    pub fn path_for(dir: &Path, seq: u64) -> PathBuf {
        dir.join(Self::file_name(seq))
    }

    /// Parse the sequence number from a WAL path
    /// "wal_000042.log" → Some(42)
    pub fn parse_seq(path: &Path) -> Option<u64> {
        if path.extension()?.to_str()? != WAL_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        stem.strip_prefix(WAL_PREFIX)?.parse().ok()
    }
}

/// Sequence numbers of every WAL file in `dir`, ascending
pub fn list_wal_files(dir: &Path) -> Result<Vec<u64>> {
    let mut seqs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            if let Some(seq) = Wal::parse_seq(&path) {
                seqs.push(seq);
            }
        }
    }
    seqs.sort_unstable();
    Ok(seqs)
}
