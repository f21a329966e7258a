//! Background flush/compaction worker
//!
//! Waits on the coalescing flush signal. Each wakeup flushes the frozen
//! memtable (if any) into a level-0 SSTable, retires its WAL and then checks
//! whether level 0 and deeper levels need compaction. A failed flush leaves
//! the frozen memtable and its WAL in place; the next signal retries.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::memtable::MemTable;
use crate::storage::{SSTable, SSTableBuilder, SSTableReader, StorageManager};

use super::StoreInner;

/// Handle to the running worker thread
pub(crate) struct FlushWorker {
    handle: JoinHandle<()>,
    shutdown_tx: Sender<()>,
}

impl FlushWorker {
    pub(crate) fn spawn(inner: Arc<StoreInner>, flush_rx: Receiver<()>) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("lsmkv-flush".to_string())
            .spawn(move || run(inner, flush_rx, shutdown_rx))?;

        Ok(Self {
            handle,
            shutdown_tx,
        })
    }

    /// Ask the worker to exit and wait for it
    pub(crate) fn stop(self) {
        let _ = self.shutdown_tx.try_send(());
        if self.handle.join().is_err() {
            error!("flush worker panicked");
        }
    }
}

fn run(inner: Arc<StoreInner>, flush_rx: Receiver<()>, shutdown_rx: Receiver<()>) {
    debug!("flush worker started");
    loop {
        select! {
            recv(flush_rx) -> msg => match msg {
                Ok(()) => inner.flush_cycle(),
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => break,
        }
    }
    debug!("flush worker stopped");
}

impl StoreInner {
    /// One worker wakeup: flush, then compact on success
    fn flush_cycle(&self) {
        match self.flush_frozen() {
            Ok(Some(_)) => self.compact_quietly(0),
            Ok(None) => debug!("flush signal with nothing to flush"),
            Err(e) => error!(error = %e, "flush failed; frozen memtable kept for retry"),
        }
    }

    /// Persist the frozen memtable, if any, as a level-0 SSTable
    ///
    /// Order matters: the table is written, synced and registered before the
    /// WAL is removed and before the frozen pointer is cleared, so every key
    /// stays readable and durable throughout.
    pub(super) fn flush_frozen(&self) -> Result<Option<SSTable>> {
        let _maintenance = self.maintenance.lock();

        let frozen = match self.state.lock().frozen.clone() {
            Some(frozen) => frozen,
            None => return Ok(None),
        };

        let table = if frozen.is_empty() {
            None
        } else {
            Some(write_level0(&self.storage, &frozen)?)
        };

        if let Err(e) = frozen.remove_wal() {
            // The table records the covered WAL sequence, so recovery treats
            // a leftover file as obsolete.
            warn!(seq = frozen.wal_seq(), error = %e, "failed to remove flushed WAL");
        }

        self.state.lock().frozen = None;
        self.flush_done.notify_all();

        if let Err(e) = self.storage.refresh() {
            warn!(error = %e, "failed to refresh SSTable registry after flush");
        }

        Ok(table)
    }
}

/// Write a memtable's sorted contents to a new level-0 table and register it
pub(super) fn write_level0(storage: &StorageManager, memtable: &MemTable) -> Result<SSTable> {
    let entries = memtable.sorted_entries()?;
    let path = storage.next_table_path(0);

    let mut builder = SSTableBuilder::with_capacity(&path, entries.len())?;
    builder.set_covered_wal_seq(memtable.wal_seq());
    for (key, entry) in &entries {
        builder.add_entry(key, entry)?;
    }
    let table = builder.finish()?;

    storage.add_table(SSTableReader::open(&table.path)?);

    info!(
        path = %table.path.display(),
        entries = table.entry_count,
        bytes = table.file_size,
        wal_seq = table.covered_wal_seq,
        "flushed memtable to level 0"
    );
    Ok(table)
}
