//! Store Module
//!
//! The engine coordinator: owns the active and frozen memtables, the WAL
//! sequence counter and the SSTable registry, and drives the background
//! flush/compaction worker.
//!
//! ## Write path
//! ```text
//! put/delete ─► write_lock ─► [active full?] ─► rotate ─► signal worker
//!                    │                              │
//!                    ▼                              ▼
//!             active.put (WAL, then arena + index)  frozen ← active
//! ```
//!
//! ## Read path
//! active → frozen → L0 (newest first) → L1 → … ; the first table that
//! knows the key answers, and a tombstone answers "not found".

mod recovery;
mod worker;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::memtable::MemTable;
use crate::storage::{CompactionStats, Compactor, StorageManager};
use crate::types::Entry;
use crate::wal::Wal;

use worker::FlushWorker;

/// Longest single condvar wait while applying back-pressure
const STALL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Pointers swapped by rotation and flush
struct StoreState {
    /// Always writable
    active: Arc<MemTable>,
    /// Read-only, waiting to be flushed
    frozen: Option<Arc<MemTable>>,
    /// Sequence of the active memtable's WAL; never reused
    wal_seq: u64,
}

/// Shared between the `Store` handle and the background worker
pub(crate) struct StoreInner {
    config: Config,
    wal_dir: PathBuf,
    sstable_dir: PathBuf,

    /// Pointer swaps only; never held across flush or compaction I/O
    state: Mutex<StoreState>,
    /// Notified whenever the frozen memtable is cleared
    flush_done: Condvar,

    /// Serializes put/delete/rotation
    write_lock: Mutex<()>,
    /// Serializes flush and compaction work
    maintenance: Mutex<()>,

    storage: StorageManager,

    /// Capacity-1 coalescing signal to the worker
    flush_tx: Sender<()>,
    closed: AtomicBool,
}

/// An embedded LSM key-value store
///
/// ## Concurrency Model
///
/// - **Writes** (put/delete/flush): Serialized by `write_lock`. A write that
///   finds the active memtable full rotates it first; if the previous frozen
///   memtable has not been flushed yet the writer waits (back-pressure) and
///   eventually fails with `WriteStall` rather than dropping data.
/// - **Reads** (get): Snapshot the memtable pointers under the state mutex,
///   then search without holding it.
/// - **Background**: One worker thread flushes the frozen memtable and runs
///   compaction when signalled.
pub struct Store {
    inner: Arc<StoreInner>,
    worker: Mutex<Option<FlushWorker>>,
}

impl Store {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_DIR: &'static str = "wal";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Create the data, WAL and SSTable directories
    /// 2. Load existing SSTables
    /// 3. Replay un-flushed WAL files into level-0 tables
    /// 4. Start a fresh active memtable and the background worker
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let wal_dir = config.data_dir.join(Self::WAL_DIR);
        let sstable_dir = config.data_dir.join(Self::SSTABLE_DIR);
        fs::create_dir_all(&wal_dir)?;
        fs::create_dir_all(&sstable_dir)?;

        let storage = StorageManager::open(&sstable_dir, config.max_levels)?;
        let wal_seq = recovery::replay_wals(&config, &wal_dir, &storage)?;

        let wal = Wal::open(&wal_dir, wal_seq, config.wal_sync_strategy)?;
        let active = Arc::new(MemTable::new(wal, config.arena_capacity));

        let (flush_tx, flush_rx) = channel::bounded(1);

        let inner = Arc::new(StoreInner {
            config,
            wal_dir,
            sstable_dir,
            state: Mutex::new(StoreState {
                active,
                frozen: None,
                wal_seq,
            }),
            flush_done: Condvar::new(),
            write_lock: Mutex::new(()),
            maintenance: Mutex::new(()),
            storage,
            flush_tx,
            closed: AtomicBool::new(false),
        });

        // Recovery may have produced enough level-0 tables to compact
        inner.compact_quietly(0);

        let worker = FlushWorker::spawn(Arc::clone(&inner), flush_rx)?;

        info!(
            data_dir = %inner.config.data_dir.display(),
            wal_seq,
            sstables = inner.storage.sstable_count(),
            "store opened"
        );

        Ok(Self {
            inner,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Get a value by key
    ///
    /// Returns `Ok(None)` when the key was never written or its newest
    /// version is a tombstone.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.check_open()?;

        let (active, frozen) = {
            let state = self.inner.state.lock();
            (Arc::clone(&state.active), state.frozen.clone())
        };

        if let Some(entry) = active.get(key)? {
            return Ok(entry.into_value());
        }
        if let Some(frozen) = frozen {
            if let Some(entry) = frozen.get(key)? {
                return Ok(entry.into_value());
            }
        }

        Ok(self.inner.storage.get(key)?.and_then(Entry::into_value))
    }

    /// Put a key-value pair
    ///
    /// Returns once the record is in the WAL (synced per the configured
    /// strategy) and visible to readers.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.check_open()?;
        let _write_guard = self.inner.write_lock.lock();

        let active = self.inner.writable_memtable()?;
        active.put(key, value)?;
        Ok(())
    }

    /// Delete a key by writing a tombstone
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.check_open()?;
        let _write_guard = self.inner.write_lock.lock();

        let active = self.inner.writable_memtable()?;
        active.delete(key)?;
        Ok(())
    }

    /// Persist everything written so far into level-0 SSTables
    ///
    /// Flushes a pending frozen memtable, rotates the active one if it holds
    /// anything, and flushes that too, all on the calling thread.
    pub fn flush(&self) -> Result<()> {
        self.inner.check_open()?;
        self.inner.flush_all()?;
        self.inner.compact_quietly(0);
        Ok(())
    }

    /// Block until no frozen memtable is waiting to be flushed
    ///
    /// Gives up with `WriteStall` after the configured stall timeout.
    pub fn wait_for_flush(&self) -> Result<()> {
        self.inner.wait_for_frozen_cleared()
    }

    /// Merge every level down to the last one, purging tombstones there
    pub fn compact(&self) -> Result<Vec<CompactionStats>> {
        self.inner.check_open()?;
        let _maintenance = self.inner.maintenance.lock();
        self.inner.compactor().compact_all()
    }

    /// Close the store gracefully
    ///
    /// Stops the worker, flushes all in-memory data and syncs the WAL.
    /// Later operations fail with `Closed`.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.stop_worker();

        self.inner.flush_all()?;
        self.inner.state.lock().active.close_wal()?;

        info!(data_dir = %self.inner.config.data_dir.display(), "store closed");
        Ok(())
    }

    fn stop_worker(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.stop();
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.inner.config.data_dir
    }

    /// Directory holding the WAL files
    pub fn wal_dir(&self) -> &Path {
        &self.inner.wal_dir
    }

    /// Directory holding the SSTables
    pub fn sstable_dir(&self) -> &Path {
        &self.inner.sstable_dir
    }

    /// Size of the active memtable in bytes
    pub fn memtable_size(&self) -> usize {
        self.inner.state.lock().active.size()
    }

    /// Number of keys in the active memtable
    pub fn memtable_entry_count(&self) -> usize {
        self.inner.state.lock().active.entry_count()
    }

    /// Whether a frozen memtable is waiting to be flushed
    pub fn has_frozen(&self) -> bool {
        self.inner.state.lock().frozen.is_some()
    }

    /// Sequence number of the active WAL
    pub fn wal_seq(&self) -> u64 {
        self.inner.state.lock().wal_seq
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.inner.storage.sstable_count()
    }

    /// SSTable count per level
    pub fn level_counts(&self) -> Vec<usize> {
        self.inner.storage.level_counts()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // No flush here: un-flushed data stays in the WAL for the next open
        self.stop_worker();
    }
}

impl StoreInner {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(KvError::Closed);
        }
        Ok(())
    }

    fn compactor(&self) -> Compactor<'_> {
        Compactor::new(
            &self.storage,
            self.config.compaction_threshold,
            self.config.max_levels,
        )
    }

    /// Non-blocking, coalescing wakeup of the worker
    fn signal_flush(&self) {
        let _ = self.flush_tx.try_send(());
    }

    /// The active memtable, rotated first if it has reached the size limit or
    /// its WAL can no longer be appended to
    ///
    /// Caller holds `write_lock`.
    fn writable_memtable(&self) -> Result<Arc<MemTable>> {
        let active = Arc::clone(&self.state.lock().active);
        if active.size() < self.config.memtable_size_limit && !active.wal_poisoned() {
            return Ok(active);
        }
        self.rotate()?;
        Ok(Arc::clone(&self.state.lock().active))
    }

    /// Retire the active memtable to frozen and start a new one
    ///
    /// Caller holds `write_lock`. Waits while a previous frozen memtable is
    /// still pending; an empty active memtable is left in place.
    fn rotate(&self) -> Result<()> {
        let mut state = self.state.lock();

        let deadline = Instant::now() + self.config.write_stall_timeout;
        while state.frozen.is_some() {
            self.signal_flush();
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    wal_seq = state.wal_seq,
                    "rotation blocked by pending flush, rejecting write"
                );
                return Err(KvError::WriteStall(format!(
                    "frozen memtable still pending after {:?}",
                    self.config.write_stall_timeout
                )));
            }
            let wait = (deadline - now).min(STALL_POLL_INTERVAL);
            self.flush_done.wait_for(&mut state, wait);
        }

        // A poisoned WAL is retired even when empty so writes can continue
        if state.active.is_empty() && !state.active.wal_poisoned() {
            return Ok(());
        }

        let next_seq = state.wal_seq + 1;
        let wal = Wal::open(&self.wal_dir, next_seq, self.config.wal_sync_strategy)?;
        let fresh = Arc::new(MemTable::new(wal, self.config.arena_capacity));

        let retired = std::mem::replace(&mut state.active, fresh);
        retired.freeze();
        state.wal_seq = next_seq;
        state.frozen = Some(Arc::clone(&retired));
        drop(state);

        info!(
            frozen_seq = next_seq - 1,
            active_seq = next_seq,
            size = retired.size(),
            entries = retired.entry_count(),
            "rotated memtable"
        );

        if let Err(e) = retired.close_wal() {
            // The frozen memtable still holds the data; the flush makes it durable.
            warn!(error = %e, "failed to sync retired WAL");
        }

        self.signal_flush();
        Ok(())
    }

    /// Flush pending data on the calling thread
    fn flush_all(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_frozen()?;
        self.rotate()?;
        self.flush_frozen()?;
        Ok(())
    }

    fn wait_for_frozen_cleared(&self) -> Result<()> {
        let mut state = self.state.lock();
        let deadline = Instant::now() + self.config.write_stall_timeout;
        while state.frozen.is_some() {
            self.signal_flush();
            let now = Instant::now();
            if now >= deadline {
                return Err(KvError::WriteStall(
                    "timed out waiting for frozen memtable to flush".to_string(),
                ));
            }
            let wait = (deadline - now).min(STALL_POLL_INTERVAL);
            self.flush_done.wait_for(&mut state, wait);
        }
        Ok(())
    }

    /// Run threshold-driven compaction from `level` down, logging failures
    fn compact_quietly(&self, level: usize) {
        let _maintenance = self.maintenance.lock();
        if let Err(e) = self.compactor().run(level) {
            warn!(level, error = %e, "compaction failed; inputs left in place");
        }
    }
}
