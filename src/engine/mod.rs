//! # LSM Storage Engine
//!
//! The public face of the crate: a synchronous, single-writer,
//! embeddable key-value engine over the leveled table hierarchy.
//!
//! ## Write path
//!
//! `put` goes to the active [`MemDb`]. When the arena cannot accept the
//! entry the engine rotates: the active DB moves into the immutable
//! queue under a short mutex, a fresh DB takes its place, and the put
//! retries there. The minor-compaction worker drains the queue into
//! level-0 tables; the major worker repeatedly merges overlap groups
//! through the levels.
//!
//! ## Read path
//!
//! `get` resolves newest-first: active DB, immutable DBs (most recent
//! first), then the level controller (level 0 by descending id, deeper
//! levels by key range). The first match decides — a live value is
//! returned, a tombstone short-circuits to "not found".
//!
//! ## Concurrency Model
//!
//! One foreground writer (callers serialise their own writes), two
//! background workers (minor and major compaction), any number of
//! readers. `put` never blocks on disk I/O; it touches only the active
//! DB mutex and, at rotation, the immutable-queue mutex. Readers wait
//! on the controller's shared lock only while a major compaction holds
//! it exclusively.
//!
//! ## Failure policy
//!
//! A background worker that hits an unexpected error (corrupt table,
//! I/O failure) records it and exits; every subsequent `put`/`get`
//! surfaces that failure as [`EngineError::Background`]. Arena-full
//! conditions are recovered internally and never escape.
//!
//! ## Durability
//!
//! The engine itself persists data at rotation boundaries and on close.
//! For per-write durability callers install a [`WriteAheadLog`]
//! implementation via [`Engine::open_with_wal`]; the engine invokes the
//! hook before every mutation but deliberately ships no implementation.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Submodules
// ------------------------------------------------------------------------------------------------

mod worker;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{Sender, bounded};
use thiserror::Error;
use tracing::{error, info};

use crate::level::{LevelController, LevelError, MAX_LEVEL};
use crate::memdb::{MemDb, MemDbError, PutOutcome, ValueType};
use crate::table::TableError;

pub const KB: usize = 1 << 10;
pub const MB: usize = 1 << 20;

/// Largest accepted key or value, in bytes.
const MAX_INPUT_LEN: usize = u16::MAX as usize;

/// Back-pressure bound: rotations refuse once this many immutable DBs
/// are queued ahead of the minor compactor.
const MAX_IMMUTABLE_MEMDBS: usize = 8;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors surfaced by the engine API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Expected absence of a key. Mapped to `Ok(None)` at the public
    /// `get` surface and never logged.
    #[error("key not found")]
    KeyNotFound,

    /// Error from the table layer.
    #[error("table error: {0}")]
    Table(#[from] TableError),

    /// Error from the level controller.
    #[error("level error: {0}")]
    Level(#[from] LevelError),

    /// Error from the in-memory DB layer.
    #[error("memdb error: {0}")]
    MemDb(#[from] MemDbError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Key or value exceeds the per-entry size cap.
    #[error("key or value exceeds {MAX_INPUT_LEN} bytes")]
    InputTooLarge,

    /// Too many immutable DBs are queued; writes are refused until the
    /// minor compactor catches up.
    #[error("too many immutable memdbs queued, write stopped")]
    WriteStopped,

    /// A background worker terminated on an unexpected error; the
    /// engine is no longer usable.
    #[error("background worker failed: {0}")]
    Background(String),

    /// Internal invariant violation or poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Engine configuration, passed explicitly through the controller, the
/// table writer and every reader.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the table files. Created on open if missing.
    pub path: PathBuf,

    /// Arena capacity of each active/immutable memdb, in bytes.
    pub memdb_size: usize,

    /// Target uncompressed bytes per table data block.
    pub data_block_size: usize,

    /// Tick interval of the minor-compaction worker.
    pub minor_compact_interval: Duration,

    /// Tick interval of the major-compaction worker.
    pub major_compact_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data"),
            memdb_size: 4 * MB,
            data_block_size: 4 * KB,
            minor_compact_interval: Duration::from_secs(1),
            major_compact_interval: Duration::from_secs(5),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Write-ahead log hook
// ------------------------------------------------------------------------------------------------

/// Pluggable write-ahead log collaborator.
///
/// When installed, [`Engine`] calls [`WriteAheadLog::append`] before
/// applying any mutation to the active memdb and [`WriteAheadLog::sync`]
/// on close. Replay on recovery is the implementation's concern; the
/// engine ships no WAL of its own.
pub trait WriteAheadLog: Send + Sync {
    fn append(&self, key: &[u8], value: &[u8], meta: ValueType) -> io::Result<()>;

    fn sync(&self) -> io::Result<()>;
}

// ------------------------------------------------------------------------------------------------
// Engine
// ------------------------------------------------------------------------------------------------

/// Snapshot of engine state returned by [`Engine::stats`].
#[derive(Debug, Clone)]
pub struct EngineStats {
    /// Immutable memdbs waiting for the minor compactor.
    pub immutable_count: usize,

    /// Tables per level, shallowest first.
    pub tables_per_level: [usize; MAX_LEVEL],

    /// Summed on-disk table size in bytes.
    pub total_table_size: u64,
}

pub(crate) struct EngineInner {
    opt: Arc<EngineConfig>,
    active: Mutex<MemDb>,
    immutables: Mutex<Vec<Arc<MemDb>>>,
    // Serialises flushers (foreground trigger vs. minor worker).
    flush_lock: Mutex<()>,
    controller: LevelController,
    wal: Option<Box<dyn WriteAheadLog>>,

    shutdown: Mutex<Option<Sender<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,

    failed: AtomicBool,
    failure: Mutex<Option<String>>,
}

/// The engine handle. Cheap to clone and share across threads; all
/// clones drive the same underlying state.
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Clone for Engine {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Engine {
    /// Open (or create) an engine over `opt.path`.
    ///
    /// The directory is created if missing, the level hierarchy is
    /// rebuilt from the table files found there, and the two
    /// compaction workers are spawned.
    pub fn open(opt: EngineConfig) -> Result<Self, EngineError> {
        Self::open_with_wal(opt, None)
    }

    /// [`Engine::open`] with a write-ahead log hook installed.
    pub fn open_with_wal(
        opt: EngineConfig,
        wal: Option<Box<dyn WriteAheadLog>>,
    ) -> Result<Self, EngineError> {
        fs::create_dir_all(&opt.path)?;
        let opt = Arc::new(opt);

        let controller = LevelController::new(Arc::clone(&opt));
        controller.build_from_disk()?;

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let inner = Arc::new(EngineInner {
            active: Mutex::new(MemDb::new(opt.memdb_size)),
            immutables: Mutex::new(Vec::new()),
            flush_lock: Mutex::new(()),
            controller,
            wal,
            shutdown: Mutex::new(Some(shutdown_tx)),
            workers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
            opt,
        });

        let handles = worker::spawn(&inner, shutdown_rx)?;
        *inner.lock_workers()? = handles;

        info!(path = %inner.opt.path.display(), "engine opened");
        Ok(Self { inner })
    }

    /// Insert or update a key.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        self.write(key, value, ValueType::Value)
    }

    /// Delete a key by writing a tombstone.
    pub fn delete(&self, key: &[u8]) -> Result<(), EngineError> {
        self.write(key, &[], ValueType::Tombstone)
    }

    fn write(&self, key: &[u8], value: &[u8], meta: ValueType) -> Result<(), EngineError> {
        self.inner.check_usable()?;
        if key.is_empty() {
            return Err(EngineError::Internal("empty key".into()));
        }
        if key.len() > MAX_INPUT_LEN || value.len() > MAX_INPUT_LEN {
            return Err(EngineError::InputTooLarge);
        }

        if let Some(wal) = &self.inner.wal {
            wal.append(key, value, meta)?;
        }

        let mut active = self.inner.lock_active()?;
        match active.put(key, value, meta) {
            PutOutcome::Inserted => Ok(()),
            PutOutcome::Full => {
                // Rotate: park the full DB for the minor compactor and
                // retry on a fresh one.
                {
                    let mut immutables = self.inner.lock_immutables()?;
                    if immutables.len() >= MAX_IMMUTABLE_MEMDBS {
                        return Err(EngineError::WriteStopped);
                    }
                    let fresh = MemDb::new(self.inner.opt.memdb_size);
                    immutables.push(Arc::new(std::mem::replace(&mut *active, fresh)));
                }

                match active.put(key, value, meta) {
                    PutOutcome::Inserted => Ok(()),
                    // An empty DB refused the entry: it cannot fit the
                    // configured arena at all.
                    PutOutcome::Full => Err(EngineError::InputTooLarge),
                }
            }
        }
    }

    /// Point lookup. Returns `Ok(None)` for absent and deleted keys.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        match self.lookup(key) {
            Ok(value) => Ok(Some(value)),
            Err(EngineError::KeyNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Newest-first resolution across the active DB, the immutable
    /// queue and the level hierarchy.
    fn lookup(&self, key: &[u8]) -> Result<Vec<u8>, EngineError> {
        self.inner.check_usable()?;

        {
            let active = self.inner.lock_active()?;
            if let Some((value, meta)) = active.get(key) {
                return resolve(value.to_vec(), meta);
            }
        }

        {
            let immutables = self.inner.lock_immutables()?;
            for db in immutables.iter().rev() {
                if let Some((value, meta)) = db.get(key) {
                    return resolve(value.to_vec(), meta);
                }
            }
        }

        if let Some((value, meta)) = self.inner.controller.get(key)? {
            return resolve(value, meta);
        }
        Err(EngineError::KeyNotFound)
    }

    /// Manually drain the immutable queue into level-0 tables.
    /// Returns the number of DBs flushed.
    ///
    /// The minor worker runs exactly this on every tick.
    pub fn minor_compact(&self) -> Result<usize, EngineError> {
        self.inner.check_usable()?;
        self.inner.flush_immutables()
    }

    /// Manually run one major-compaction sweep.
    ///
    /// The major worker runs exactly this on every tick.
    pub fn major_compact(&self) -> Result<(), EngineError> {
        self.inner.check_usable()?;
        self.inner.run_major()
    }

    /// Current queue depth and table layout.
    pub fn stats(&self) -> Result<EngineStats, EngineError> {
        Ok(EngineStats {
            immutable_count: self.inner.lock_immutables()?.len(),
            tables_per_level: self.inner.controller.table_counts()?,
            total_table_size: self.inner.controller.total_size()?,
        })
    }

    /// Gracefully shut down: stop both workers, then flush the active
    /// DB and everything queued (best effort).
    pub fn close(&self) -> Result<(), EngineError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // 1. Signal cancellation; dropping the sender wakes both
        //    workers out of their tick loops.
        drop(self.inner.lock_shutdown()?.take());

        // 2. Wait for in-flight compaction to finish.
        let handles = std::mem::take(&mut *self.inner.lock_workers()?);
        for handle in handles {
            if handle.join().is_err() {
                error!("background worker panicked during shutdown");
            }
        }

        // 3. Rotate the active DB and flush the whole queue so a clean
        //    close loses nothing.
        {
            let mut active = self.inner.lock_active()?;
            if !active.is_empty() {
                let fresh = MemDb::new(self.inner.opt.memdb_size);
                self.inner
                    .lock_immutables()?
                    .push(Arc::new(std::mem::replace(&mut *active, fresh)));
            }
        }
        if let Err(e) = self.inner.flush_immutables() {
            error!(error = %e, "failed to flush memdbs during close");
        }

        if let Some(wal) = &self.inner.wal {
            let _ = wal.sync();
        }

        info!("engine closed");
        Ok(())
    }
}

/// Map a stored entry to the lookup result: values are returned,
/// tombstones terminate the search as "not found".
fn resolve(value: Vec<u8>, meta: ValueType) -> Result<Vec<u8>, EngineError> {
    match meta {
        ValueType::Value => Ok(value),
        ValueType::Tombstone => Err(EngineError::KeyNotFound),
    }
}

// ------------------------------------------------------------------------------------------------
// Shared internals (engine handle + background workers)
// ------------------------------------------------------------------------------------------------

impl EngineInner {
    fn lock_active(&self) -> Result<MutexGuard<'_, MemDb>, EngineError> {
        self.active
            .lock()
            .map_err(|_| EngineError::Internal("active memdb lock poisoned".into()))
    }

    fn lock_immutables(&self) -> Result<MutexGuard<'_, Vec<Arc<MemDb>>>, EngineError> {
        self.immutables
            .lock()
            .map_err(|_| EngineError::Internal("immutable queue lock poisoned".into()))
    }

    fn lock_workers(&self) -> Result<MutexGuard<'_, Vec<JoinHandle<()>>>, EngineError> {
        self.workers
            .lock()
            .map_err(|_| EngineError::Internal("worker handle lock poisoned".into()))
    }

    fn lock_shutdown(&self) -> Result<MutexGuard<'_, Option<Sender<()>>>, EngineError> {
        self.shutdown
            .lock()
            .map_err(|_| EngineError::Internal("shutdown channel lock poisoned".into()))
    }

    pub(super) fn opt(&self) -> &EngineConfig {
        &self.opt
    }

    /// Refuse API calls once closed or after a background failure.
    fn check_usable(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Internal("engine is closed".into()));
        }
        if self.failed.load(Ordering::SeqCst) {
            let msg = self
                .failure
                .lock()
                .ok()
                .and_then(|guard| guard.clone())
                .unwrap_or_else(|| "unknown background failure".into());
            return Err(EngineError::Background(msg));
        }
        Ok(())
    }

    /// Persist every queued immutable DB as a level-0 table, oldest
    /// first, then drop the flushed entries from the queue.
    ///
    /// The queue entries stay visible to readers until their tables
    /// are installed, so a lookup racing the flush never observes a
    /// gap. Returns the number of DBs flushed.
    pub(super) fn flush_immutables(&self) -> Result<usize, EngineError> {
        let _flushing = self
            .flush_lock
            .lock()
            .map_err(|_| EngineError::Internal("flush lock poisoned".into()))?;

        let snapshot: Vec<Arc<MemDb>> = self.lock_immutables()?.clone();
        for db in &snapshot {
            if db.is_empty() {
                continue;
            }
            self.controller.add_level0_table(db)?;
        }

        let count = snapshot.len();
        self.lock_immutables()?.drain(..count);
        Ok(count)
    }

    pub(super) fn run_major(&self) -> Result<(), EngineError> {
        self.controller.compact()?;
        Ok(())
    }

    /// Record a fatal background error; subsequent API calls surface it.
    pub(super) fn record_failure(&self, err: &EngineError) {
        self.failed.store(true, Ordering::SeqCst);
        if let Ok(mut failure) = self.failure.lock() {
            failure.get_or_insert_with(|| err.to_string());
        }
    }
}
