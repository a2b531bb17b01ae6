//! Level controller — owns all level handlers and runs compaction.
//!
//! There is no manifest: the table directory is the source of truth,
//! and [`LevelController::build_from_disk`] reconstructs the whole
//! hierarchy from footers on open.
//!
//! ## Single-flight gating
//!
//! A bounded(1) channel gates compaction: acquiring the slot blocks
//! while another minor or major pass is in flight, serialising the two
//! background workers with each other and with manual triggers.

use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crossbeam::channel::{Receiver, Sender, bounded};
use tracing::{debug, info};

use super::{LevelError, LevelHandler, MAX_LEVEL};
use crate::engine::EngineConfig;
use crate::memdb::{MemDb, ValueType};
use crate::table::{Table, TABLE_EXT, TableWriter, parse_table_name};

/// Owns the level handlers, the table id sequence, the shared table
/// writer and the compaction gate.
pub struct LevelController {
    opt: Arc<EngineConfig>,
    handlers: Vec<Arc<LevelHandler>>,
    next_id: AtomicU64,
    writer: TableWriter,

    // Outer lock for multi-level operations; lookups take it shared.
    lock: RwLock<()>,

    // Single-slot compaction gate.
    gate_tx: Sender<()>,
    gate_rx: Receiver<()>,
}

/// Holds the compaction slot; releases it on drop.
struct GatePermit<'a> {
    rx: &'a Receiver<()>,
}

impl<'a> GatePermit<'a> {
    fn acquire(tx: &Sender<()>, rx: &'a Receiver<()>) -> Result<Self, LevelError> {
        tx.send(())
            .map_err(|_| LevelError::Internal("compaction gate closed".into()))?;
        Ok(Self { rx })
    }
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        let _ = self.rx.try_recv();
    }
}

impl LevelController {
    pub fn new(opt: Arc<EngineConfig>) -> Self {
        let (gate_tx, gate_rx) = bounded(1);
        Self {
            writer: TableWriter::new(Arc::clone(&opt)),
            handlers: (0..MAX_LEVEL).map(|l| Arc::new(LevelHandler::new(l))).collect(),
            next_id: AtomicU64::new(1),
            opt,
            lock: RwLock::new(()),
            gate_tx,
            gate_rx,
        }
    }

    fn mint_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn exclusive(&self) -> Result<std::sync::RwLockWriteGuard<'_, ()>, LevelError> {
        self.lock
            .write()
            .map_err(|_| LevelError::Internal("level controller lock poisoned".into()))
    }

    fn shared(&self) -> Result<std::sync::RwLockReadGuard<'_, ()>, LevelError> {
        self.lock
            .read()
            .map_err(|_| LevelError::Internal("level controller lock poisoned".into()))
    }

    /// Rebuild the whole hierarchy from the table directory.
    ///
    /// Clears every handler, opens each `*.sst` file (its footer
    /// declares level and id), removes stale `.tmp` leftovers from an
    /// interrupted publish, and seeds the id sequence past the largest
    /// id seen.
    pub fn build_from_disk(&self) -> Result<(), LevelError> {
        let _guard = self.exclusive()?;

        for handler in &self.handlers {
            handler.clear()?;
        }

        let mut max_id = 0u64;
        let mut opened = 0usize;

        for entry in fs::read_dir(&self.opt.path)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            // A crash between write and rename leaves a `.tmp` behind;
            // it was never published, so it is safe to drop.
            if name.ends_with(".tmp") {
                debug!(file = name, "removing unpublished table leftover");
                fs::remove_file(&path)?;
                continue;
            }
            if !name.ends_with(TABLE_EXT) {
                continue;
            }

            parse_table_name(name)?;
            let table = Arc::new(Table::open(&path, Arc::clone(&self.opt))?);

            let level = table.level() as usize;
            if level >= MAX_LEVEL {
                return Err(LevelError::Internal(format!(
                    "table {} declares level {level}, max is {MAX_LEVEL}",
                    table.id()
                )));
            }

            max_id = max_id.max(table.id());
            opened += 1;
            self.handlers[level].add_tables(std::slice::from_ref(&table))?;
        }

        self.next_id.store(max_id + 1, Ordering::SeqCst);
        for handler in &self.handlers {
            handler.sort_tables()?;
        }

        info!(tables = opened, next_id = max_id + 1, "level controller built from disk");
        Ok(())
    }

    /// Minor compaction: persist a flushed memdb as a fresh level-0
    /// table.
    pub fn add_level0_table(&self, db: &MemDb) -> Result<(), LevelError> {
        let _permit = GatePermit::acquire(&self.gate_tx, &self.gate_rx)?;

        let id = self.mint_id();
        let table = self.writer.persist(0, id, db)?;
        self.handlers[0].add_tables(std::slice::from_ref(&table))?;
        self.handlers[0].sort_tables()?;

        info!(id, entries = db.len(), "minor compaction: memdb flushed to level 0");
        Ok(())
    }

    /// Major compaction: one pick → merge → split → install → release
    /// sweep over every level, in ascending order.
    pub fn compact(&self) -> Result<(), LevelError> {
        let _permit = GatePermit::acquire(&self.gate_tx, &self.gate_rx)?;
        let _guard = self.exclusive()?;

        for level in 0..MAX_LEVEL {
            let handler = &self.handlers[level];

            // Level 0 pours everything into level 1; deeper levels
            // re-shard each of their overlap groups in place. Groups
            // are disjoint, so installing one group's output never
            // grows another.
            let (groups, target) = if level == 0 {
                (handler.overlap_groups()?, 1)
            } else {
                let groups: Vec<_> = handler
                    .overlap_groups()?
                    .into_iter()
                    .filter(|group| group.len() > 1)
                    .collect();
                (groups, level)
            };

            for mut group in groups {
                // Merge oldest → newest so later writes win on
                // collision; ascending id is creation order.
                group.sort_by_key(|t| t.id());
                let mut sources = Vec::with_capacity(group.len());
                for table in &group {
                    sources.push(table.to_memdb()?);
                }
                let merged = MemDb::merge(sources.iter())?;

                // Re-shard into capacity-bounded tables at the target
                // level.
                let mut installed = 0usize;
                merged.split_each(self.opt.memdb_size, |chunk| -> Result<(), LevelError> {
                    let id = self.mint_id();
                    let table = self.writer.persist(target as u32, id, chunk)?;
                    self.handlers[target].add_tables(std::slice::from_ref(&table))?;
                    installed += 1;
                    Ok(())
                })?;

                // Release the consumed tables; files vanish once
                // unreferenced.
                handler.del_tables(&group)?;

                info!(
                    level,
                    target,
                    consumed = group.len(),
                    produced = installed,
                    "major compaction: overlap group merged"
                );
            }

            handler.sort_tables()?;
            self.handlers[target].sort_tables()?;
        }

        Ok(())
    }

    /// Point lookup across all levels, shallowest first.
    pub fn get(&self, key: &[u8]) -> Result<Option<(Vec<u8>, ValueType)>, LevelError> {
        let _guard = self.shared()?;

        for handler in &self.handlers {
            if let Some(hit) = handler.get(key)? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    /// Per-level table counts (shallowest first).
    pub fn table_counts(&self) -> Result<[usize; MAX_LEVEL], LevelError> {
        let mut counts = [0usize; MAX_LEVEL];
        for (level, handler) in self.handlers.iter().enumerate() {
            counts[level] = handler.table_count()?;
        }
        Ok(counts)
    }

    /// Summed on-disk size across all levels, in bytes.
    pub fn total_size(&self) -> Result<u64, LevelError> {
        let mut total = 0u64;
        for handler in &self.handlers {
            total += handler.total_size()?;
        }
        Ok(total)
    }

    /// Handler accessor for tests and diagnostics.
    pub fn handler(&self, level: usize) -> &LevelHandler {
        &self.handlers[level]
    }
}
