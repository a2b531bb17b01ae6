//! Per-level table index.
//!
//! A handler owns the tables of exactly one level behind its own
//! read/write lock, tracks their summed byte size, and answers two
//! questions: "which table may hold this key" and "which tables should
//! the next compaction consume".

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

use super::LevelError;
use crate::keyspan::{self, Interval};
use crate::memdb::ValueType;
use crate::table::Table;

struct HandlerState {
    tables: Vec<Arc<Table>>,
    total_size: u64,
}

/// Tables of one level. Level 0 may hold overlapping ranges; deeper
/// levels stay non-overlapping and sorted by smallest key.
pub struct LevelHandler {
    level: usize,
    inner: RwLock<HandlerState>,
}

impl LevelHandler {
    pub fn new(level: usize) -> Self {
        Self {
            level,
            inner: RwLock::new(HandlerState {
                tables: Vec::with_capacity(8),
                total_size: 0,
            }),
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HandlerState>, LevelError> {
        self.inner
            .read()
            .map_err(|_| LevelError::Internal("level handler lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HandlerState>, LevelError> {
        self.inner
            .write()
            .map_err(|_| LevelError::Internal("level handler lock poisoned".into()))
    }

    /// Install tables into this level, taking one reference each.
    pub fn add_tables(&self, tables: &[Arc<Table>]) -> Result<(), LevelError> {
        let mut state = self.write()?;
        for table in tables {
            table.add_ref();
            state.total_size += table.size();
            state.tables.push(Arc::clone(table));
        }
        Ok(())
    }

    /// Remove tables from this level and drop their references, which
    /// unlinks the files of tables nobody else holds.
    pub fn del_tables(&self, tables: &[Arc<Table>]) -> Result<(), LevelError> {
        let mut state = self.write()?;
        for table in tables {
            if let Some(pos) = state
                .tables
                .iter()
                .position(|t| Arc::ptr_eq(t, table))
            {
                state.tables.swap_remove(pos);
                state.total_size -= table.size();
            }
            table.del_ref()?;
        }
        Ok(())
    }

    /// Drop every table handle without touching reference counts.
    /// Used when rebuilding state from disk.
    pub fn clear(&self) -> Result<(), LevelError> {
        let mut state = self.write()?;
        state.tables.clear();
        state.total_size = 0;
        Ok(())
    }

    /// Restore the level's ordering invariant: level 0 by ascending id
    /// (creation order), level 1+ by ascending smallest key.
    pub fn sort_tables(&self) -> Result<(), LevelError> {
        let mut state = self.write()?;
        if self.level == 0 {
            state.tables.sort_by_key(|t| t.id());
        } else {
            state
                .tables
                .sort_by(|a, b| keyspan::compare(a.min_key(), b.min_key()));
        }
        Ok(())
    }

    /// Partition the level into maximal transitively-overlapping table
    /// groups, ordered by their smallest key.
    ///
    /// Level 0 is one group — the entire level, in creation order —
    /// because its tables may overlap arbitrarily. On deeper levels a
    /// fully compacted state yields only singleton groups.
    pub fn overlap_groups(&self) -> Result<Vec<Vec<Arc<Table>>>, LevelError> {
        let state = self.read()?;

        if self.level == 0 {
            let mut group = state.tables.clone();
            if group.is_empty() {
                return Ok(Vec::new());
            }
            group.sort_by_key(|t| t.id());
            return Ok(vec![group]);
        }

        let mut tables = state.tables.clone();
        drop(state);
        tables.sort_by(|a, b| keyspan::compare(a.min_key(), b.min_key()));

        let intervals: Vec<Interval> = tables.iter().map(|t| t.key_range()).collect();
        let groups = keyspan::merge_intervals_indexed(&intervals);

        Ok(groups
            .into_iter()
            .map(|(_, idx)| idx.into_iter().map(|i| Arc::clone(&tables[i])).collect())
            .collect())
    }

    /// Pick the tables the next compaction should consume.
    ///
    /// Level 0 returns the entire level. Level 1+ seeds a range with
    /// the first table and folds in every table that transitively
    /// overlaps it; tables outside that range form the retained set.
    ///
    /// Returns `(retained, overlap_group)`.
    #[allow(clippy::type_complexity)]
    pub fn select_compaction_set(
        &self,
    ) -> Result<(Vec<Arc<Table>>, Vec<Arc<Table>>), LevelError> {
        let mut groups = self.overlap_groups()?;
        if groups.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let overlap = groups.remove(0);
        let retained = groups.into_iter().flatten().collect();
        Ok((retained, overlap))
    }

    /// Point lookup within this level.
    ///
    /// Every table whose range contains the key is probed, newest id
    /// first, so level-0 recency (and any transient overlap on deeper
    /// levels) resolves to the most recent write.
    pub fn get(&self, key: &[u8]) -> Result<Option<(Vec<u8>, ValueType)>, LevelError> {
        let state = self.read()?;
        let mut candidates: Vec<&Arc<Table>> = state
            .tables
            .iter()
            .filter(|t| keyspan::between(key, t.min_key(), t.max_key()))
            .collect();
        candidates.sort_by(|a, b| b.id().cmp(&a.id()));

        for table in candidates {
            let (entry, cached) = table.get_entry(key)?;
            if let Some(hit) = entry {
                trace!(
                    level = self.level,
                    table = table.id(),
                    cached,
                    "level probe hit"
                );
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    /// Snapshot of the level's tables in their current order.
    pub fn tables(&self) -> Result<Vec<Arc<Table>>, LevelError> {
        Ok(self.read()?.tables.clone())
    }

    pub fn table_count(&self) -> Result<usize, LevelError> {
        Ok(self.read()?.tables.len())
    }

    /// Summed on-disk size of the level in bytes.
    pub fn total_size(&self) -> Result<u64, LevelError> {
        Ok(self.read()?.total_size)
    }
}
