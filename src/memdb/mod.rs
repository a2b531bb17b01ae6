//! # Memory DB Module
//!
//! The in-memory write buffer of the storage engine: an ordered map
//! from byte-string keys to byte-string values, backed by an
//! arena-allocated skiplist with a fixed byte capacity.
//!
//! ## Design Invariants
//!
//! - Keys are unique within a DB; an insert for an existing key updates
//!   the entry in place.
//! - Entries are held in ascending key order at all times.
//! - Total bytes charged to the arena never exceed the configured
//!   capacity; an insert that would overflow reports
//!   [`PutOutcome::Full`] **without mutating** the DB.
//! - Deletions are represented as [`ValueType::Tombstone`] entries, not
//!   physical removal.
//!
//! ## Rotation Contract
//!
//! The engine owns mutability: once a DB is rotated into the immutable
//! queue nothing writes to it again. The DB itself does not enforce
//! this — it has no interior locking and relies on its single writer.
//!
//! ## Merge & Split
//!
//! [`MemDb::merge`] folds several DBs into one, later sources winning
//! on key collision (the caller orders sources oldest to newest).
//! [`MemDb::split_each`] re-shards one DB into capacity-bounded chunks,
//! which is how compaction cuts a merged stream back into table-sized
//! pieces.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Submodules
// ------------------------------------------------------------------------------------------------

mod skiplist;

pub use skiplist::Iter;

use skiplist::SkipList;
use thiserror::Error;

/// Capacity slack applied by [`MemDb::merge`] so that the merged DB is
/// guaranteed to accept every entry of its sources.
const MERGE_SLACK: f64 = 1.05;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`MemDb`] operations.
///
/// `ArenaFull` is an internal signal: the engine recovers from it by
/// rotating the active DB and it never reaches the public API.
#[derive(Debug, Error)]
pub enum MemDbError {
    /// The arena cannot fit the entry being inserted.
    #[error("memdb arena is full")]
    ArenaFull,
}

// ------------------------------------------------------------------------------------------------
// Value metadata
// ------------------------------------------------------------------------------------------------

/// Entry metadata stored alongside every key.
///
/// Tombstones are physically stored; they suppress older values during
/// merge and resolve to "not found" at lookup time.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// A live value.
    Value = 1,

    /// A deletion marker.
    Tombstone = 2,
}

impl ValueType {
    /// Decode from the on-disk byte representation.
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            1 => Some(ValueType::Value),
            2 => Some(ValueType::Tombstone),
            _ => None,
        }
    }
}

/// Result of a [`MemDb::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The entry was inserted or updated in place.
    Inserted,

    /// The arena cannot fit the entry; the DB is unchanged and should
    /// be rotated by the caller.
    Full,
}

// ------------------------------------------------------------------------------------------------
// MemDb
// ------------------------------------------------------------------------------------------------

/// Arena-backed ordered in-memory map. See the module docs for the
/// full contract.
#[derive(Clone, Debug)]
pub struct MemDb {
    skl: SkipList,
}

impl MemDb {
    /// Create an empty DB whose arena holds at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            skl: SkipList::with_capacity(capacity),
        }
    }

    /// Insert or update an entry.
    ///
    /// Duplicate keys are updated in place. Returns
    /// [`PutOutcome::Full`] — not an error — when the arena cannot fit
    /// the entry; the DB is left untouched in that case.
    pub fn put(&mut self, key: &[u8], value: &[u8], meta: ValueType) -> PutOutcome {
        debug_assert!(!key.is_empty(), "memdb keys must be non-empty");
        self.skl.put(key, value, meta)
    }

    /// Point lookup. Tombstone entries are returned as such; resolving
    /// them to "not found" is the caller's concern.
    pub fn get(&self, key: &[u8]) -> Option<(&[u8], ValueType)> {
        self.skl.get(key)
    }

    /// Lazy ascending traversal over all entries. Restartable — every
    /// call starts a fresh cursor.
    pub fn iter(&self) -> Iter<'_> {
        self.skl.iter()
    }

    /// Smallest key, if any.
    pub fn min_key(&self) -> Option<&[u8]> {
        self.skl.min_key()
    }

    /// Largest key, if any.
    pub fn max_key(&self) -> Option<&[u8]> {
        self.skl.max_key()
    }

    /// Arena capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.skl.capacity()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.skl.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skl.len() == 0
    }

    /// Clear all entries and restart the skiplist. Capacity and the
    /// arena's backing allocation are preserved.
    pub fn reset(&mut self) {
        self.skl.reset();
    }

    /// Merge several DBs into a new one.
    ///
    /// The merged capacity is the sum of the source capacities with a
    /// small slack factor, which guarantees every source entry fits.
    /// Sources are streamed in the order supplied; when a key occurs in
    /// several sources the **last** one wins, so callers encode recency
    /// by ordering sources oldest to newest.
    pub fn merge<'a>(sources: impl IntoIterator<Item = &'a MemDb>) -> Result<MemDb, MemDbError> {
        let sources: Vec<&MemDb> = sources.into_iter().collect();
        let cap_sum: usize = sources.iter().map(|db| db.capacity()).sum();
        let cap = (cap_sum as f64 * MERGE_SLACK) as usize;

        let mut out = MemDb::new(cap);
        for db in sources {
            for (key, value, meta) in db.iter() {
                if out.put(key, value, meta) == PutOutcome::Full {
                    return Err(MemDbError::ArenaFull);
                }
            }
        }
        Ok(out)
    }

    /// Re-shard this DB into chunks of at most `block_cap` charged
    /// bytes, invoking `emit` for each chunk in key order.
    ///
    /// The same DB instance is reused across callbacks; `emit` must
    /// consume it (e.g. write it out) before returning. Every entry of
    /// `self` appears in exactly one emitted chunk, so a single entry
    /// must always be smaller than `block_cap`.
    pub fn split_each<E>(
        &self,
        block_cap: usize,
        mut emit: impl FnMut(&MemDb) -> Result<(), E>,
    ) -> Result<(), E> {
        let mut out = MemDb::new(block_cap);
        for (key, value, meta) in self.iter() {
            if out.put(key, value, meta) == PutOutcome::Full {
                emit(&out)?;
                out.reset();
                let retried = out.put(key, value, meta);
                debug_assert_eq!(
                    retried,
                    PutOutcome::Inserted,
                    "entry larger than split capacity"
                );
            }
        }
        if !out.is_empty() {
            emit(&out)?;
        }
        Ok(())
    }
}
