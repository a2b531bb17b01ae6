//! # Level Module
//!
//! The on-disk half of the tree: per-level table indexes and the
//! controller that owns them.
//!
//! ## Shape of the hierarchy
//!
//! - **Level 0** receives freshly flushed memdbs. Its tables may
//!   overlap arbitrarily and are ordered by ascending id (creation
//!   order doubles as recency).
//! - **Levels 1+** hold compacted tables, pairwise non-overlapping and
//!   sorted by their smallest key.
//!
//! ## Compaction pipeline
//!
//! pick → merge → split → install → release. The controller picks an
//! overlap group per level, merges it into one sorted stream
//! ([`MemDb::merge`](crate::memdb::MemDb::merge), oldest source first
//! so newer writes win), re-shards the stream into capacity-bounded
//! tables at the target level, installs them, and finally drops the
//! references of the consumed tables — which unlinks their files once
//! no reader holds them.
//!
//! ## Concurrency
//!
//! Each handler carries its own read/write lock; the controller's outer
//! lock wraps multi-level operations (rebuild, compaction) while point
//! lookups take it shared. A single-slot channel serialises minor and
//! major compaction with each other and provides back-pressure to
//! whoever asks for the next one.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Submodules
// ------------------------------------------------------------------------------------------------

mod controller;
mod handler;

pub use controller::LevelController;
pub use handler::LevelHandler;

use std::io;

use thiserror::Error;

use crate::memdb::MemDbError;
use crate::table::TableError;

/// Number of levels in the hierarchy (level 0 included).
pub const MAX_LEVEL: usize = 7;

/// Errors returned by level operations.
#[derive(Debug, Error)]
pub enum LevelError {
    /// Error from the table layer (open, read, write, delete).
    #[error("table error: {0}")]
    Table(#[from] TableError),

    /// Error from the in-memory merge/split machinery.
    #[error("memdb error: {0}")]
    MemDb(#[from] MemDbError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal invariant violation or poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}
