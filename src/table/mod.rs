//! Sorted Table Module
//!
//! Immutable, sorted, on-disk tables — the persistent form of a
//! [`MemDb`]. A table is written once, published by rename, and never
//! modified; the only post-publication mutation is deletion, gated by
//! the embedded reference count.
//!
//! # On-disk layout
//!
//! ```text
//! +----------------------+ offset 0
//! |  data_block[0]       |  zstd frame over protobuf { keys[], values[], metas[] }
//! +----------------------+
//! |  data_block[1]       |
//! |        ...           |
//! +----------------------+
//! |  data_block[n-1]     |
//! +----------------------+
//! |  index_block         |  protobuf { min_key, max_key, entries[] }
//! +----------------------+
//! |  footer (32 B, LE)   |  level u32 | crc u32 | index_size u64 | id u64 | magic u64
//! +----------------------+
//! ```
//!
//! - Data blocks carry their own integrity via the zstd frame checksum.
//! - The footer CRC is CRC-32C over the raw (uncompressed) index bytes.
//! - All multi-byte integers are little-endian.
//!
//! # Reading
//!
//! Opening a table maps the file and parses only footer and index; data
//! blocks are loaded lazily on first touch and decoded into an internal
//! [`MemDb`] cache shared by subsequent lookups.
//!
//! # Lifecycle
//!
//! Tables are shared via `Arc` for in-memory ownership, but physical
//! deletion is decided by an explicit reference count: the level handler
//! holds one reference, compaction and rebuilds add more, and the file
//! is unlinked when the count returns to zero. Dropping every `Arc`
//! without draining the count (e.g. engine shutdown) leaves the file on
//! disk, which is exactly what reopening expects.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Submodules
// ------------------------------------------------------------------------------------------------

mod writer;

pub use writer::TableWriter;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use memmap2::Mmap;
use prost::Message;
use thiserror::Error;
use tracing::{debug, trace};

use crate::compress::{self, DecompressError};
use crate::engine::EngineConfig;
use crate::keyspan::{self, Interval};
use crate::memdb::{MemDb, MemDbError, PutOutcome, ValueType};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// File extension of published tables.
pub const TABLE_EXT: &str = ".sst";

/// Footer magic number.
pub const MAGIC: u64 = 0xDB7A_9C0A_C48C_894D;

/// Fixed footer size: two `u32` + three `u64`.
pub const FOOTER_SIZE: usize = 32;

/// Capacity slack of the internal block cache relative to
/// `memdb_size`, absorbing per-node overhead when a full table is
/// decoded back into a [`MemDb`].
const CACHE_SLACK: f64 = 1.1;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by table operations (write, open, lookup).
#[derive(Debug, Error)]
pub enum TableError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The footer magic number does not match; not a table file.
    #[error("invalid magic number")]
    InvalidMagic,

    /// The index block bytes do not match the footer CRC.
    #[error("invalid index checksum")]
    InvalidChecksum,

    /// A file in the table directory does not follow the
    /// `<zero-padded-id>.sst` naming scheme.
    #[error("invalid table name: {0:?}")]
    InvalidTableName(String),

    /// A protobuf block failed to decode.
    #[error("block decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// A data block failed to decompress (zstd frame corruption).
    #[error("data block corrupted: {0}")]
    Corrupted(#[from] DecompressError),

    /// The internal block cache could not absorb a data block.
    #[error("memdb error: {0}")]
    MemDb(#[from] MemDbError),

    /// Internal invariant violation or poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Wire format
// ------------------------------------------------------------------------------------------------

/// A decoded data block: parallel columns of keys, values and value
/// metadata, sorted by key.
#[derive(Clone, PartialEq, Message)]
pub(crate) struct DataBlock {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub keys: Vec<Vec<u8>>,

    #[prost(bytes = "vec", repeated, tag = "2")]
    pub values: Vec<Vec<u8>>,

    #[prost(uint32, repeated, tag = "3")]
    pub metas: Vec<u32>,
}

/// Location and bounds of one data block.
#[derive(Clone, PartialEq, Message)]
pub(crate) struct IndexEntry {
    /// Largest key stored in the block.
    #[prost(bytes = "vec", tag = "1")]
    pub max_key: Vec<u8>,

    /// Byte offset of the block from the start of the file.
    #[prost(uint64, tag = "2")]
    pub offset: u64,

    /// Compressed byte length of the block.
    #[prost(uint64, tag = "3")]
    pub size: u64,

    /// Number of entries in the block.
    #[prost(uint32, tag = "4")]
    pub length: u32,
}

/// The table's index: overall key bounds plus one entry per data block,
/// in file order (ascending keys).
#[derive(Clone, PartialEq, Message)]
pub(crate) struct IndexBlock {
    #[prost(bytes = "vec", tag = "1")]
    pub min_key: Vec<u8>,

    #[prost(bytes = "vec", tag = "2")]
    pub max_key: Vec<u8>,

    #[prost(message, repeated, tag = "3")]
    pub entries: Vec<IndexEntry>,
}

/// Fixed-size trailer locating the index block and identifying the
/// table. Encoded little-endian in field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Footer {
    pub level: u32,
    pub crc: u32,
    pub index_size: u64,
    pub id: u64,
    pub magic: u64,
}

impl Footer {
    pub(crate) fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[0..4].copy_from_slice(&self.level.to_le_bytes());
        buf[4..8].copy_from_slice(&self.crc.to_le_bytes());
        buf[8..16].copy_from_slice(&self.index_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.id.to_le_bytes());
        buf[24..32].copy_from_slice(&self.magic.to_le_bytes());
        buf
    }

    pub(crate) fn decode(buf: &[u8; FOOTER_SIZE]) -> Self {
        let u32_at = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        let u64_at = |i: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&buf[i..i + 8]);
            u64::from_le_bytes(b)
        };
        Self {
            level: u32_at(0),
            crc: u32_at(4),
            index_size: u64_at(8),
            id: u64_at(16),
            magic: u64_at(24),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// File naming
// ------------------------------------------------------------------------------------------------

/// File name for a table id: `00000042.sst`.
pub fn table_file_name(id: u64) -> String {
    format!("{id:08}{TABLE_EXT}")
}

/// Parse a table file name back into its id.
///
/// Rejects anything that is not a run of ASCII digits followed by the
/// table extension.
pub fn parse_table_name(name: &str) -> Result<u64, TableError> {
    let invalid = || TableError::InvalidTableName(name.to_string());

    let stem = name.strip_suffix(TABLE_EXT).ok_or_else(invalid)?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    stem.parse::<u64>().map_err(|_| invalid())
}

// ------------------------------------------------------------------------------------------------
// Table reader
// ------------------------------------------------------------------------------------------------

/// Per-table cache of decoded data blocks.
///
/// `db` is allocated lazily on the first block load; `loaded` tracks
/// which index entries have been poured into it.
#[derive(Debug)]
struct BlockCache {
    db: Option<MemDb>,
    loaded: Vec<bool>,
}

/// An open, immutable on-disk table.
#[derive(Debug)]
pub struct Table {
    path: PathBuf,
    mmap: Mmap,
    // Keeps the descriptor alive for the lifetime of the map.
    _file: File,

    level: u32,
    id: u64,
    index: IndexBlock,

    refs: AtomicI32,
    cache: Mutex<BlockCache>,
    opt: Arc<EngineConfig>,
}

impl Table {
    /// Open a table file: map it, verify the footer magic, then read
    /// and CRC-check the index block. No data block is touched.
    pub fn open(path: impl AsRef<Path>, opt: Arc<EngineConfig>) -> Result<Self, TableError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < FOOTER_SIZE {
            return Err(TableError::InvalidMagic);
        }

        let footer_start = mmap.len() - FOOTER_SIZE;
        let mut footer_buf = [0u8; FOOTER_SIZE];
        footer_buf.copy_from_slice(&mmap[footer_start..]);
        let footer = Footer::decode(&footer_buf);

        if footer.magic != MAGIC {
            return Err(TableError::InvalidMagic);
        }

        let index_start = footer_start
            .checked_sub(footer.index_size as usize)
            .ok_or(TableError::InvalidChecksum)?;
        let index_bytes = &mmap[index_start..footer_start];
        if crc32c::crc32c(index_bytes) != footer.crc {
            return Err(TableError::InvalidChecksum);
        }

        let index = IndexBlock::decode(index_bytes)?;
        let block_count = index.entries.len();

        debug!(
            id = footer.id,
            level = footer.level,
            blocks = block_count,
            bytes = mmap.len(),
            "table opened"
        );

        Ok(Self {
            path,
            mmap,
            _file: file,
            level: footer.level,
            id: footer.id,
            index,
            refs: AtomicI32::new(0),
            cache: Mutex::new(BlockCache {
                db: None,
                loaded: vec![false; block_count],
            }),
            opt,
        })
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Smallest key stored in the table.
    pub fn min_key(&self) -> &[u8] {
        &self.index.min_key
    }

    /// Largest key stored in the table.
    pub fn max_key(&self) -> &[u8] {
        &self.index.max_key
    }

    /// The table's inclusive key range.
    pub fn key_range(&self) -> Interval {
        Interval::new(&self.index.min_key, &self.index.max_key)
    }

    /// Whether the key ranges of `self` and `other` share any point.
    pub fn overlaps(&self, other: &Table) -> bool {
        self.key_range().overlaps(&other.key_range())
    }

    /// On-disk size in bytes.
    pub fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // --------------------------------------------------------------------------------------------
    // Lookups
    // --------------------------------------------------------------------------------------------

    /// Point lookup returning the stored entry, tombstones included.
    ///
    /// The boolean reports whether the lookup was served entirely from
    /// already-cached blocks; it exists for test instrumentation only.
    pub fn get_entry(
        &self,
        key: &[u8],
    ) -> Result<(Option<(Vec<u8>, ValueType)>, bool), TableError> {
        // First block whose max key is not below the target.
        let Some(pos) = self
            .index
            .entries
            .iter()
            .position(|e| keyspan::less_equal(key, &e.max_key))
        else {
            return Ok((None, true));
        };

        let mut cache = self.lock_cache()?;
        let newly_loaded = self.load_block(&mut cache, pos)?;
        let db = cache
            .db
            .as_ref()
            .ok_or_else(|| TableError::Internal("block cache missing after load".into()))?;

        let hit = db.get(key).map(|(v, meta)| (v.to_vec(), meta));
        Ok((hit, !newly_loaded))
    }

    /// Value lookup: a tombstone resolves to `None`, same as an
    /// absent key. The boolean is the cached-hit flag of
    /// [`Table::get_entry`].
    pub fn find_key(&self, key: &[u8]) -> Result<(Option<Vec<u8>>, bool), TableError> {
        let (entry, cached) = self.get_entry(key)?;
        let value = match entry {
            Some((value, ValueType::Value)) => Some(value),
            Some((_, ValueType::Tombstone)) | None => None,
        };
        Ok((value, cached))
    }

    /// Eagerly decode every data block into the cache. Used by
    /// compaction before merging.
    pub fn load_all(&self) -> Result<(), TableError> {
        let mut cache = self.lock_cache()?;
        for pos in 0..self.index.entries.len() {
            self.load_block(&mut cache, pos)?;
        }
        Ok(())
    }

    /// Snapshot the fully-loaded table as a [`MemDb`] for merging.
    pub fn to_memdb(&self) -> Result<MemDb, TableError> {
        self.load_all()?;
        let cache = self.lock_cache()?;
        Ok(match &cache.db {
            Some(db) => db.clone(),
            None => MemDb::new(self.cache_capacity()),
        })
    }

    fn lock_cache(&self) -> Result<std::sync::MutexGuard<'_, BlockCache>, TableError> {
        self.cache
            .lock()
            .map_err(|_| TableError::Internal("block cache lock poisoned".into()))
    }

    fn cache_capacity(&self) -> usize {
        (self.opt.memdb_size as f64 * CACHE_SLACK) as usize
    }

    /// Decode the data block at index position `pos` into the cache.
    /// Returns whether the block was newly loaded.
    fn load_block(&self, cache: &mut BlockCache, pos: usize) -> Result<bool, TableError> {
        if cache.loaded[pos] {
            return Ok(false);
        }

        let entry = &self.index.entries[pos];
        let start = entry.offset as usize;
        let end = start
            .checked_add(entry.size as usize)
            .filter(|&end| end <= self.mmap.len())
            .ok_or_else(|| TableError::Internal("data block offset out of bounds".into()))?;

        let raw = compress::decompress(&self.mmap[start..end])?;
        let block = DataBlock::decode(raw.as_slice())?;

        let capacity = self.cache_capacity();
        let db = cache.db.get_or_insert_with(|| MemDb::new(capacity));
        for ((key, value), meta) in block.keys.iter().zip(&block.values).zip(&block.metas) {
            let meta = ValueType::from_u8(*meta as u8)
                .ok_or_else(|| TableError::Internal(format!("unknown value type {meta}")))?;
            if db.put(key, value, meta) == PutOutcome::Full {
                return Err(TableError::MemDb(MemDbError::ArenaFull));
            }
        }
        cache.loaded[pos] = true;

        trace!(
            id = self.id,
            block = pos,
            entries = entry.length,
            "data block loaded into cache"
        );
        Ok(true)
    }

    // --------------------------------------------------------------------------------------------
    // Reference counting
    // --------------------------------------------------------------------------------------------

    /// Take a reference, keeping the file alive.
    pub fn add_ref(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop a reference. When the count returns to zero the file is
    /// removed from disk; the in-memory handle stays valid until every
    /// `Arc` is gone.
    pub fn del_ref(&self) -> Result<(), TableError> {
        if self.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            debug!(id = self.id, level = self.level, "last reference dropped, removing table file");
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Current reference count (test instrumentation).
    pub fn ref_count(&self) -> i32 {
        self.refs.load(Ordering::Acquire)
    }
}
