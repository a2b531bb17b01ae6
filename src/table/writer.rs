//! Table writer — encodes a [`MemDb`] snapshot into the table byte
//! format and publishes it atomically.
//!
//! # Block cut policy
//!
//! Entries accumulate into the current data block until their
//! *uncompressed* byte count (`|key| + |value| + 2` each) reaches
//! `data_block_size`; the block is then compressed and flushed, and the
//! trailing partial block is always emitted if non-empty. Each flushed
//! block contributes one index entry recording its largest key, byte
//! offset, compressed size and entry count.
//!
//! # Atomicity
//!
//! `persist` writes the full byte image to a `.tmp` sibling, fsyncs it,
//! and renames it over the final path. A crash cannot publish a
//! half-written table.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use prost::Message;
use tracing::debug;

use super::{DataBlock, Footer, IndexBlock, IndexEntry, Table, TableError, table_file_name};
use crate::compress;
use crate::engine::EngineConfig;
use crate::memdb::MemDb;

/// Encodes memory DBs into table files. One shared instance serves all
/// levels; it carries no per-table state.
pub struct TableWriter {
    opt: Arc<EngineConfig>,
}

impl TableWriter {
    pub fn new(opt: Arc<EngineConfig>) -> Self {
        Self { opt }
    }

    /// Encode `db` into a complete table byte image for `(level, id)`.
    pub fn marshal(&self, level: u32, id: u64, db: &MemDb) -> Result<Vec<u8>, TableError> {
        let (Some(min_key), Some(max_key)) = (db.min_key(), db.max_key()) else {
            return Err(TableError::Internal("refusing to write an empty memdb".into()));
        };

        let mut buf: Vec<u8> = Vec::with_capacity(db.capacity() / 2 + 1024);
        let mut index = IndexBlock {
            min_key: min_key.to_vec(),
            max_key: max_key.to_vec(),
            entries: Vec::new(),
        };

        let mut block = DataBlock::default();
        let mut uncompressed = 0usize;
        let mut count = 0u32;

        for (key, value, meta) in db.iter() {
            block.keys.push(key.to_vec());
            block.values.push(value.to_vec());
            block.metas.push(meta as u32);
            uncompressed += key.len() + value.len() + 2;
            count += 1;

            if uncompressed >= self.opt.data_block_size {
                flush_block(&mut buf, &mut index, &mut block, count)?;
                uncompressed = 0;
                count = 0;
            }
        }

        // Trailing partial block.
        if !block.keys.is_empty() {
            flush_block(&mut buf, &mut index, &mut block, count)?;
        }

        let index_bytes = index.encode_to_vec();
        let footer = Footer {
            level,
            crc: crc32c::crc32c(&index_bytes),
            index_size: index_bytes.len() as u64,
            id,
            magic: super::MAGIC,
        };
        buf.extend_from_slice(&index_bytes);
        buf.extend_from_slice(&footer.encode());

        Ok(buf)
    }

    /// Persist `db` as the table `(level, id)` and return a freshly
    /// opened reader over the published file.
    pub fn persist(&self, level: u32, id: u64, db: &MemDb) -> Result<Arc<Table>, TableError> {
        let image = self.marshal(level, id, db)?;

        let final_path = self.opt.path.join(table_file_name(id));
        let tmp_path = tmp_path(&final_path);

        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&image)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;

        debug!(
            id,
            level,
            entries = db.len(),
            bytes = image.len(),
            "table persisted"
        );

        Table::open(&final_path, Arc::clone(&self.opt)).map(Arc::new)
    }
}

fn tmp_path(final_path: &std::path::Path) -> PathBuf {
    let mut name = final_path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    final_path.with_file_name(name)
}

/// Compress and append the current data block, recording its index
/// entry, then reset the block for reuse.
fn flush_block(
    buf: &mut Vec<u8>,
    index: &mut IndexBlock,
    block: &mut DataBlock,
    count: u32,
) -> Result<(), TableError> {
    let max_key = match block.keys.last() {
        Some(key) => key.clone(),
        None => return Ok(()),
    };

    let raw = block.encode_to_vec();
    let compressed = compress::compress(&raw)?;

    index.entries.push(IndexEntry {
        max_key,
        offset: buf.len() as u64,
        size: compressed.len() as u64,
        length: count,
    });
    buf.extend_from_slice(&compressed);

    *block = DataBlock::default();
    Ok(())
}
