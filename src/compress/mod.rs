//! Zstd façade for table data blocks.
//!
//! Blocks are compressed at the fastest zstd level with the frame
//! checksum enabled, so every data block carries its own integrity
//! check; the table footer only needs to cover the index block.


use std::io::{self, Write};

use thiserror::Error;

/// Fastest standard zstd level.
const COMPRESSION_LEVEL: i32 = 1;

/// A zstd frame failed to decode — truncated input, a foreign byte
/// stream, or a frame checksum mismatch.
#[derive(Debug, Error)]
#[error("decompression failed: {0}")]
pub struct DecompressError(#[from] io::Error);

/// Compress `src` into a standalone zstd frame with checksum.
pub fn compress(src: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder =
        zstd::stream::Encoder::new(Vec::with_capacity(src.len() / 2 + 64), COMPRESSION_LEVEL)?;
    encoder.include_checksum(true)?;
    encoder.write_all(src)?;
    encoder.finish()
}

/// Decompress a frame produced by [`compress`].
pub fn decompress(src: &[u8]) -> Result<Vec<u8>, DecompressError> {
    zstd::stream::decode_all(src).map_err(DecompressError)
}
