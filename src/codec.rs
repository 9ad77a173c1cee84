//! Payload compression codec.
//!
//! Collection records store zstd-compressed document bytes. The output for
//! a given input is stable across runs of the same build, which the offset
//! index relies on only indirectly (checksums are computed over the stored
//! bytes at write time), but determinism keeps saved files reproducible.

use std::io::{Read, Write};

use crate::error::DbResult;

/// zstd compression level for collection payloads.
const COMPRESSION_LEVEL: i32 = 3;

/// Compresses a byte slice.
pub fn compress(data: &[u8]) -> DbResult<Vec<u8>> {
    let mut encoder = zstd::Encoder::new(Vec::new(), COMPRESSION_LEVEL)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompresses a byte slice produced by [`compress`].
pub fn decompress(data: &[u8]) -> DbResult<Vec<u8>> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
