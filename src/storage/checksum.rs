//! CRC32/IEEE checksums over stored payload bytes.

/// Computes the CRC32/IEEE checksum of a byte slice.
pub fn compute_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
