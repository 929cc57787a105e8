//! Network byte order (big-endian) put/get helpers for fixed-width integers.
//!
//! All multi-byte fields on the wire — length prefixes, frame length
//! extensions, the SHA-1 bit counter — are big-endian.

/// Writes `v` big-endian into `buf` (must have at least 2 bytes).
#[inline]
pub fn put_u16(buf: &mut [u8], v: u16) {
    buf[..2].copy_from_slice(&v.to_be_bytes());
}

/// Reads a big-endian u16 from `buf` (must have at least 2 bytes).
#[inline]
pub fn get_u16(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[0], buf[1]])
}

/// Writes `v` big-endian into `buf` (must have at least 4 bytes).
#[inline]
pub fn put_u32(buf: &mut [u8], v: u32) {
    buf[..4].copy_from_slice(&v.to_be_bytes());
}

/// Reads a big-endian u32 from `buf` (must have at least 4 bytes).
#[inline]
pub fn get_u32(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Writes `v` big-endian into `buf` (must have at least 8 bytes).
#[inline]
pub fn put_u64(buf: &mut [u8], v: u64) {
    buf[..8].copy_from_slice(&v.to_be_bytes());
}

/// Reads a big-endian u64 from `buf` (must have at least 8 bytes).
#[inline]
pub fn get_u64(buf: &[u8]) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[..8]);
    u64::from_be_bytes(b)
}
