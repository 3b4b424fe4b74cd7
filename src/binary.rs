//! Binary reading and writing utilities for replay files.
//!
//! The readers perform bounds checking and return
//! [`ReplayError::UnexpectedEof`] for truncated data. The writers are used
//! when re-encoding a header or chapter array for the host and never grow
//! the destination buffer; callers size it up front.
//!
//! # Endianness
//!
//! Every multi-byte field in a replay file is little-endian.
//!
//! # Example
//!
//! ```
//! use duty_replay::binary::{read_u16_le, read_u32_le, read_bytes};
//!
//! let data = [0x26, 0x89, 0x01, 0x00, b'F', b'F'];
//!
//! assert_eq!(read_u16_le(&data, 0).unwrap(), 0x8926);
//! assert_eq!(read_u32_le(&data, 0).unwrap(), 0x0001_8926);
//! assert_eq!(read_bytes(&data, 4, 2).unwrap(), b"FF");
//! ```

use crate::error::{ReplayError, Result};

/// Returns the `SIZE` bytes at `offset`, or `UnexpectedEof`.
fn read_array<const SIZE: usize>(bytes: &[u8], offset: usize) -> Result<[u8; SIZE]> {
    let end = offset
        .checked_add(SIZE)
        .ok_or_else(|| ReplayError::unexpected_eof(usize::MAX, bytes.len()))?;

    if end > bytes.len() {
        return Err(ReplayError::unexpected_eof(end, bytes.len()));
    }

    let mut out = [0u8; SIZE];
    out.copy_from_slice(&bytes[offset..end]);
    Ok(out)
}

/// Reads a single byte at the given offset.
///
/// # Errors
///
/// Returns `ReplayError::UnexpectedEof` if `offset` is beyond the buffer.
pub fn read_u8(bytes: &[u8], offset: usize) -> Result<u8> {
    bytes
        .get(offset)
        .copied()
        .ok_or_else(|| ReplayError::unexpected_eof(offset + 1, bytes.len()))
}

/// Reads a little-endian u16 value from the byte buffer at the given offset.
///
/// # Errors
///
/// Returns `ReplayError::UnexpectedEof` if the buffer doesn't contain
/// at least 2 bytes starting from the given offset.
///
/// # Example
///
/// ```
/// use duty_replay::binary::read_u16_le;
///
/// let data = [0x34, 0x12, 0xFF, 0xFF];
/// assert_eq!(read_u16_le(&data, 0).unwrap(), 0x1234);
/// assert_eq!(read_u16_le(&data, 2).unwrap(), 0xFFFF);
/// ```
pub fn read_u16_le(bytes: &[u8], offset: usize) -> Result<u16> {
    read_array(bytes, offset).map(u16::from_le_bytes)
}

/// Reads a little-endian u32 value from the byte buffer at the given offset.
///
/// # Errors
///
/// Returns `ReplayError::UnexpectedEof` if the buffer doesn't contain
/// at least 4 bytes starting from the given offset.
pub fn read_u32_le(bytes: &[u8], offset: usize) -> Result<u32> {
    read_array(bytes, offset).map(u32::from_le_bytes)
}

/// Reads a little-endian i32 value from the byte buffer at the given offset.
///
/// # Errors
///
/// Returns `ReplayError::UnexpectedEof` if fewer than 4 bytes remain.
pub fn read_i32_le(bytes: &[u8], offset: usize) -> Result<i32> {
    read_array(bytes, offset).map(i32::from_le_bytes)
}

/// Reads a little-endian u64 value from the byte buffer at the given offset.
///
/// # Errors
///
/// Returns `ReplayError::UnexpectedEof` if fewer than 8 bytes remain.
pub fn read_u64_le(bytes: &[u8], offset: usize) -> Result<u64> {
    read_array(bytes, offset).map(u64::from_le_bytes)
}

/// Reads a fixed-size byte array from the buffer at the given offset.
///
/// # Errors
///
/// Returns `ReplayError::UnexpectedEof` if fewer than `N` bytes remain.
pub fn read_fixed<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N]> {
    read_array(bytes, offset)
}

/// Reads a slice of bytes from the buffer at the given offset.
///
/// # Errors
///
/// Returns `ReplayError::UnexpectedEof` if the buffer doesn't contain
/// at least `len` bytes starting from the given offset.
///
/// # Example
///
/// ```
/// use duty_replay::binary::read_bytes;
///
/// let data = b"FFXIVREPLAY\0";
/// assert_eq!(read_bytes(data, 0, 5).unwrap(), b"FFXIV");
/// ```
pub fn read_bytes(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    match offset.checked_add(len) {
        Some(end) if end <= bytes.len() => Ok(&bytes[offset..end]),
        Some(end) => Err(ReplayError::unexpected_eof(end, bytes.len())),
        None => Err(ReplayError::unexpected_eof(usize::MAX, bytes.len())),
    }
}

/// Writes `value` into `buf` at `offset`.
///
/// # Panics
///
/// Panics if `buf` is too short; encoders size their buffers from the
/// fixed layout constants before writing.
pub fn write_bytes(buf: &mut [u8], offset: usize, value: &[u8]) {
    buf[offset..offset + value.len()].copy_from_slice(value);
}

/// Writes a little-endian u16 into `buf` at `offset`.
pub fn write_u16_le(buf: &mut [u8], offset: usize, value: u16) {
    write_bytes(buf, offset, &value.to_le_bytes());
}

/// Writes a little-endian u32 into `buf` at `offset`.
pub fn write_u32_le(buf: &mut [u8], offset: usize, value: u32) {
    write_bytes(buf, offset, &value.to_le_bytes());
}

/// Writes a little-endian i32 into `buf` at `offset`.
pub fn write_i32_le(buf: &mut [u8], offset: usize, value: i32) {
    write_bytes(buf, offset, &value.to_le_bytes());
}

/// Writes a little-endian u64 into `buf` at `offset`.
pub fn write_u64_le(buf: &mut [u8], offset: usize, value: u64) {
    write_bytes(buf, offset, &value.to_le_bytes());
}
