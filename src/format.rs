//! Layout constants and magic detection for replay files.
//!
//! A replay file is one contiguous buffer made of three regions:
//!
//! | Offset | Size | Region |
//! |--------|------|--------|
//! | 0x000 | 0x060 | Header |
//! | 0x060 | 0x304 | Chapter array (`i32` length + 64 × 12-byte chapters) |
//! | 0x364 | var | Data segment stream |
//!
//! All multi-byte integers are little-endian.
//!
//! # Example
//!
//! ```
//! use duty_replay::format::{has_replay_magic, DATA_OFFSET, HEADER_SIZE};
//!
//! assert!(has_replay_magic(b"FFXIVREPLAY\0rest-of-header"));
//! assert!(!has_replay_magic(b"Warcraft III recorded game"));
//! assert_eq!(DATA_OFFSET, 0x364);
//! assert_eq!(HEADER_SIZE, 0x60);
//! ```

use crate::error::{ReplayError, Result};

/// The magic bytes at the start of every valid replay header.
pub const REPLAY_MAGIC: &[u8; 12] = b"FFXIVREPLAY\0";

/// The size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 0x60;

/// Maximum number of chapters a chapter array can hold.
pub const CHAPTER_CAPACITY: usize = 64;

/// The size of one encoded chapter record.
pub const CHAPTER_RECORD_SIZE: usize = 0xC;

/// The size of the chapter array, including its leading length field.
pub const CHAPTER_ARRAY_SIZE: usize = 4 + CHAPTER_RECORD_SIZE * CHAPTER_CAPACITY;

/// The byte offset where the data segment stream begins.
///
/// Chapter and segment offsets are relative to this position.
pub const DATA_OFFSET: usize = HEADER_SIZE + CHAPTER_ARRAY_SIZE;

/// The size of the fixed part of a data segment (before its payload).
pub const SEGMENT_HEADER_SIZE: usize = 0xC;

/// The file extension used for replay files (without the dot).
pub const REPLAY_EXTENSION: &str = "dat";

/// Returns whether `data` starts with the replay magic.
#[must_use]
pub fn has_replay_magic(data: &[u8]) -> bool {
    data.len() >= REPLAY_MAGIC.len() && &data[..REPLAY_MAGIC.len()] == REPLAY_MAGIC
}

/// Checks the replay magic, returning a descriptive error when it is absent.
///
/// # Errors
///
/// - `ReplayError::UnexpectedEof` if `data` is shorter than the magic
/// - `ReplayError::InvalidMagic` if the magic doesn't match
pub fn check_magic(data: &[u8]) -> Result<()> {
    if data.len() < REPLAY_MAGIC.len() {
        return Err(ReplayError::unexpected_eof(REPLAY_MAGIC.len(), data.len()));
    }

    if has_replay_magic(data) {
        Ok(())
    } else {
        Err(ReplayError::invalid_magic(
            REPLAY_MAGIC,
            &data[..REPLAY_MAGIC.len()],
        ))
    }
}
