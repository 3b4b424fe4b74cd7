//! The replay file model.
//!
//! A [`ReplayFile`] owns the whole file as one buffer and exposes the
//! header, the chapter array and a bounds-checked view of the data segment
//! stream. Listings use [`parse_header_and_chapters`] instead, which only
//! needs the fixed-size prefix of the file.
//!
//! # Example
//!
//! ```no_run
//! use duty_replay::replay::ReplayFile;
//!
//! let replay = ReplayFile::open("replay/FFXIV_0040000012345678_000.dat")?;
//! println!("Duration: {}", replay.header().duration_string());
//! for (offset, segment) in replay.segments().iter() {
//!     println!("{offset:#x}: opcode {:#06x} at {}ms", segment.opcode, segment.ms);
//! }
//! # Ok::<(), duty_replay::error::ReplayError>(())
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::chapters::ChapterArray;
use crate::error::{ReplayError, Result};
use crate::format::{check_magic, DATA_OFFSET, HEADER_SIZE};
use crate::header::ReplayHeader;
use crate::segment::{DataSegment, SegmentStream};

/// A fully loaded replay.
#[derive(Debug, Clone)]
pub struct ReplayFile {
    header: ReplayHeader,
    chapters: ChapterArray,
    buffer: Vec<u8>,
}

impl ReplayFile {
    /// Parses a complete replay, taking ownership of its bytes.
    ///
    /// The header and chapter array are validated eagerly; the segment
    /// stream is only checked against its declared length and decoded
    /// lazily.
    ///
    /// # Errors
    ///
    /// - `ReplayError::UnexpectedEof` if the file is shorter than the fixed prefix
    /// - `ReplayError::InvalidMagic` if the header magic is missing
    /// - `ReplayError::MalformedReplay` if the chapter array is invalid or the
    ///   declared data length exceeds the file
    pub fn parse(buffer: Vec<u8>) -> Result<Self> {
        check_magic(&buffer)?;
        let (header, chapters) = parse_header_and_chapters(&buffer)?;

        let available = buffer.len() - DATA_OFFSET;
        let declared = header.data_length as usize;
        if declared > available {
            return Err(ReplayError::malformed(format!(
                "header declares {declared} data bytes but only {available} follow the chapters"
            )));
        }

        Ok(ReplayFile {
            header,
            chapters,
            buffer,
        })
    }

    /// Reads and parses the replay at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::IoError` if the file can't be read, or any
    /// error from [`ReplayFile::parse`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let buffer = std::fs::read(path)?;
        debug!(path = %path.display(), bytes = buffer.len(), "read replay");
        Self::parse(buffer)
    }

    /// Returns the parsed header.
    #[must_use]
    pub fn header(&self) -> &ReplayHeader {
        &self.header
    }

    /// Returns the chapter array.
    #[must_use]
    pub fn chapters(&self) -> &ChapterArray {
        &self.chapters
    }

    /// Returns a view of the data segment stream, bounded by the header's
    /// declared data length.
    #[must_use]
    pub fn segments(&self) -> SegmentStream<'_> {
        let end = DATA_OFFSET + self.header.data_length as usize;
        SegmentStream::new(&self.buffer[DATA_OFFSET..end])
    }

    /// Decodes the segment at `offset` within the data stream.
    #[must_use]
    pub fn segment_at(&self, offset: usize) -> Option<DataSegment<'_>> {
        self.segments().segment_at(offset)
    }

    /// Returns the raw file bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

/// Parses only the header and chapter array from the start of a file.
///
/// `prefix` needs to hold at least the first 0x364 bytes. The header's
/// magic is not checked; callers filter on [`ReplayHeader::is_valid`].
///
/// # Errors
///
/// - `ReplayError::UnexpectedEof` if `prefix` is too short
/// - `ReplayError::MalformedReplay` if the chapter array is invalid
pub fn parse_header_and_chapters(prefix: &[u8]) -> Result<(ReplayHeader, ChapterArray)> {
    if prefix.len() < DATA_OFFSET {
        return Err(ReplayError::unexpected_eof(DATA_OFFSET, prefix.len()));
    }

    let header = ReplayHeader::parse(prefix)?;
    let chapters = ChapterArray::parse(&prefix[HEADER_SIZE..DATA_OFFSET])?;
    Ok((header, chapters))
}

/// Reads the fixed-size prefix of the file at `path` and parses it.
///
/// Only the first 0x364 bytes are read.
///
/// # Errors
///
/// Returns `ReplayError::IoError` if the file can't be opened, or any error
/// from [`parse_header_and_chapters`].
pub fn read_header_and_chapters(path: impl AsRef<Path>) -> Result<(ReplayHeader, ChapterArray)> {
    let mut prefix = Vec::with_capacity(DATA_OFFSET);
    File::open(path.as_ref())?
        .take(DATA_OFFSET as u64)
        .read_to_end(&mut prefix)?;
    parse_header_and_chapters(&prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapters::{Chapter, ChapterType};
    use crate::format::REPLAY_MAGIC;

    fn create_replay(payload: &[u8], declared: u32) -> Vec<u8> {
        let mut header = ReplayHeader::new();
        header.data_length = declared;
        header.duration_ms = 125_000;

        let chapters = ChapterArray::new(vec![
            Chapter::new(ChapterType::Start, 0, 0),
            Chapter::new(ChapterType::Countdown, 5000, 14),
        ])
        .unwrap();

        let mut data = header.to_bytes().to_vec();
        data.extend_from_slice(&chapters.to_bytes());
        data.extend_from_slice(payload);
        data
    }

    fn segment(opcode: u16, ms: u32, payload: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&opcode.to_le_bytes());
        data.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        data.extend_from_slice(&ms.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn test_parse_full() {
        let mut payload = segment(0x10, 0, &[1, 2]);
        payload.extend(segment(0x20, 5000, &[]));
        let data = create_replay(&payload, payload.len() as u32);

        let replay = ReplayFile::parse(data).unwrap();
        assert_eq!(replay.header().duration_ms, 125_000);
        assert_eq!(replay.chapters().len(), 2);
        assert_eq!(replay.segments().len(), 26);
        assert_eq!(replay.segment_at(14).unwrap().opcode, 0x20);
        assert!(replay.segment_at(26).is_none());
    }

    #[test]
    fn test_declared_length_bounds_stream() {
        let mut payload = segment(0x10, 0, &[1, 2]);
        payload.extend(segment(0x20, 5000, &[]));
        // Trailing bytes past the declared length are not part of the stream.
        let data = create_replay(&payload, 14);

        let replay = ReplayFile::parse(data).unwrap();
        assert_eq!(replay.segments().iter().count(), 1);
    }

    #[test]
    fn test_declared_length_exceeds_file() {
        let payload = segment(0x10, 0, &[1, 2]);
        let data = create_replay(&payload, 1000);
        let err = ReplayFile::parse(data).unwrap_err();
        assert!(matches!(err, ReplayError::MalformedReplay { .. }));
    }

    #[test]
    fn test_parse_full_rejects_bad_magic() {
        let mut data = create_replay(&[], 0);
        data[0] = 0;
        assert!(matches!(
            ReplayFile::parse(data),
            Err(ReplayError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn test_parse_full_truncated_prefix() {
        let data = create_replay(&[], 0);
        let result = ReplayFile::parse(data[..0x200].to_vec());
        assert!(result.unwrap_err().is_malformed());
    }

    #[test]
    fn test_parse_header_and_chapters_ignores_magic() {
        let mut data = create_replay(&[], 0);
        data[..REPLAY_MAGIC.len()].fill(0);
        let (header, chapters) = parse_header_and_chapters(&data).unwrap();
        assert!(!header.is_valid());
        assert_eq!(chapters.len(), 2);
    }

    #[test]
    fn test_parse_header_and_chapters_too_short() {
        let data = create_replay(&[], 0);
        assert!(matches!(
            parse_header_and_chapters(&data[..DATA_OFFSET - 1]),
            Err(ReplayError::UnexpectedEof { .. })
        ));
    }
}
