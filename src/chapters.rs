//! Chapter array parsing.
//!
//! Chapters are the semantic milestones the recorder drops while a duty is
//! in progress: the barrier dropping, a countdown, a wipe or cutscene. The
//! array directly follows the header.
//!
//! # Format
//!
//! | Offset | Size | Type | Field |
//! |--------|------|------|-------|
//! | 0 | 4 | i32 LE | Chapter count (1..=64) |
//! | 4 + 12n | 4 | u32 LE | Chapter type |
//! | 8 + 12n | 4 | u32 LE | Byte offset into the data stream |
//! | 12 + 12n | 4 | u32 LE | Timestamp (ms) |
//!
//! Unused records after the count are zero-filled on disk.

use serde::Serialize;

use crate::binary::{read_i32_le, read_u32_le, write_i32_le, write_u32_le};
use crate::error::{ReplayError, Result};
use crate::format::{CHAPTER_ARRAY_SIZE, CHAPTER_CAPACITY, CHAPTER_RECORD_SIZE};

/// The meaning of a chapter's type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChapterType {
    /// A pull countdown was started (code 1).
    Countdown,
    /// A pull or restart began (code 2).
    Start,
    /// Code 3, seen in recordings but never interpreted.
    Unknown,
    /// A wipe, cutscene or other duty event (code 4).
    Event,
    /// The entrance barrier dropped (code 5).
    Barrier,
    /// Any other code, preserved as-is.
    Other(u32),
}

impl ChapterType {
    /// Decodes a raw type code.
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            1 => ChapterType::Countdown,
            2 => ChapterType::Start,
            3 => ChapterType::Unknown,
            4 => ChapterType::Event,
            5 => ChapterType::Barrier,
            other => ChapterType::Other(other),
        }
    }

    /// Returns the raw type code.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            ChapterType::Countdown => 1,
            ChapterType::Start => 2,
            ChapterType::Unknown => 3,
            ChapterType::Event => 4,
            ChapterType::Barrier => 5,
            ChapterType::Other(code) => code,
        }
    }
}

/// A single chapter marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Chapter {
    /// What the marker denotes.
    pub kind: ChapterType,
    /// Timestamp in milliseconds since the recording began.
    pub ms: u32,
    /// Byte offset into the data segment stream.
    pub offset: u32,
}

impl Chapter {
    /// Creates a chapter marker.
    #[must_use]
    pub const fn new(kind: ChapterType, ms: u32, offset: u32) -> Self {
        Chapter { kind, ms, offset }
    }
}

/// The ordered chapter sequence of one replay.
///
/// Always holds between 1 and [`CHAPTER_CAPACITY`] chapters. Index 0 is
/// conventionally a start marker and doubles as the "not found" answer of
/// the search functions in [`crate::navigation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterArray {
    chapters: Vec<Chapter>,
}

impl ChapterArray {
    /// Builds a chapter array from a list of chapters.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::MalformedReplay` if the list is empty, exceeds
    /// the capacity, or is not ordered by non-decreasing timestamp.
    pub fn new(chapters: Vec<Chapter>) -> Result<Self> {
        if chapters.is_empty() || chapters.len() > CHAPTER_CAPACITY {
            return Err(ReplayError::malformed(format!(
                "chapter count {} outside 1..={CHAPTER_CAPACITY}",
                chapters.len()
            )));
        }

        if let Some(i) = chapters.windows(2).position(|w| w[1].ms < w[0].ms) {
            return Err(ReplayError::malformed(format!(
                "chapter {} at {}ms precedes chapter {} at {}ms",
                i + 1,
                chapters[i + 1].ms,
                i,
                chapters[i].ms
            )));
        }

        Ok(ChapterArray { chapters })
    }

    /// Parses the chapter array from `data`, which must start at the
    /// array's length field.
    ///
    /// # Errors
    ///
    /// - `ReplayError::UnexpectedEof` if fewer than 0x304 bytes are available
    /// - `ReplayError::MalformedReplay` if the count is out of range or the
    ///   timestamps decrease
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < CHAPTER_ARRAY_SIZE {
            return Err(ReplayError::unexpected_eof(CHAPTER_ARRAY_SIZE, data.len()));
        }

        let count = read_i32_le(data, 0)?;
        let count = usize::try_from(count)
            .ok()
            .filter(|&n| (1..=CHAPTER_CAPACITY).contains(&n))
            .ok_or_else(|| {
                ReplayError::malformed(format!(
                    "chapter count {count} outside 1..={CHAPTER_CAPACITY}"
                ))
            })?;

        let mut chapters = Vec::with_capacity(count);
        for i in 0..count {
            let base = 4 + i * CHAPTER_RECORD_SIZE;
            chapters.push(Chapter {
                kind: ChapterType::from_code(read_u32_le(data, base)?),
                offset: read_u32_le(data, base + 4)?,
                ms: read_u32_le(data, base + 8)?,
            });
        }

        ChapterArray::new(chapters)
    }

    /// Encodes the array into its fixed-size on-disk form.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; CHAPTER_ARRAY_SIZE];
        // Length is bounded by CHAPTER_CAPACITY.
        write_i32_le(&mut buf, 0, self.chapters.len() as i32);

        for (i, chapter) in self.chapters.iter().enumerate() {
            let base = 4 + i * CHAPTER_RECORD_SIZE;
            write_u32_le(&mut buf, base, chapter.kind.code());
            write_u32_le(&mut buf, base + 4, chapter.offset);
            write_u32_le(&mut buf, base + 8, chapter.ms);
        }

        buf
    }

    /// Returns the number of chapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    /// Always false; a chapter array holds at least one chapter.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// Returns the chapter at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Chapter> {
        self.chapters.get(index)
    }

    /// Returns the first chapter.
    #[must_use]
    pub fn first(&self) -> &Chapter {
        &self.chapters[0]
    }

    /// Returns the chapters as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Chapter] {
        &self.chapters
    }

    /// Iterates over the chapters in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Chapter> {
        self.chapters.iter()
    }
}

impl<'a> IntoIterator for &'a ChapterArray {
    type Item = &'a Chapter;
    type IntoIter = std::slice::Iter<'a, Chapter>;

    fn into_iter(self) -> Self::IntoIter {
        self.chapters.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(count: i32, records: &[(u32, u32, u32)]) -> Vec<u8> {
        let mut data = vec![0u8; CHAPTER_ARRAY_SIZE];
        data[0..4].copy_from_slice(&count.to_le_bytes());
        for (i, (kind, offset, ms)) in records.iter().enumerate() {
            let base = 4 + i * CHAPTER_RECORD_SIZE;
            data[base..base + 4].copy_from_slice(&kind.to_le_bytes());
            data[base + 4..base + 8].copy_from_slice(&offset.to_le_bytes());
            data[base + 8..base + 12].copy_from_slice(&ms.to_le_bytes());
        }
        data
    }

    #[test]
    fn test_chapter_type_codes() {
        for code in 0..8 {
            assert_eq!(ChapterType::from_code(code).code(), code);
        }
        assert_eq!(ChapterType::from_code(2), ChapterType::Start);
        assert_eq!(ChapterType::from_code(4), ChapterType::Event);
        assert_eq!(ChapterType::from_code(9), ChapterType::Other(9));
    }

    #[test]
    fn test_parse_chapters() {
        let data = encode(3, &[(2, 0, 0), (1, 120, 5000), (2, 9000, 130_000)]);
        let chapters = ChapterArray::parse(&data).unwrap();

        assert_eq!(chapters.len(), 3);
        assert_eq!(*chapters.first(), Chapter::new(ChapterType::Start, 0, 0));
        assert_eq!(
            chapters.get(1),
            Some(&Chapter::new(ChapterType::Countdown, 5000, 120))
        );
        assert_eq!(chapters.get(2).unwrap().offset, 9000);
        assert!(chapters.get(3).is_none());
    }

    #[test]
    fn test_parse_count_out_of_range() {
        for count in [0, -1, 65, i32::MAX] {
            let data = encode(count, &[]);
            let result = ChapterArray::parse(&data);
            assert!(
                matches!(result, Err(ReplayError::MalformedReplay { .. })),
                "count {count} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_truncated() {
        let data = encode(1, &[(2, 0, 0)]);
        assert!(matches!(
            ChapterArray::parse(&data[..100]),
            Err(ReplayError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_parse_decreasing_timestamps() {
        let data = encode(2, &[(2, 0, 5000), (1, 10, 4000)]);
        assert!(matches!(
            ChapterArray::parse(&data),
            Err(ReplayError::MalformedReplay { .. })
        ));
    }

    #[test]
    fn test_to_bytes_matches_disk_layout() {
        let data = encode(2, &[(5, 0, 0), (4, 300, 61_000)]);
        let chapters = ChapterArray::parse(&data).unwrap();
        assert_eq!(chapters.to_bytes(), data);
    }

    #[test]
    fn test_new_rejects_empty() {
        assert!(ChapterArray::new(Vec::new()).is_err());
    }
}
