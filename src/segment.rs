//! Data segment decoding and iteration.
//!
//! The payload of a replay is a stream of recorded wire messages, each
//! stored as one data segment.
//!
//! # Format
//!
//! | Offset | Size | Type | Field |
//! |--------|------|------|-------|
//! | 0 | 2 | u16 LE | Opcode |
//! | 2 | 2 | u16 LE | Payload length |
//! | 4 | 4 | u32 LE | Timestamp (ms) |
//! | 8 | 4 | u32 LE | Object id |
//! | 12 | var | bytes | Payload |
//!
//! The stream ends when the offset reaches the header's declared data
//! length, or when a segment would read past the end of the buffer.
//!
//! # Example
//!
//! ```
//! use duty_replay::segment::SegmentStream;
//!
//! let mut data = Vec::new();
//! data.extend_from_slice(&0x0142u16.to_le_bytes()); // opcode
//! data.extend_from_slice(&2u16.to_le_bytes()); // payload length
//! data.extend_from_slice(&1500u32.to_le_bytes()); // ms
//! data.extend_from_slice(&0x1000_0001u32.to_le_bytes()); // object id
//! data.extend_from_slice(&[0xAA, 0xBB]);
//!
//! let stream = SegmentStream::new(&data);
//! let segment = stream.segment_at(0).unwrap();
//! assert_eq!(segment.opcode, 0x0142);
//! assert_eq!(segment.encoded_len(), 14);
//! assert!(stream.segment_at(14).is_none());
//! ```

use std::collections::BTreeMap;

use crate::binary::{read_bytes, read_u16_le, read_u32_le};
use crate::format::SEGMENT_HEADER_SIZE;

/// A single recorded wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSegment<'a> {
    /// Wire-message opcode, as recorded.
    pub opcode: u16,
    /// Timestamp in milliseconds since the recording began.
    pub ms: u32,
    /// Id of the game object the message targets.
    pub object_id: u32,
    /// Raw message payload.
    pub payload: &'a [u8],
}

impl DataSegment<'_> {
    /// Returns the number of payload bytes.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Returns the total encoded length; callers advance by this amount to
    /// reach the next segment.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        SEGMENT_HEADER_SIZE + self.payload.len()
    }
}

/// A bounds-checked view over a replay's data segment stream.
///
/// Offsets are relative to the start of the stream, matching the offsets
/// stored in chapters.
#[derive(Debug, Clone, Copy)]
pub struct SegmentStream<'a> {
    data: &'a [u8],
}

impl<'a> SegmentStream<'a> {
    /// Wraps a stream that ends at the end of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        SegmentStream { data }
    }

    /// Returns the byte length of the stream.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns whether the stream holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decodes the segment starting at `offset`.
    ///
    /// Returns `None` at end of stream: when `offset` is at or past the
    /// end, or when the segment's header or payload would be truncated.
    #[must_use]
    pub fn segment_at(&self, offset: usize) -> Option<DataSegment<'a>> {
        if offset >= self.data.len() {
            return None;
        }

        let opcode = read_u16_le(self.data, offset).ok()?;
        let payload_len = read_u16_le(self.data, offset + 2).ok()?;
        let ms = read_u32_le(self.data, offset + 4).ok()?;
        let object_id = read_u32_le(self.data, offset + 8).ok()?;
        let payload = read_bytes(
            self.data,
            offset + SEGMENT_HEADER_SIZE,
            usize::from(payload_len),
        )
        .ok()?;

        Some(DataSegment {
            opcode,
            ms,
            object_id,
            payload,
        })
    }

    /// Iterates over every segment from the start of the stream.
    #[must_use]
    pub fn iter(&self) -> SegmentIterator<'a> {
        self.iter_from(0)
    }

    /// Iterates over segments starting at `offset`.
    #[must_use]
    pub fn iter_from(&self, offset: usize) -> SegmentIterator<'a> {
        SegmentIterator {
            stream: *self,
            offset,
        }
    }

    /// Counts segments per opcode over the whole stream.
    #[must_use]
    pub fn opcode_statistics(&self) -> SegmentStatistics {
        let mut stats = SegmentStatistics::default();

        for (_, segment) in self.iter() {
            stats.total_segments += 1;
            let entry = stats.opcodes.entry(segment.opcode).or_default();
            entry.count += 1;
            entry.last_payload_len = segment.payload_len();
        }

        stats
    }
}

/// Iterator over `(offset, segment)` pairs of a [`SegmentStream`].
///
/// Offsets strictly increase: every step advances by the segment's
/// encoded length, which is at least the fixed header size.
#[derive(Debug, Clone)]
pub struct SegmentIterator<'a> {
    stream: SegmentStream<'a>,
    offset: usize,
}

impl SegmentIterator<'_> {
    /// Returns the offset of the next segment to be decoded.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for SegmentIterator<'a> {
    type Item = (usize, DataSegment<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let segment = self.stream.segment_at(self.offset)?;
        let offset = self.offset;
        self.offset += segment.encoded_len();
        Some((offset, segment))
    }
}

/// Per-opcode counters for one segment stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentStatistics {
    /// Total number of decoded segments.
    pub total_segments: usize,
    /// Counters keyed by opcode, in ascending opcode order.
    pub opcodes: BTreeMap<u16, OpcodeCount>,
}

/// Counters for a single opcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpcodeCount {
    /// Number of segments with this opcode.
    pub count: usize,
    /// Payload length of the last segment seen with this opcode.
    pub last_payload_len: usize,
}
