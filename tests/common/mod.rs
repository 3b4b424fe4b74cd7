//! Shared helpers for building replay files in integration tests.

#![allow(dead_code)]

use std::path::Path;

use duty_replay::header::{INFO_LOCKED, INFO_PLAYABLE};
use duty_replay::{Chapter, ChapterArray, ChapterType, ReplayHeader};

/// Opcode used for filler segments.
pub const FILLER_OPCODE: u16 = 0x0142;

/// Builds a replay file segment by segment.
///
/// Chapters added with [`ReplayBuilder::chapter`] point at the data offset
/// of the next segment to be added.
pub struct ReplayBuilder {
    header: ReplayHeader,
    chapters: Vec<Chapter>,
    data: Vec<u8>,
}

impl ReplayBuilder {
    pub fn new() -> Self {
        let mut header = ReplayHeader::new();
        header.replay_version = 6380;
        header.info = INFO_PLAYABLE;
        ReplayBuilder {
            header,
            chapters: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn version(mut self, version: u16) -> Self {
        self.header.replay_version = version;
        self
    }

    pub fn character(mut self, character_id: u64) -> Self {
        self.header.character_id = character_id;
        self
    }

    pub fn playable(mut self, playable: bool) -> Self {
        if playable {
            self.header.info |= INFO_PLAYABLE;
        } else {
            self.header.info &= !INFO_PLAYABLE;
        }
        self
    }

    pub fn locked(mut self) -> Self {
        self.header.info |= INFO_LOCKED;
        self
    }

    pub fn chapter(mut self, kind: ChapterType, ms: u32) -> Self {
        let offset = u32::try_from(self.data.len()).unwrap();
        self.chapters.push(Chapter::new(kind, ms, offset));
        self
    }

    pub fn segment(mut self, opcode: u16, ms: u32, payload: &[u8]) -> Self {
        self.data.extend_from_slice(&opcode.to_le_bytes());
        self.data
            .extend_from_slice(&u16::try_from(payload.len()).unwrap().to_le_bytes());
        self.data.extend_from_slice(&ms.to_le_bytes());
        self.data.extend_from_slice(&0x1000_0001u32.to_le_bytes());
        self.data.extend_from_slice(payload);
        self
    }

    /// Adds one 4-byte filler segment every `step` ms in `from..to`.
    pub fn fill(mut self, from: u32, to: u32, step: u32) -> Self {
        let mut ms = from;
        while ms < to {
            self = self.segment(FILLER_OPCODE, ms, &[0; 4]);
            ms += step;
        }
        self
    }

    pub fn duration(mut self, ms: u32) -> Self {
        self.header.duration_ms = ms;
        self.header.displayed_duration_ms = ms;
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        if self.chapters.is_empty() {
            self.chapters.push(Chapter::new(ChapterType::Barrier, 0, 0));
        }
        self.header.data_length = u32::try_from(self.data.len()).unwrap();

        let mut bytes = self.header.to_bytes().to_vec();
        bytes.extend(ChapterArray::new(self.chapters).unwrap().to_bytes());
        bytes.extend(self.data);
        bytes
    }

    pub fn write(self, path: &Path) {
        std::fs::write(path, self.build()).unwrap();
    }
}

/// A four-pull duty with 1000 ms of filler segments between chapters.
///
/// | # | Type | ms |
/// |---|------|----|
/// | 0 | Barrier | 0 |
/// | 1 | Start | 10 000 |
/// | 2 | Countdown | 12 000 |
/// | 3 | Event | 70 000 |
/// | 4 | Start | 90 000 |
/// | 5 | Countdown | 95 000 |
/// | 6 | Event | 150 000 |
/// | 7 | Start | 170 000 |
/// | 8 | Event | 240 000 |
pub fn long_duty() -> ReplayBuilder {
    const CHAPTERS: [(ChapterType, u32); 9] = [
        (ChapterType::Barrier, 0),
        (ChapterType::Start, 10_000),
        (ChapterType::Countdown, 12_000),
        (ChapterType::Event, 70_000),
        (ChapterType::Start, 90_000),
        (ChapterType::Countdown, 95_000),
        (ChapterType::Event, 150_000),
        (ChapterType::Start, 170_000),
        (ChapterType::Event, 240_000),
    ];
    const END_MS: u32 = 260_000;

    let mut builder = ReplayBuilder::new();
    for (i, (kind, ms)) in CHAPTERS.iter().enumerate() {
        let next = CHAPTERS.get(i + 1).map_or(END_MS, |(_, ms)| *ms);
        builder = builder.chapter(*kind, *ms).fill(*ms, next, 1000);
    }
    builder.duration(END_MS)
}

/// A minimal replay: one barrier chapter and three segments.
pub fn short_replay() -> ReplayBuilder {
    ReplayBuilder::new()
        .chapter(ChapterType::Barrier, 0)
        .segment(FILLER_OPCODE, 0, &[1, 2, 3, 4])
        .segment(0x0200, 500, &[5, 6])
        .segment(FILLER_OPCODE, 1000, &[])
        .duration(1000)
}
