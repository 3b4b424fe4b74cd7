//! Replay header parsing and encoding.
//!
//! # Header Layout (96 bytes)
//!
//! | Offset | Size | Field | Description |
//! |--------|------|-------|-------------|
//! | 0x00 | 12 | `magic` | "FFXIVREPLAY\0" |
//! | 0x0C | 2 | `replay_slot` | Save slot the recorder wrote |
//! | 0x0E | 2 | `replay_version` | Protocol version, bumped when opcodes change |
//! | 0x10 | 4 | `patch` | Game patch identifier |
//! | 0x18 | 8 | `character_id` | Owning character content id |
//! | 0x20 | 4 | `timestamp` | Unix timestamp (seconds) |
//! | 0x24 | 4 | `duration_ms` | Total recorded duration |
//! | 0x28 | 4 | `displayed_duration_ms` | Duration shown in the duty recorder |
//! | 0x30 | 1 | `info` | Bit 1 = locked, bit 2 = playable |
//! | 0x34 | 2 | `content_id` | Duty (content finder condition) id |
//! | 0x3C | 8 | `party` | Class/job id per party member |
//! | 0x44 | 1 | `player_index` | Recording player's index in `party` |
//! | 0x4C | 4 | `data_length` | Byte length of the data segment stream |
//!
//! Bytes not listed are unknown. They are kept verbatim so that
//! [`ReplayHeader::to_bytes`] reproduces the original header exactly.

use chrono::{DateTime, Utc};

use crate::binary::{
    read_fixed, read_u16_le, read_u32_le, read_u64_le, read_u8, write_bytes, write_u16_le,
    write_u32_le, write_u64_le,
};
use crate::error::{ReplayError, Result};
use crate::format::{has_replay_magic, HEADER_SIZE, REPLAY_MAGIC};

/// Info bit set while the replay is locked against overwriting.
pub const INFO_LOCKED: u8 = 0x02;

/// Info bit set when the replay can be played by the running client.
pub const INFO_PLAYABLE: u8 = 0x04;

/// Parsed replay header.
///
/// Parsing never rejects a header for its content: an unrecognised magic
/// only clears [`ReplayHeader::is_valid`]. Listings filter on that flag;
/// explicit loads reject it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayHeader {
    /// Save slot recorded at offset 0x0C.
    pub replay_slot: u16,

    /// Recorded protocol version at offset 0x0E.
    pub replay_version: u16,

    /// Game patch identifier at offset 0x10.
    pub patch: u32,

    /// Owning character id at offset 0x18.
    pub character_id: u64,

    /// Unix timestamp (seconds) at offset 0x20.
    pub timestamp: u32,

    /// Total duration in milliseconds at offset 0x24.
    pub duration_ms: u32,

    /// Displayed duration in milliseconds at offset 0x28.
    pub displayed_duration_ms: u32,

    /// Info bitfield at offset 0x30.
    pub info: u8,

    /// Content (duty) identifier at offset 0x34.
    pub content_id: u16,

    /// Party composition snapshot (class/job ids) at offset 0x3C.
    pub party: [u8; 8],

    /// Index of the recording player within `party` at offset 0x44.
    pub player_index: u8,

    /// Length of the data segment stream at offset 0x4C.
    pub data_length: u32,

    raw: [u8; HEADER_SIZE],
}

impl ReplayHeader {
    /// Parses a header from the first 96 bytes of `data`.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::UnexpectedEof` if `data` is shorter than the
    /// header.
    ///
    /// # Example
    ///
    /// ```
    /// use duty_replay::header::ReplayHeader;
    ///
    /// let mut data = vec![0u8; 0x60];
    /// data[..12].copy_from_slice(b"FFXIVREPLAY\0");
    /// data[0x24..0x28].copy_from_slice(&125_000u32.to_le_bytes());
    ///
    /// let header = ReplayHeader::parse(&data)?;
    /// assert!(header.is_valid());
    /// assert_eq!(header.duration_string(), "00:02:05");
    /// # Ok::<(), duty_replay::error::ReplayError>(())
    /// ```
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(ReplayError::unexpected_eof(HEADER_SIZE, data.len()));
        }

        Ok(ReplayHeader {
            replay_slot: read_u16_le(data, 0x0C)?,
            replay_version: read_u16_le(data, 0x0E)?,
            patch: read_u32_le(data, 0x10)?,
            character_id: read_u64_le(data, 0x18)?,
            timestamp: read_u32_le(data, 0x20)?,
            duration_ms: read_u32_le(data, 0x24)?,
            displayed_duration_ms: read_u32_le(data, 0x28)?,
            info: read_u8(data, 0x30)?,
            content_id: read_u16_le(data, 0x34)?,
            party: read_fixed(data, 0x3C)?,
            player_index: read_u8(data, 0x44)?,
            data_length: read_u32_le(data, 0x4C)?,
            raw: read_fixed(data, 0)?,
        })
    }

    /// Creates a zeroed header carrying the replay magic.
    ///
    /// Used by hosts that need to clear a saved slot header and by tools
    /// that synthesize replays.
    #[must_use]
    pub fn new() -> Self {
        let mut raw = [0u8; HEADER_SIZE];
        raw[..REPLAY_MAGIC.len()].copy_from_slice(REPLAY_MAGIC);

        ReplayHeader {
            replay_slot: 0,
            replay_version: 0,
            patch: 0,
            character_id: 0,
            timestamp: 0,
            duration_ms: 0,
            displayed_duration_ms: 0,
            info: 0,
            content_id: 0,
            party: [0; 8],
            player_index: 0,
            data_length: 0,
            raw,
        }
    }

    /// Encodes the header back into its 96-byte on-disk form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = self.raw;
        write_u16_le(&mut buf, 0x0C, self.replay_slot);
        write_u16_le(&mut buf, 0x0E, self.replay_version);
        write_u32_le(&mut buf, 0x10, self.patch);
        write_u64_le(&mut buf, 0x18, self.character_id);
        write_u32_le(&mut buf, 0x20, self.timestamp);
        write_u32_le(&mut buf, 0x24, self.duration_ms);
        write_u32_le(&mut buf, 0x28, self.displayed_duration_ms);
        buf[0x30] = self.info;
        write_u16_le(&mut buf, 0x34, self.content_id);
        write_bytes(&mut buf, 0x3C, &self.party);
        buf[0x44] = self.player_index;
        write_u32_le(&mut buf, 0x4C, self.data_length);
        buf
    }

    /// Returns the raw magic bytes at offset 0x00.
    #[must_use]
    pub fn magic(&self) -> &[u8] {
        &self.raw[..REPLAY_MAGIC.len()]
    }

    /// Returns whether the header carries the replay magic.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        has_replay_magic(&self.raw)
    }

    /// Returns whether the running client can play this replay.
    #[must_use]
    pub fn is_playable(&self) -> bool {
        self.info & INFO_PLAYABLE != 0
    }

    /// Returns whether the replay is locked against being overwritten.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.is_valid() && self.is_playable() && self.info & INFO_LOCKED != 0
    }

    /// Returns the class/job id of the recording player, if the index is in range.
    #[must_use]
    pub fn recording_player_job(&self) -> Option<u8> {
        self.party.get(usize::from(self.player_index)).copied()
    }

    /// Returns the non-empty party slots.
    pub fn party_members(&self) -> impl Iterator<Item = u8> + '_ {
        self.party.iter().copied().filter(|&job| job != 0)
    }

    /// Returns the recording time as a UTC date.
    #[must_use]
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.timestamp), 0)
    }

    /// Returns the duration formatted as "HH:MM:SS".
    #[must_use]
    pub fn duration_string(&self) -> String {
        format_duration_ms(self.duration_ms)
    }
}

impl Default for ReplayHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a millisecond duration as "HH:MM:SS".
#[must_use]
pub fn format_duration_ms(ms: u32) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
