//! Out-of-band packets.
//!
//! Two kinds of server packets (RSV and RSF) arrive outside the normal
//! message stream, often before the recorder starts saving. They are
//! buffered as they arrive and written into the recording, under reserved
//! opcodes, once the recorder is saving packets. During playback the same
//! reserved opcodes are routed back to their handlers instead of being
//! translated.
//!
//! # RSV layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | i32 LE value size `n` |
//! | 4 | 0x30 | key |
//! | 0x34 | `n` | value |
//!
//! RSF packets have a fixed size of 0x48 bytes.

use serde::Serialize;
use tracing::debug;

use crate::binary::{read_bytes, read_i32_le};
use crate::error::{ReplayError, Result};

/// Opcode under which RSV packets are recorded.
pub const RSV_OPCODE: u16 = 0xF001;

/// Opcode under which RSF packets are recorded.
pub const RSF_OPCODE: u16 = 0xF002;

/// Opcode of the recorded time-delta correction.
pub const DELTA_OPCODE: u16 = 0xF003;

/// Size of an RSF packet.
pub const RSF_SIZE: usize = 0x48;

/// Size of the key in an RSV packet.
pub const RSV_KEY_SIZE: usize = 0x30;

/// Object id recorded with out-of-band packets.
pub const OUT_OF_BAND_TARGET_ID: u32 = 0xE000_0000;

/// How a recorded opcode is routed during playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PacketKind {
    /// A recorded RSV packet.
    Rsv,
    /// A recorded RSF packet.
    Rsf,
    /// A time-delta correction.
    Delta,
    /// An ordinary game message, subject to opcode translation.
    Message,
}

impl PacketKind {
    /// Classifies a recorded opcode.
    #[must_use]
    pub const fn classify(opcode: u16) -> Self {
        match opcode {
            RSV_OPCODE => PacketKind::Rsv,
            RSF_OPCODE => PacketKind::Rsf,
            DELTA_OPCODE => PacketKind::Delta,
            _ => PacketKind::Message,
        }
    }
}

/// Returns the total size of the RSV packet at the start of `data`.
///
/// # Errors
///
/// - `ReplayError::UnexpectedEof` if the size field is missing
/// - `ReplayError::MalformedReplay` if the value size is negative
pub fn rsv_packet_len(data: &[u8]) -> Result<usize> {
    let size = read_i32_le(data, 0)?;
    let size = usize::try_from(size)
        .map_err(|_| ReplayError::malformed(format!("negative RSV value size {size}")))?;
    Ok(4 + RSV_KEY_SIZE + size)
}

/// A packet ready to be written into a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPacket {
    /// Reserved opcode to record it under.
    pub opcode: u16,
    /// Object id to record it with.
    pub target_id: u32,
    /// Raw packet bytes.
    pub data: Vec<u8>,
}

/// Out-of-band packets received since the last flush.
#[derive(Debug, Clone, Default)]
pub struct OutOfBandBuffer {
    rsv: Vec<Vec<u8>>,
    rsf: Vec<Vec<u8>>,
}

impl OutOfBandBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers the RSV packet at the start of `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is shorter than the size it declares.
    pub fn receive_rsv(&mut self, data: &[u8]) -> Result<()> {
        let len = rsv_packet_len(data)?;
        self.rsv.push(read_bytes(data, 0, len)?.to_vec());
        debug!(len, buffered = self.rsv.len(), "buffered RSV packet");
        Ok(())
    }

    /// Buffers the RSF packet at the start of `data`.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::UnexpectedEof` if `data` is shorter than an
    /// RSF packet.
    pub fn receive_rsf(&mut self, data: &[u8]) -> Result<()> {
        self.rsf.push(read_bytes(data, 0, RSF_SIZE)?.to_vec());
        debug!(buffered = self.rsf.len(), "buffered RSF packet");
        Ok(())
    }

    /// Number of buffered packets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rsv.len() + self.rsf.len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rsv.is_empty() && self.rsf.is_empty()
    }

    /// Empties the buffer. If the recorder is saving packets, returns the
    /// buffered packets to record, RSF packets first; otherwise they are
    /// dropped.
    pub fn flush(&mut self, saving_packets: bool) -> Vec<RecordedPacket> {
        let rsf = std::mem::take(&mut self.rsf);
        let rsv = std::mem::take(&mut self.rsv);
        if !saving_packets {
            return Vec::new();
        }

        let packets: Vec<RecordedPacket> = rsf
            .into_iter()
            .map(|data| (RSF_OPCODE, data))
            .chain(rsv.into_iter().map(|data| (RSV_OPCODE, data)))
            .map(|(opcode, data)| RecordedPacket {
                opcode,
                target_id: OUT_OF_BAND_TARGET_ID,
                data,
            })
            .collect();
        debug!(count = packets.len(), "flushing out-of-band packets");
        packets
    }
}
