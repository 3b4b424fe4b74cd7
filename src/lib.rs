//! # Duty Replay
//!
//! A replay engine for recorded duty sessions.
//!
//! The library reads and writes the replay file format, navigates a
//! replay's chapters, accelerates seeking by hopping between chapter
//! boundaries, translates recorded opcodes between protocol versions, and
//! manages the on-disk library of saved replays.
//!
//! ## Quick Start
//!
//! ```no_run
//! use duty_replay::replay::ReplayFile;
//! use duty_replay::navigation::PullStatistics;
//! use duty_replay::error::Result;
//!
//! fn describe(path: &str) -> Result<()> {
//!     let replay = ReplayFile::open(path)?;
//!     let header = replay.header();
//!
//!     println!("Content: {}", header.content_id);
//!     println!("Duration: {}", header.duration_string());
//!     println!("Playable: {}", header.is_playable());
//!
//!     let pulls = PullStatistics::compute(replay.chapters(), header.duration_ms);
//!     println!("Pulls: {}", pulls.pulls);
//!
//!     for (_, segment) in replay.segments().iter().take(5) {
//!         println!("[{:#06X}] @ {} ms", segment.opcode, segment.ms);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`error`] - Error types and result alias
//! - [`binary`] - Little-endian reading and writing helpers
//! - [`format`] - File layout constants and magic detection
//! - [`header`] - The fixed-size replay header
//! - [`chapters`] - The chapter array that indexes a replay's timeline
//! - [`segment`] - Recorded data segments and their iteration
//! - [`replay`] - A whole replay file, and header-only reads
//! - [`navigation`] - Chapter lookups, pull statistics and pull windows
//! - [`quick_load`] - Chapter-hopping seek acceleration
//! - [`opcode`] - Opcode tables and version-to-version translation
//! - [`packets`] - Out-of-band packets buffered while recording
//! - [`library`] - Slots, auto-renaming, retention and archiving
//! - [`config`] - Persistent engine settings
//! - [`engine`] - The engine context behind every host entry point
//!
//! ## Format Reference
//!
//! | Offset | Size | Contents |
//! |--------|------|----------|
//! | 0x000 | 0x60 | Header, beginning with the magic `FFXIVREPLAY\0` |
//! | 0x060 | 0x304 | Chapter array (count + 64 records) |
//! | 0x364 | ... | Data segments, 12-byte header plus payload each |
//!
//! All multi-byte integers are stored in little-endian byte order.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod binary;
pub mod chapters;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod header;
pub mod library;
pub mod navigation;
pub mod opcode;
pub mod packets;
pub mod quick_load;
pub mod replay;
pub mod segment;

// Re-export commonly used types at the crate root
pub use chapters::{Chapter, ChapterArray, ChapterType};
pub use config::EngineConfig;
pub use engine::{HostInfo, HostStatus, PlaybackCommand, PlaybackPosition, ReplayEngine, ReplaySource};
pub use error::{ReplayError, Result};
pub use header::ReplayHeader;
pub use library::{LibraryEntry, LibraryPaths, ReplayLibrary, RetentionPolicy};
pub use navigation::{PullStatistics, PullWindow};
pub use opcode::{OpcodeRegistry, OpcodeTable, TranslationMap};
pub use quick_load::{QuickLoadScheduler, SectionRequest};
pub use replay::ReplayFile;
pub use segment::{DataSegment, SegmentStream};
