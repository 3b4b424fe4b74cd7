//! The engine context threaded through every host entry point.
//!
//! A [`ReplayEngine`] owns all session state: the active replay, the
//! current selection and its opcode translation, the quick-load scheduler,
//! the pending fast-forward target and the out-of-band packet buffer. The
//! host adapter calls into it from its own hooks and applies the returned
//! [`PlaybackCommand`]s to the client.
//!
//! Every entry point runs synchronously on the caller's thread. Facts the
//! engine can't know (the current playback position, the recorder status)
//! are passed in by the host on each call.
//!
//! # Example
//!
//! ```no_run
//! use duty_replay::config::EngineConfig;
//! use duty_replay::engine::{HostInfo, PlaybackPosition, ReplayEngine, ReplaySource};
//! use duty_replay::library::LibraryPaths;
//! use duty_replay::opcode::OpcodeRegistry;
//!
//! let opcodes = OpcodeRegistry::load_dir("config/opcodes")?;
//! let host = HostInfo { running_version: 6380, character_id: 0x0040_0000_1234_5678 };
//! let mut engine = ReplayEngine::new(EngineConfig::default(), LibraryPaths::new("replay"), opcodes, host);
//!
//! let entry = engine.enumerate_library().into_iter().next().expect("no replays");
//! engine.on_replay_selected(ReplaySource::Path(entry.path))?;
//! engine.begin_playback(duty_replay::engine::CUSTOM_SELECTION_SLOT)?;
//!
//! let position = PlaybackPosition { ms: 0, data_offset: 0 };
//! if let Some(command) = engine.on_chapter_changed(3, position) {
//!     println!("host should apply {command:?}");
//! }
//! # Ok::<(), duty_replay::error::ReplayError>(())
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::chapters::ChapterArray;
use crate::config::EngineConfig;
use crate::error::{ReplayError, Result};
use crate::header::ReplayHeader;
use crate::library::{next_save_slot, LibraryEntry, LibraryPaths, ReplayLibrary, RetentionPolicy};
use crate::opcode::{OpcodeRegistry, TranslationMap, TranslationWarning};
use crate::packets::{OutOfBandBuffer, PacketKind, RecordedPacket};
use crate::quick_load::{QuickLoadScheduler, SectionRequest};
use crate::replay::{read_header_and_chapters, ReplayFile};
use crate::segment::DataSegment;

/// Slot number the duty recorder uses for a replay selected from the
/// library rather than one of its own save slots.
pub const CUSTOM_SELECTION_SLOT: u8 = 100;

/// Recorder status bit: packets are being saved.
pub const STATUS_SAVING_PACKETS: u8 = 0x04;

/// Recorder status bits that are all set while recording.
pub const STATUS_RECORDING: u8 = 0x74;

/// Playback control bit: a replay is playing.
pub const CONTROL_IN_PLAYBACK: u8 = 0x04;

/// Playback control bit: playback is paused.
pub const CONTROL_PAUSED: u8 = 0x08;

/// Selected-chapter values below this mean a chapter is still loading.
pub const CHAPTER_LOADING_LIMIT: u8 = 0x40;

/// Facts about the running client that change rarely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostInfo {
    /// Protocol version of the running client.
    pub running_version: u16,
    /// Content id of the logged-in character.
    pub character_id: u64,
}

/// Recorder and playback state, decoded from the client's flag bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStatus {
    /// A recording is in progress.
    pub recording: bool,
    /// The recorder is writing packets.
    pub saving_packets: bool,
    /// A replay is playing.
    pub in_playback: bool,
    /// Playback is paused.
    pub paused: bool,
    /// A chapter change is still loading.
    pub loading_chapter: bool,
}

impl HostStatus {
    /// Decodes the recorder status, playback controls and selected chapter
    /// bytes.
    #[must_use]
    pub const fn from_flags(status: u8, playback_controls: u8, selected_chapter: u8) -> Self {
        HostStatus {
            recording: status & STATUS_RECORDING == STATUS_RECORDING,
            saving_packets: status & STATUS_SAVING_PACKETS != 0,
            in_playback: playback_controls & CONTROL_IN_PLAYBACK != 0,
            paused: playback_controls & CONTROL_PAUSED != 0,
            loading_chapter: selected_chapter < CHAPTER_LOADING_LIMIT,
        }
    }
}

/// Where playback currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackPosition {
    /// Playback time in milliseconds.
    pub ms: u32,
    /// Byte offset of the next segment in the data stream.
    pub data_offset: u32,
}

/// An action for the host to apply to the client's playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PlaybackCommand {
    /// Move playback to a data offset and time.
    Jump {
        /// Data stream offset to continue from.
        offset: u32,
        /// Playback time at that offset.
        ms: u32,
    },
    /// Change chapter through the client, which re-enters
    /// [`ReplayEngine::on_chapter_changed`].
    SetChapter {
        /// Chapter index.
        chapter: usize,
    },
    /// Restart a chapter without going through quick-load.
    RestartChapter {
        /// Chapter index.
        chapter: usize,
    },
    /// Skip to a data offset without changing the playback time.
    SetDataOffset {
        /// Data stream offset to continue from.
        offset: u32,
    },
}

/// Which replay the user picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaySource {
    /// One of the current character's save slots.
    Slot(u8),
    /// Any replay file, typically from the library listing.
    Path(PathBuf),
}

/// The replay picked in the duty recorder, awaiting playback.
#[derive(Debug, Clone)]
pub struct Selection {
    /// File that will be loaded when playback begins.
    pub path: PathBuf,
    /// Whether it was picked from the library rather than a save slot.
    pub custom: bool,
    /// Header to show in the duty recorder. Carries the current character
    /// id, and the running version when a translation map was built.
    pub header: ReplayHeader,
    /// Messages that could not be translated to the running version.
    pub warnings: Vec<TranslationWarning>,
}

/// How to route one recorded message during playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchedPacket {
    /// Routing class of the recorded opcode.
    pub kind: PacketKind,
    /// Opcode to dispatch under; translated for ordinary messages.
    pub opcode: u16,
}

/// Session state for one host process.
#[derive(Debug)]
pub struct ReplayEngine {
    config: EngineConfig,
    library: ReplayLibrary,
    opcodes: OpcodeRegistry,
    host: HostInfo,
    selection: Option<Selection>,
    translation: Option<TranslationMap>,
    active: Option<ReplayFile>,
    scheduler: QuickLoadScheduler,
    fast_forward_to: Option<u32>,
    out_of_band: OutOfBandBuffer,
    recording_slot: Option<u8>,
}

impl ReplayEngine {
    /// Creates an engine with no replay selected or loaded.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        paths: LibraryPaths,
        opcodes: OpcodeRegistry,
        host: HostInfo,
    ) -> Self {
        let library = ReplayLibrary::new(paths, RetentionPolicy::from(&config));
        ReplayEngine {
            config,
            library,
            opcodes,
            host,
            selection: None,
            translation: None,
            active: None,
            scheduler: QuickLoadScheduler::new(),
            fast_forward_to: None,
            out_of_band: OutOfBandBuffer::new(),
            recording_slot: None,
        }
    }

    /// Returns the current settings.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replaces the settings, updating the library's retention limits.
    pub fn set_config(&mut self, config: EngineConfig) {
        self.library.set_policy(RetentionPolicy::from(&config));
        self.config = config;
    }

    /// Returns the replay library.
    #[must_use]
    pub fn library(&self) -> &ReplayLibrary {
        &self.library
    }

    /// Records a character change.
    pub fn set_character_id(&mut self, character_id: u64) {
        self.host.character_id = character_id;
    }

    /// Returns the current selection.
    #[must_use]
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Returns the translation map for the current selection, if its
    /// recorded version differs from the running one and both are known.
    #[must_use]
    pub fn translation(&self) -> Option<&TranslationMap> {
        self.translation.as_ref()
    }

    /// Returns the replay being played.
    #[must_use]
    pub fn active_replay(&self) -> Option<&ReplayFile> {
        self.active.as_ref()
    }

    /// Returns the quick-load state.
    #[must_use]
    pub fn scheduler(&self) -> &QuickLoadScheduler {
        &self.scheduler
    }

    // ========================================================================
    // Selection and loading
    // ========================================================================

    /// Selects a replay for playback and prepares its opcode translation.
    ///
    /// Only the header and chapters are read. Any previous selection and
    /// translation are discarded first. The returned header is what the
    /// duty recorder should display.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::IoError` if the file can't be read, or a
    /// malformed-replay error if its header is invalid.
    pub fn on_replay_selected(&mut self, source: ReplaySource) -> Result<&ReplayHeader> {
        self.selection = None;
        self.translation = None;

        let (path, custom) = match source {
            ReplaySource::Slot(slot) => (self.library.slot_path(self.host.character_id, slot), false),
            ReplaySource::Path(path) => (path, true),
        };

        let (mut header, _) = read_header_and_chapters(&path)?;
        if !header.is_valid() {
            return Err(ReplayError::invalid_magic(
                crate::format::REPLAY_MAGIC,
                header.magic(),
            ));
        }
        header.character_id = self.host.character_id;

        let mut warnings = Vec::new();
        let running = self.host.running_version;
        if header.replay_version != running {
            warn!(
                recorded = header.replay_version,
                running, "replay was recorded with a different protocol version"
            );
            match self.opcodes.build_map(header.replay_version, running) {
                Ok((map, map_warnings)) => {
                    header.replay_version = running;
                    warnings = map_warnings;
                    self.translation = Some(map);
                }
                Err(e) => warn!(error = %e, "playing without opcode translation"),
            }
        }

        info!(path = %path.display(), custom, "selected replay");
        let selection = self.selection.insert(Selection {
            path,
            custom,
            header,
            warnings,
        });
        Ok(&selection.header)
    }

    /// Loads the replay to play once the client begins playback of `slot`.
    ///
    /// The selection, and the opcode translation prepared for it, is kept
    /// only when `slot` plays the selected file: [`CUSTOM_SELECTION_SLOT`]
    /// for a library selection, or the selected save slot itself. Any other
    /// slot drops both and plays that save slot untranslated.
    ///
    /// # Errors
    ///
    /// Any error from [`ReplayEngine::load_replay`].
    pub fn begin_playback(&mut self, slot: u8) -> Result<&ReplayFile> {
        let slot_path = self.library.slot_path(self.host.character_id, slot);
        let selected = self.selection.as_ref().and_then(|s| {
            let plays_selection = if slot == CUSTOM_SELECTION_SLOT {
                s.custom
            } else {
                !s.custom && s.path == slot_path
            };
            plays_selection.then(|| s.path.clone())
        });

        let path = match selected {
            Some(path) => path,
            None => {
                if self.selection.take().is_some() {
                    debug!(slot, "playback slot differs from selection, dropping translation");
                    self.translation = None;
                }
                slot_path
            }
        };
        self.load_replay(&path)
    }

    /// Fully parses the replay at `path` and makes it the active replay.
    ///
    /// The previous active replay is unloaded first, even if loading fails.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::IoError` if the file can't be read, or a
    /// malformed-replay error if it fails validation.
    pub fn load_replay(&mut self, path: &Path) -> Result<&ReplayFile> {
        self.unload();

        let replay = ReplayFile::open(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "failed to load replay");
            e
        })?;
        info!(
            path = %path.display(),
            chapters = replay.chapters().len(),
            duration = %replay.header().duration_string(),
            "loaded replay"
        );

        self.config.last_loaded_replay = Some(path.to_path_buf());
        Ok(self.active.insert(replay))
    }

    /// Reloads the last loaded replay, for a host restarted mid-playback.
    ///
    /// # Errors
    ///
    /// Any error from [`ReplayEngine::load_replay`]; `Ok(None)` if nothing
    /// was loaded before.
    pub fn resume_last_loaded(&mut self) -> Result<Option<&ReplayFile>> {
        match self.config.last_loaded_replay.clone() {
            Some(path) => self.load_replay(&path).map(Some),
            None => Ok(None),
        }
    }

    /// Drops the active replay and all per-playback state. Returns whether
    /// a replay was loaded.
    pub fn unload(&mut self) -> bool {
        self.scheduler.reset();
        self.fast_forward_to = None;
        self.active.take().is_some()
    }

    // ========================================================================
    // Playback
    // ========================================================================

    /// Starts quick-loading towards `chapter` after the client changes
    /// chapter.
    pub fn on_chapter_changed(
        &mut self,
        chapter: usize,
        position: PlaybackPosition,
    ) -> Option<PlaybackCommand> {
        let replay = self.active.as_ref()?;
        let request =
            self.scheduler
                .on_chapter_changed(replay.chapters(), chapter, self.config.enable_quick_load)?;
        section_jump(replay.chapters(), request, position)
    }

    /// Advances quick-loading once the pending section has played.
    pub fn on_frame_update(&mut self, position: PlaybackPosition) -> Option<PlaybackCommand> {
        let replay = self.active.as_ref()?;
        let request = self.scheduler.on_frame_update(replay.chapters(), position.ms)?;
        section_jump(replay.chapters(), request, position)
    }

    /// Plays chapters `from..to`, jumping forward to `from` if playback has
    /// not reached it yet.
    #[must_use]
    pub fn request_play_section(
        &self,
        from: usize,
        to: usize,
        position: PlaybackPosition,
    ) -> Option<PlaybackCommand> {
        let replay = self.active.as_ref()?;
        section_jump(replay.chapters(), SectionRequest::new(from, to), position)
    }

    /// Seeks to `ms` by restarting the chapter containing it and
    /// fast-forwarding to the first segment at or after it.
    ///
    /// Ignored while a chapter is loading. When the target lies later in
    /// the chapter playback is already in, the chapter is restarted without
    /// quick-load.
    pub fn request_seek(
        &mut self,
        ms: u32,
        position: PlaybackPosition,
        loading_chapter: bool,
    ) -> Option<PlaybackCommand> {
        if loading_chapter {
            return None;
        }

        let replay = self.active.as_ref()?;
        let chapters = replay.chapters();
        let target_chapter = chapters.chapter_containing(ms);
        let (offset, segment) = replay.segments().next_segment_at_or_after(ms)?;
        let offset = u32::try_from(offset).ok()?;

        self.fast_forward_to = Some(offset);
        debug!(ms, offset, chapter = target_chapter, "seeking");

        if position.ms < segment.ms && target_chapter == chapters.chapter_containing(position.ms) {
            Some(PlaybackCommand::RestartChapter {
                chapter: target_chapter,
            })
        } else {
            Some(PlaybackCommand::SetChapter {
                chapter: target_chapter,
            })
        }
    }

    /// Returns whether the client should keep fast-forwarding at
    /// `data_offset`. The seek target is cleared once it is reached.
    pub fn should_fast_forward(&mut self, data_offset: u32) -> bool {
        match self.fast_forward_to {
            Some(target) if target <= data_offset => {
                self.fast_forward_to = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Returns the segment the client should process next, clearing a
    /// reached seek target on the way.
    pub fn next_data_segment(&mut self, data_offset: u32) -> Option<DataSegment<'_>> {
        self.should_fast_forward(data_offset);
        self.active
            .as_ref()?
            .segment_at(usize::try_from(data_offset).ok()?)
    }

    /// Returns whether the client's per-frame processing cap may be lifted
    /// at the current loading speed.
    #[must_use]
    pub fn allows_uncapped_loading(&self, seek_delta: f32) -> bool {
        let max = self.config.max_seek_delta;
        self.config.enable_quick_load && max > 100.0 && seek_delta < max
    }

    /// Jumps straight to the start of a chapter.
    #[must_use]
    pub fn jump_to_chapter(&self, chapter: usize) -> Option<PlaybackCommand> {
        let chapter = self.active.as_ref()?.chapters().get(chapter)?;
        Some(PlaybackCommand::Jump {
            offset: chapter.offset,
            ms: chapter.ms,
        })
    }

    /// Jumps straight to the first segment at or after `ms`, skipping
    /// everything in between.
    #[must_use]
    pub fn jump_to_time(&self, ms: u32) -> Option<PlaybackCommand> {
        let (offset, segment) = self.active.as_ref()?.segments().next_segment_at_or_after(ms)?;
        Some(PlaybackCommand::Jump {
            offset: u32::try_from(offset).ok()?,
            ms: segment.ms,
        })
    }

    /// Jumps to `ms` before the start of a chapter, or to the beginning if
    /// the chapter starts earlier than that.
    #[must_use]
    pub fn jump_to_time_before_chapter(&self, chapter: usize, ms: u32) -> Option<PlaybackCommand> {
        let start = self.active.as_ref()?.chapters().get(chapter)?.ms;
        self.jump_to_time(start.saturating_sub(ms))
    }

    /// Skips the segment at the current offset, for playback that has
    /// stopped advancing.
    #[must_use]
    pub fn unstuck(&self, position: PlaybackPosition) -> Option<PlaybackCommand> {
        let replay = self.active.as_ref()?;
        let segment = replay.segment_at(usize::try_from(position.data_offset).ok()?)?;
        let advance = u32::try_from(segment.encoded_len()).ok()?;
        Some(PlaybackCommand::SetDataOffset {
            offset: position.data_offset.checked_add(advance)?,
        })
    }

    /// Routes a recorded message, translating ordinary opcodes when the
    /// selection needs it.
    #[must_use]
    pub fn dispatch(&self, opcode: u16) -> DispatchedPacket {
        let kind = PacketKind::classify(opcode);
        let opcode = match (kind, &self.translation) {
            (PacketKind::Message, Some(map)) => map.translate(opcode),
            _ => opcode,
        };
        DispatchedPacket { kind, opcode }
    }

    /// Translates one opcode; unmapped codes pass through unchanged.
    #[must_use]
    pub fn translate_opcode(&self, opcode: u16) -> u16 {
        self.translation
            .as_ref()
            .map_or(opcode, |map| map.translate(opcode))
    }

    // ========================================================================
    // Recording
    // ========================================================================

    /// Buffers an RSV packet received outside the message stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet is shorter than it declares.
    pub fn receive_rsv(&mut self, data: &[u8]) -> Result<()> {
        self.out_of_band.receive_rsv(data)
    }

    /// Buffers an RSF packet received outside the message stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet is shorter than an RSF packet.
    pub fn receive_rsf(&mut self, data: &[u8]) -> Result<()> {
        self.out_of_band.receive_rsf(data)
    }

    /// Called when a recording begins. Returns the buffered out-of-band
    /// packets to write into it, if the recorder is saving packets.
    pub fn on_recording_started(&mut self, status: HostStatus) -> Vec<RecordedPacket> {
        self.out_of_band.flush(status.saving_packets)
    }

    /// Tracks the recorder across frames and auto-renames a finished
    /// recording. Returns the new path when a recording was renamed.
    ///
    /// `next_slot` is the slot the recorder is writing to; `duty_title`
    /// names the duty being recorded.
    pub fn on_recording_status(
        &mut self,
        status: HostStatus,
        next_slot: u8,
        duty_title: &str,
    ) -> Option<PathBuf> {
        match (status.recording, self.recording_slot) {
            (true, None) => {
                self.recording_slot = Some(next_slot);
                None
            }
            (false, Some(slot)) => {
                self.recording_slot = None;
                let slot_file = self.library.slot_path(self.host.character_id, slot);
                match self.library.auto_rename(&slot_file, duty_title) {
                    Ok(renamed) => renamed,
                    Err(e) => {
                        error!(path = %slot_file.display(), error = %e, "failed to auto-rename replay");
                        None
                    }
                }
            }
            _ => None,
        }
    }

    /// Picks the save slot for the next recording given the saved slot
    /// headers.
    #[must_use]
    pub fn next_save_slot(&self, headers: &[ReplayHeader], current: u8) -> u8 {
        next_save_slot(headers, current, self.config.max_auto_renamed_replays)
    }

    /// Stamps the current character id on every valid saved slot header.
    pub fn restamp_saved_headers(&self, headers: &mut [ReplayHeader]) {
        for header in headers.iter_mut().filter(|h| h.is_valid()) {
            header.character_id = self.host.character_id;
        }
    }

    // ========================================================================
    // Library
    // ========================================================================

    /// Lists every valid replay in the library.
    #[must_use]
    pub fn enumerate_library(&self) -> Vec<LibraryEntry> {
        self.library.enumerate()
    }

    /// Archives every replay the running client can no longer play.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::Archive` if archiving failed; the archive was
    /// restored and no replay was removed.
    pub fn archive_library(&self) -> Result<usize> {
        self.library.archive()
    }

    /// Deletes a replay according to the retention settings. Returns
    /// whether it succeeded; failures are logged.
    pub fn delete_replay(&self, file: &Path) -> bool {
        self.library
            .delete(file)
            .map_err(|e| error!(path = %file.display(), error = %e, "failed to delete replay"))
            .is_ok()
    }

    /// Renames a replay into the primary folder. Returns the new path, or
    /// `None` after logging the failure.
    pub fn rename_replay(&self, file: &Path, new_name: &str) -> Option<PathBuf> {
        self.library
            .rename(file, new_name)
            .map_err(|e| error!(path = %file.display(), error = %e, "failed to rename replay"))
            .ok()
    }

    /// Copies a replay over one of the current character's save slots and
    /// returns the header to store for that slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot is out of range or the copy fails.
    pub fn copy_into_slot(&self, entry: &LibraryEntry, slot: u8) -> Result<ReplayHeader> {
        self.library
            .copy_into_slot(&entry.path, self.host.character_id, slot)?;
        let mut header = entry.header.clone();
        header.character_id = self.host.character_id;
        Ok(header)
    }
}

fn section_jump(
    chapters: &ChapterArray,
    request: SectionRequest,
    position: PlaybackPosition,
) -> Option<PlaybackCommand> {
    if request.from == 0 {
        return None;
    }
    let from = chapters.get(request.from)?;
    (position.data_offset < from.offset).then_some(PlaybackCommand::Jump {
        offset: from.offset,
        ms: from.ms,
    })
}
