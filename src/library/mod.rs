//! Replay library management.
//!
//! The library spans one primary folder and three folders beneath it:
//!
//! | Path | Contents |
//! |------|----------|
//! | `replay/` | Slot files written by the recorder, and user-renamed replays |
//! | `replay/autorenamed/` | Finished recordings moved out of their slot |
//! | `replay/deleted/` | Deleted replays awaiting pruning |
//! | `replay/archive.zip` | Replays the running client can no longer play |
//!
//! Listing reads only the header and chapters of each file. Retention
//! limits come from [`RetentionPolicy`]; exceeding them is steady state,
//! not an error, and pruning removes the oldest files first.
//!
//! - [`retention`] - Auto-renaming, deleting and pruning
//! - [`archive`] - Moving unplayable replays into the archive container

pub mod archive;
pub mod retention;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::chapters::ChapterArray;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::format::REPLAY_EXTENSION;
use crate::header::ReplayHeader;
use crate::replay::read_header_and_chapters;

pub use retention::sanitize_title;

/// Number of save slots the recorder writes to.
pub const SAVE_SLOT_COUNT: u8 = 3;

/// Folder for auto-renamed replays, relative to the primary folder.
pub const AUTO_RENAMED_FOLDER: &str = "autorenamed";

/// Folder for deleted replays, relative to the primary folder.
pub const DELETED_FOLDER: &str = "deleted";

/// Archive container file name, relative to the primary folder.
pub const ARCHIVE_FILE_NAME: &str = "archive.zip";

/// Suffix of the archive backup taken before each update.
pub const ARCHIVE_BACKUP_SUFFIX: &str = ".BACKUP";

/// Returns the recorder's file name for a character's save slot.
///
/// # Example
///
/// ```
/// use duty_replay::library::slot_file_name;
///
/// assert_eq!(
///     slot_file_name(0x0040_0000_1234_5678, 1),
///     "FFXIV_0040000012345678_001.dat"
/// );
/// ```
#[must_use]
pub fn slot_file_name(character_id: u64, slot: u8) -> String {
    format!("FFXIV_{character_id:016X}_{slot:03}.{REPLAY_EXTENSION}")
}

/// Picks the save slot the recorder should write next.
///
/// Slots 0 and 1 are used if unlocked, in that order; slot 2 is the
/// fallback even when locked. With auto-renaming disabled an unlocked
/// `current` slot is kept, since nothing moves finished recordings out of
/// the slots.
#[must_use]
pub fn next_save_slot(headers: &[ReplayHeader], current: u8, max_auto_renamed: usize) -> u8 {
    let is_locked = |slot: u8| headers.get(usize::from(slot)).is_some_and(ReplayHeader::is_locked);

    if max_auto_renamed == 0 && !is_locked(current) {
        return current;
    }

    (0..SAVE_SLOT_COUNT - 1)
        .find(|&slot| !is_locked(slot))
        .unwrap_or(SAVE_SLOT_COUNT - 1)
}

/// Returns whether `path` has the replay file extension.
#[must_use]
pub fn is_replay_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(REPLAY_EXTENSION))
}

/// Locations that make up a replay library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPaths {
    /// The recorder's own folder.
    pub primary: PathBuf,
    /// Destination of auto-renamed recordings.
    pub auto_renamed: PathBuf,
    /// Destination of deleted replays.
    pub deleted: PathBuf,
    /// The archive container.
    pub archive: PathBuf,
}

impl LibraryPaths {
    /// Lays out the standard folders beneath `primary`.
    #[must_use]
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        let primary = primary.into();
        LibraryPaths {
            auto_renamed: primary.join(AUTO_RENAMED_FOLDER),
            deleted: primary.join(DELETED_FOLDER),
            archive: primary.join(ARCHIVE_FILE_NAME),
            primary,
        }
    }

    /// Returns where the archive is copied before being modified.
    #[must_use]
    pub fn archive_backup(&self) -> PathBuf {
        let mut name = self.archive.clone().into_os_string();
        name.push(ARCHIVE_BACKUP_SUFFIX);
        PathBuf::from(name)
    }
}

/// How many replays each retention folder keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Cap for the auto-renamed folder; zero disables auto-renaming.
    pub max_auto_renamed: usize,
    /// Cap for the deleted folder; zero deletes files outright.
    pub max_deleted: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for RetentionPolicy {
    fn from(config: &EngineConfig) -> Self {
        RetentionPolicy {
            max_auto_renamed: config.max_auto_renamed_replays,
            max_deleted: config.max_deleted_replays,
        }
    }
}

/// One listed replay.
#[derive(Debug, Clone)]
pub struct LibraryEntry {
    /// Location of the file.
    pub path: PathBuf,
    /// Its parsed header.
    pub header: ReplayHeader,
    /// Its chapter array.
    pub chapters: ChapterArray,
}

impl LibraryEntry {
    /// Returns the file name, if it is valid UTF-8.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }

    /// Returns whether the file sits directly in `dir`.
    #[must_use]
    pub fn is_directly_in(&self, dir: &Path) -> bool {
        self.path.parent() == Some(dir)
    }
}

/// A replay library rooted at one primary folder.
#[derive(Debug, Clone)]
pub struct ReplayLibrary {
    paths: LibraryPaths,
    policy: RetentionPolicy,
}

impl ReplayLibrary {
    /// Creates a library over `paths`.
    #[must_use]
    pub fn new(paths: LibraryPaths, policy: RetentionPolicy) -> Self {
        ReplayLibrary { paths, policy }
    }

    /// Returns the library's folders.
    #[must_use]
    pub fn paths(&self) -> &LibraryPaths {
        &self.paths
    }

    /// Returns the retention limits.
    #[must_use]
    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Replaces the retention limits.
    pub fn set_policy(&mut self, policy: RetentionPolicy) {
        self.policy = policy;
    }

    /// Returns the path of a character's save slot file.
    #[must_use]
    pub fn slot_path(&self, character_id: u64, slot: u8) -> PathBuf {
        self.paths.primary.join(slot_file_name(character_id, slot))
    }

    /// Lists every valid replay in the primary and auto-renamed folders.
    ///
    /// Never fails: an unreadable folder yields an empty list, and files
    /// that fail to parse or lack the replay magic are left out.
    #[must_use]
    pub fn enumerate(&self) -> Vec<LibraryEntry> {
        match self.try_enumerate() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.paths.primary.display(), error = %e, "failed to list replays");
                Vec::new()
            }
        }
    }

    /// Lists replays like [`ReplayLibrary::enumerate`], but reports folder
    /// errors.
    ///
    /// Creates the auto-renamed folder if it is missing and auto-renaming
    /// is enabled.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::IoError` if a folder can't be listed or created.
    pub fn try_enumerate(&self) -> Result<Vec<LibraryEntry>> {
        let mut files = list_replay_files(&self.paths.primary)?;

        if self.paths.auto_renamed.is_dir() {
            files.extend(list_replay_files(&self.paths.auto_renamed)?);
        } else if self.policy.max_auto_renamed > 0 {
            std::fs::create_dir_all(&self.paths.auto_renamed)?;
        }

        let entries: Vec<LibraryEntry> = files
            .into_iter()
            .filter_map(|path| match read_header_and_chapters(&path) {
                Ok((header, chapters)) if header.is_valid() => Some(LibraryEntry {
                    path,
                    header,
                    chapters,
                }),
                Ok(_) => {
                    debug!(path = %path.display(), "skipping file without replay magic");
                    None
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable replay");
                    None
                }
            })
            .collect();

        debug!(count = entries.len(), "enumerated replay library");
        Ok(entries)
    }

    /// Moves a replay into the primary folder as `{new_name}.dat`.
    ///
    /// # Errors
    ///
    /// - `ReplayError::IoError` with `InvalidInput` if `new_name` is empty or
    ///   contains characters not allowed in file names
    /// - `ReplayError::IoError` with `AlreadyExists` if the name is taken
    /// - `ReplayError::IoError` if the move fails
    pub fn rename(&self, file: &Path, new_name: &str) -> Result<PathBuf> {
        if new_name.trim().is_empty() || sanitize_title(new_name) != new_name {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{new_name:?} is not a valid replay name"),
            )
            .into());
        }

        let destination = self
            .paths
            .primary
            .join(format!("{new_name}.{REPLAY_EXTENSION}"));
        if destination.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", destination.display()),
            )
            .into());
        }

        std::fs::rename(file, &destination)?;
        info!(from = %file.display(), to = %destination.display(), "renamed replay");
        Ok(destination)
    }

    /// Copies a replay over a character's save slot so the client's own
    /// duty recorder can play it.
    ///
    /// # Errors
    ///
    /// - `ReplayError::IoError` with `InvalidInput` if `slot` is not a save slot
    /// - `ReplayError::IoError` if the copy fails
    pub fn copy_into_slot(&self, file: &Path, character_id: u64, slot: u8) -> Result<PathBuf> {
        if slot >= SAVE_SLOT_COUNT {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("save slot {slot} out of range"),
            )
            .into());
        }

        let destination = self.slot_path(character_id, slot);
        std::fs::copy(file, &destination)?;
        info!(from = %file.display(), slot, "copied replay into save slot");
        Ok(destination)
    }
}

/// Lists files with the replay extension directly inside `dir`, in path
/// order.
pub(crate) fn list_replay_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_replay_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{INFO_LOCKED, INFO_PLAYABLE};

    fn header(info: u8) -> ReplayHeader {
        let mut header = ReplayHeader::new();
        header.info = info;
        header
    }

    #[test]
    fn test_slot_file_name() {
        assert_eq!(slot_file_name(0, 0), "FFXIV_0000000000000000_000.dat");
        assert_eq!(
            slot_file_name(u64::MAX, 2),
            "FFXIV_FFFFFFFFFFFFFFFF_002.dat"
        );
    }

    #[test]
    fn test_library_paths() {
        let paths = LibraryPaths::new("replay");
        assert_eq!(paths.auto_renamed, Path::new("replay/autorenamed"));
        assert_eq!(paths.deleted, Path::new("replay/deleted"));
        assert_eq!(paths.archive, Path::new("replay/archive.zip"));
        assert_eq!(paths.archive_backup(), Path::new("replay/archive.zip.BACKUP"));
    }

    #[test]
    fn test_next_save_slot() {
        let locked = header(INFO_PLAYABLE | INFO_LOCKED);
        let free = header(INFO_PLAYABLE);

        let headers = [free.clone(), free.clone(), free.clone()];
        assert_eq!(next_save_slot(&headers, 2, 30), 0);

        let headers = [locked.clone(), free.clone(), free.clone()];
        assert_eq!(next_save_slot(&headers, 0, 30), 1);

        let headers = [locked.clone(), locked.clone(), locked.clone()];
        assert_eq!(next_save_slot(&headers, 0, 30), 2);
    }

    #[test]
    fn test_next_save_slot_without_auto_rename() {
        let locked = header(INFO_PLAYABLE | INFO_LOCKED);
        let free = header(INFO_PLAYABLE);

        let headers = [free.clone(), free.clone(), free.clone()];
        assert_eq!(next_save_slot(&headers, 2, 0), 2);

        let headers = [free.clone(), locked.clone(), free.clone()];
        assert_eq!(next_save_slot(&headers, 1, 0), 0);
    }

    #[test]
    fn test_is_replay_file() {
        assert!(is_replay_file(Path::new("a/FFXIV_0_000.dat")));
        assert!(is_replay_file(Path::new("x.DAT")));
        assert!(!is_replay_file(Path::new("archive.zip")));
        assert!(!is_replay_file(Path::new("dat")));
    }

    #[test]
    fn test_retention_policy_from_config() {
        let config = EngineConfig {
            max_auto_renamed_replays: 3,
            max_deleted_replays: 0,
            ..EngineConfig::default()
        };
        let policy = RetentionPolicy::from(&config);
        assert_eq!(policy.max_auto_renamed, 3);
        assert_eq!(policy.max_deleted, 0);
    }
}
