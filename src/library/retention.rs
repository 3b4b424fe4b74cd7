//! Auto-renaming, deleting and pruning.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info};

use super::{list_replay_files, ReplayLibrary};
use crate::error::Result;
use crate::format::REPLAY_EXTENSION;

/// Timestamp format appended to auto-renamed replays.
pub const AUTO_RENAME_TIME_FORMAT: &str = "%Y.%m.%d %H.%M.%S";

/// Characters that may not appear in a replay file name.
const BANNED_CHARACTERS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Strips characters that can't appear in a file name.
///
/// # Example
///
/// ```
/// use duty_replay::library::sanitize_title;
///
/// assert_eq!(sanitize_title("The Navel: Extreme?"), "The Navel Extreme");
/// ```
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !BANNED_CHARACTERS.contains(c) && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

impl ReplayLibrary {
    /// Moves a finished recording out of its save slot into the
    /// auto-renamed folder, named after the duty and the current local
    /// time, then prunes that folder.
    ///
    /// Returns `None` without touching the file when auto-renaming is
    /// disabled.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::IoError` if the move or pruning fails.
    pub fn auto_rename(&self, slot_file: &Path, duty_title: &str) -> Result<Option<PathBuf>> {
        self.auto_rename_at(slot_file, duty_title, Local::now().naive_local())
    }

    /// Like [`ReplayLibrary::auto_rename`], with an explicit timestamp.
    ///
    /// If the generated name is taken, ` (2)`, ` (3)` and so on are
    /// appended until it is free.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::IoError` if the move or pruning fails.
    pub fn auto_rename_at(
        &self,
        slot_file: &Path,
        duty_title: &str,
        recorded_at: NaiveDateTime,
    ) -> Result<Option<PathBuf>> {
        let max = self.policy.max_auto_renamed;
        if max == 0 {
            return Ok(None);
        }

        let dir = &self.paths.auto_renamed;
        std::fs::create_dir_all(dir)?;

        let stem = format!(
            "{} {}",
            sanitize_title(duty_title),
            recorded_at.format(AUTO_RENAME_TIME_FORMAT)
        );
        let destination = free_path(dir, stem.trim());

        std::fs::rename(slot_file, &destination)?;
        info!(from = %slot_file.display(), to = %destination.display(), "auto-renamed replay");

        let mut files = list_replay_files(dir)?;
        while files.len() > max {
            let Some(oldest) = oldest_file(&files) else {
                break;
            };
            self.delete(&oldest)?;
            files = list_replay_files(dir)?;
        }

        Ok(Some(destination))
    }

    /// Deletes a replay.
    ///
    /// With a deleted-replay cap above zero, the file is moved into the
    /// deleted folder (replacing a file of the same name) and that folder
    /// is pruned to the cap. Otherwise it is removed immediately.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::IoError` if the file is missing or can't be
    /// moved or removed.
    pub fn delete(&self, file: &Path) -> Result<()> {
        if !file.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", file.display()),
            )
            .into());
        }

        let max = self.policy.max_deleted;
        if max == 0 {
            std::fs::remove_file(file)?;
            info!(path = %file.display(), "deleted replay");
            return Ok(());
        }

        let dir = &self.paths.deleted;
        std::fs::create_dir_all(dir)?;

        let Some(name) = file.file_name() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no file name", file.display()),
            )
            .into());
        };
        let destination = dir.join(name);
        if destination.exists() {
            std::fs::remove_file(&destination)?;
        }
        std::fs::rename(file, &destination)?;
        info!(path = %file.display(), "moved replay to deleted folder");

        let pruned = prune_oldest(dir, max)?;
        if pruned > 0 {
            debug!(pruned, "pruned deleted replays");
        }
        Ok(())
    }
}

/// Removes the oldest replays in `dir` until at most `max` remain.
///
/// Returns the number of files removed.
///
/// # Errors
///
/// Returns `ReplayError::IoError` if the folder can't be listed or a file
/// can't be removed.
pub fn prune_oldest(dir: &Path, max: usize) -> Result<usize> {
    let mut files = list_replay_files(dir)?;
    let mut removed = 0;

    while files.len() > max {
        let Some(oldest) = oldest_file(&files) else {
            break;
        };
        std::fs::remove_file(&oldest)?;
        files.retain(|f| *f != oldest);
        removed += 1;
    }

    Ok(removed)
}

/// Creation time, or modification time where the platform doesn't record
/// creation.
fn created_at(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|meta| meta.created().or_else(|_| meta.modified()))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn oldest_file(files: &[PathBuf]) -> Option<PathBuf> {
    files.iter().min_by_key(|path| created_at(path)).cloned()
}

fn free_path(dir: &Path, stem: &str) -> PathBuf {
    let candidate = dir.join(format!("{stem}.{REPLAY_EXTENSION}"));
    if !candidate.exists() {
        return candidate;
    }

    (2u32..)
        .map(|n| dir.join(format!("{stem} ({n}).{REPLAY_EXTENSION}")))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}
