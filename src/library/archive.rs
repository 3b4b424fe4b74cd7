//! Archiving replays the running client can no longer play.
//!
//! Archiving is all-or-nothing. The container is copied to a backup before
//! it is touched, every replay is appended, and the entry count is checked
//! by reopening the container. Source files are deleted only after that
//! check passes. On any failure the container is restored from the backup
//! (or removed, if this run created it) and no source file is deleted.
//!
//! Entry counts come from the end-of-central-directory record, not from
//! the zip reader, which keeps one entry per name. A container whose
//! record lists more entries than it has distinct names is refused.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::ReplayLibrary;
use crate::binary::{read_u16_le, read_u32_le, read_u64_le};
use crate::error::{ReplayError, Result};

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const EOCD_LEN: usize = 22;
const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;
const ZIP64_LOCATOR_LEN: usize = 20;
const ZIP64_EOCD_SIGNATURE: u32 = 0x0606_4b50;
const ZIP64_EOCD_LEN: usize = 56;

/// The end record, a maximal comment and a zip64 locator.
const MAX_TAIL_LEN: u64 = 22 + 0xFFFF + 20;

impl ReplayLibrary {
    /// Returns the listed replays eligible for archiving: those marked not
    /// playable that sit directly in the primary folder.
    #[must_use]
    pub fn archive_candidates(&self) -> Vec<PathBuf> {
        self.enumerate()
            .into_iter()
            .filter(|entry| !entry.header.is_playable() && entry.is_directly_in(&self.paths.primary))
            .map(|entry| entry.path)
            .collect()
    }

    /// Archives every eligible replay. Returns how many were archived.
    ///
    /// # Errors
    ///
    /// See [`ReplayLibrary::archive_files`].
    pub fn archive(&self) -> Result<usize> {
        let candidates = self.archive_candidates();
        if candidates.is_empty() {
            return Ok(0);
        }
        self.archive_files(&candidates)
    }

    /// Appends `files` to the archive container, then deletes them.
    ///
    /// Each entry takes the source file's name unless the container
    /// already holds that name, in which case it is stored as
    /// `<stem> (2).<ext>`, `<stem> (3).<ext>` and so on. An entry's name
    /// therefore need not match the file it came from, and extracting the
    /// container elsewhere yields the suffixed names.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::Archive` if the container already holds two
    /// entries with the same name, or if appending or the entry count
    /// check fails. The container is then byte-identical to its previous
    /// state and every file in `files` is left in place.
    pub fn archive_files(&self, files: &[PathBuf]) -> Result<usize> {
        let archive = &self.paths.archive;
        let backup = self.paths.archive_backup();
        let existed = archive.exists();

        if existed {
            std::fs::copy(archive, &backup).map_err(|e| ReplayError::Archive {
                reason: format!("could not back up {}: {e}", archive.display()),
            })?;
        }

        if let Err(e) = append_entries(archive, existed, files) {
            restore(archive, &backup, existed);
            error!(archive = %archive.display(), error = %e, "archiving failed, restored backup");
            return Err(match e {
                ReplayError::Archive { .. } => e,
                other => ReplayError::Archive {
                    reason: other.to_string(),
                },
            });
        }

        for file in files {
            if let Err(e) = std::fs::remove_file(file) {
                warn!(path = %file.display(), error = %e, "archived replay could not be removed");
            }
        }

        info!(archive = %archive.display(), count = files.len(), "archived replays");
        Ok(files.len())
    }
}

fn append_entries(archive: &Path, existed: bool, files: &[PathBuf]) -> Result<()> {
    let (mut writer, mut names, mut expected) = if existed {
        let recorded = central_directory_entries(archive)?;
        let names = entry_names(archive)?;
        if recorded != names.len() {
            return Err(ReplayError::Archive {
                reason: format!(
                    "{} lists {recorded} entries under {} distinct names",
                    archive.display(),
                    names.len()
                ),
            });
        }
        let file = OpenOptions::new().read(true).write(true).open(archive)?;
        (ZipWriter::new_append(file)?, names, recorded)
    } else {
        (ZipWriter::new(File::create(archive)?), HashSet::new(), 0)
    };

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for path in files {
        let mut source = File::open(path)?;
        let name = unique_entry_name(path, &names)?;
        writer.start_file(name.as_str(), options)?;
        std::io::copy(&mut source, &mut writer)?;
        names.insert(name);
        expected += 1;
    }
    writer.finish()?;

    let recorded = central_directory_entries(archive)?;
    let readable = ZipArchive::new(File::open(archive)?)?.len();
    if recorded != expected || readable != expected {
        return Err(ReplayError::Archive {
            reason: format!(
                "expected {expected} entries after archiving, found {recorded} ({readable} readable)"
            ),
        });
    }
    Ok(())
}

/// Reads the total entry count from the container's end-of-central-directory
/// record, following the zip64 locator when the count overflows 16 bits.
fn central_directory_entries(archive: &Path) -> Result<usize> {
    let mut file = File::open(archive)?;
    let file_len = file.metadata()?.len();
    let tail_len = file_len.min(MAX_TAIL_LEN);
    file.seek(SeekFrom::Start(file_len - tail_len))?;
    let mut tail = Vec::new();
    Read::by_ref(&mut file).take(tail_len).read_to_end(&mut tail)?;

    let eocd = (0..=tail.len().saturating_sub(EOCD_LEN))
        .rev()
        .find(|&i| read_u32_le(&tail, i).is_ok_and(|sig| sig == EOCD_SIGNATURE))
        .ok_or_else(|| ReplayError::Archive {
            reason: format!("{} has no end of central directory", archive.display()),
        })?;

    let total = read_u16_le(&tail, eocd + 10)?;
    if total != u16::MAX {
        return Ok(usize::from(total));
    }

    let Some(locator) = eocd
        .checked_sub(ZIP64_LOCATOR_LEN)
        .filter(|&i| read_u32_le(&tail, i).is_ok_and(|sig| sig == ZIP64_LOCATOR_SIGNATURE))
    else {
        return Ok(usize::from(total));
    };

    let mut record = [0u8; ZIP64_EOCD_LEN];
    file.seek(SeekFrom::Start(read_u64_le(&tail, locator + 8)?))?;
    file.read_exact(&mut record)?;
    if read_u32_le(&record, 0)? != ZIP64_EOCD_SIGNATURE {
        return Err(ReplayError::Archive {
            reason: format!("{} has a broken zip64 locator", archive.display()),
        });
    }

    let total = read_u64_le(&record, 32)?;
    usize::try_from(total).map_err(|_| ReplayError::Archive {
        reason: format!("{} lists {total} entries", archive.display()),
    })
}

fn entry_names(archive: &Path) -> Result<HashSet<String>> {
    let zip = ZipArchive::new(File::open(archive)?)?;
    Ok(zip.file_names().map(str::to_string).collect())
}

fn unique_entry_name(path: &Path, taken: &HashSet<String>) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ReplayError::Archive {
            reason: format!("{} has no usable file name", path.display()),
        })?;

    if !taken.contains(name) {
        return Ok(name.to_string());
    }

    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    let extension = Path::new(name)
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    Ok((2u32..)
        .map(|n| format!("{stem} ({n}){extension}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string()))
}

fn restore(archive: &Path, backup: &Path, existed: bool) {
    let result = if existed {
        std::fs::copy(backup, archive).map(|_| ())
    } else if archive.exists() {
        std::fs::remove_file(archive)
    } else {
        Ok(())
    };

    if let Err(e) = result {
        error!(archive = %archive.display(), error = %e, "could not restore archive");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{LibraryPaths, RetentionPolicy};

    /// Builds a container of empty stored entries, one per name, without
    /// going through `ZipWriter` so names may repeat.
    fn stored_container(names: &[&str]) -> Vec<u8> {
        const DOS_DATE: u16 = (44 << 9) | (1 << 5) | 1;
        let mut out = Vec::new();
        let mut central = Vec::new();

        for name in names {
            let offset = u32::try_from(out.len()).unwrap();
            let name_len = u16::try_from(name.len()).unwrap();

            out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&[0; 4]); // flags, method
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&DOS_DATE.to_le_bytes());
            out.extend_from_slice(&[0; 12]); // crc, sizes
            out.extend_from_slice(&name_len.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(name.as_bytes());

            central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&[0; 4]); // flags, method
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&DOS_DATE.to_le_bytes());
            central.extend_from_slice(&[0; 12]); // crc, sizes
            central.extend_from_slice(&name_len.to_le_bytes());
            central.extend_from_slice(&[0; 12]); // extra, comment, disk, attributes
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(name.as_bytes());
        }

        let count = u16::try_from(names.len()).unwrap();
        let cd_offset = u32::try_from(out.len()).unwrap();
        let cd_len = u32::try_from(central.len()).unwrap();
        out.extend_from_slice(&central);
        out.extend_from_slice(&EOCD_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&[0; 4]); // disk numbers
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&cd_len.to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    // ========================================================================
    // Entry counting
    // ========================================================================

    #[test]
    fn test_central_directory_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive.zip");

        std::fs::write(&archive, stored_container(&["a.dat", "b.dat", "c.dat"])).unwrap();
        assert_eq!(central_directory_entries(&archive).unwrap(), 3);

        std::fs::write(&archive, stored_container(&["old.dat", "old.dat"])).unwrap();
        assert_eq!(central_directory_entries(&archive).unwrap(), 2);

        std::fs::write(&archive, b"not a container").unwrap();
        assert!(central_directory_entries(&archive).is_err());
    }

    #[test]
    fn test_archive_refuses_container_with_repeated_names() {
        let dir = tempfile::tempdir().unwrap();
        let lib = ReplayLibrary::new(LibraryPaths::new(dir.path()), RetentionPolicy::default());
        let archive = lib.paths().archive.clone();

        let original = stored_container(&["old.dat", "old.dat"]);
        std::fs::write(&archive, &original).unwrap();
        let replay = dir.path().join("new.dat");
        std::fs::write(&replay, b"replay").unwrap();

        let err = lib.archive_files(&[replay.clone()]).unwrap_err();
        assert!(matches!(err, ReplayError::Archive { .. }));
        assert_eq!(std::fs::read(&archive).unwrap(), original);
        assert!(replay.exists());
    }

    #[test]
    fn test_archive_into_container_with_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let lib = ReplayLibrary::new(LibraryPaths::new(dir.path()), RetentionPolicy::default());
        let archive = lib.paths().archive.clone();

        std::fs::write(&archive, stored_container(&["old.dat"])).unwrap();
        let replay = dir.path().join("old.dat");
        std::fs::write(&replay, b"replay").unwrap();

        assert_eq!(lib.archive_files(&[replay.clone()]).unwrap(), 1);
        assert!(!replay.exists());
        assert_eq!(central_directory_entries(&archive).unwrap(), 2);
        let zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert!(zip.file_names().any(|n| n == "old (2).dat"));
    }

    // ========================================================================
    // Naming and restore
    // ========================================================================

    #[test]
    fn test_unique_entry_name() {
        let mut taken = HashSet::new();
        let path = Path::new("replay/FFXIV_0_000.dat");
        assert_eq!(unique_entry_name(path, &taken).unwrap(), "FFXIV_0_000.dat");

        taken.insert("FFXIV_0_000.dat".to_string());
        assert_eq!(unique_entry_name(path, &taken).unwrap(), "FFXIV_0_000 (2).dat");

        taken.insert("FFXIV_0_000 (2).dat".to_string());
        assert_eq!(unique_entry_name(path, &taken).unwrap(), "FFXIV_0_000 (3).dat");
    }

    #[test]
    fn test_restore_removes_new_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive.zip");
        std::fs::write(&archive, b"partial").unwrap();

        restore(&archive, &dir.path().join("archive.zip.BACKUP"), false);
        assert!(!archive.exists());
    }

    #[test]
    fn test_restore_copies_backup() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive.zip");
        let backup = dir.path().join("archive.zip.BACKUP");
        std::fs::write(&archive, b"partial").unwrap();
        std::fs::write(&backup, b"original").unwrap();

        restore(&archive, &backup, true);
        assert_eq!(std::fs::read(&archive).unwrap(), b"original");
    }
}
