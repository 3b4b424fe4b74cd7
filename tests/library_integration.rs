//! Integration tests for the replay library: listing, retention and
//! archiving.

mod common;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use common::short_replay;
use duty_replay::error::ReplayError;
use duty_replay::library::{LibraryPaths, ReplayLibrary, RetentionPolicy};

fn library(root: &Path, max_auto_renamed: usize, max_deleted: usize) -> ReplayLibrary {
    ReplayLibrary::new(
        LibraryPaths::new(root),
        RetentionPolicy {
            max_auto_renamed,
            max_deleted,
        },
    )
}

fn replay_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".dat"))
        .collect();
    names.sort();
    names
}

/// File systems with coarse timestamps need a gap between files for
/// creation order to be observable.
fn tick() {
    std::thread::sleep(Duration::from_millis(20));
}

fn at(hour: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn zip_entries(path: &Path) -> Vec<String> {
    let zip = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
    names.sort();
    names
}

// ============================================================================
// Listing
// ============================================================================

#[test]
fn test_enumerate_skips_invalid_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let lib = library(root, 30, 10);

    short_replay().write(&root.join("good.dat"));
    std::fs::write(root.join("zeroes.dat"), vec![0u8; 0x400]).unwrap();
    std::fs::write(root.join("short.dat"), b"FFXIVREPLAY\0").unwrap();
    short_replay().write(&root.join("other.bin"));

    let entries = lib.enumerate();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].file_name(), Some("good.dat"));
    assert!(root.join("autorenamed").is_dir());
}

#[test]
fn test_enumerate_includes_auto_renamed() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir(root.join("autorenamed")).unwrap();
    short_replay().write(&root.join("a.dat"));
    short_replay().write(&root.join("autorenamed").join("b.dat"));

    let entries = library(root, 30, 10).enumerate();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].is_directly_in(root));
    assert!(!entries[1].is_directly_in(root));
}

#[test]
fn test_enumerate_missing_folder_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let lib = library(&dir.path().join("missing"), 0, 0);
    assert!(lib.enumerate().is_empty());
    assert!(lib.try_enumerate().is_err());
}

// ============================================================================
// Auto-rename and retention
// ============================================================================

#[test]
fn test_auto_rename_keeps_most_recent() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let lib = library(root, 3, 10);
    let slot = root.join("FFXIV_0000000000000001_000.dat");

    let mut renamed = Vec::new();
    for hour in 1..=5 {
        short_replay().write(&slot);
        let path = lib.auto_rename_at(&slot, "Sastasha", at(hour)).unwrap().unwrap();
        renamed.push(path);
        tick();
    }

    assert!(!slot.exists());
    assert_eq!(
        replay_names(&root.join("autorenamed")),
        vec![
            "Sastasha 2024.03.01 03.00.00.dat",
            "Sastasha 2024.03.01 04.00.00.dat",
            "Sastasha 2024.03.01 05.00.00.dat",
        ]
    );
    assert_eq!(
        replay_names(&root.join("deleted")),
        vec![
            "Sastasha 2024.03.01 01.00.00.dat",
            "Sastasha 2024.03.01 02.00.00.dat",
        ]
    );
    assert!(renamed[4].exists());
}

#[test]
fn test_auto_rename_sanitizes_and_avoids_collisions() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let lib = library(root, 30, 10);
    let slot = root.join("slot.dat");

    short_replay().write(&slot);
    let first = lib.auto_rename_at(&slot, "The Navel: Extreme?", at(9)).unwrap().unwrap();
    short_replay().write(&slot);
    let second = lib.auto_rename_at(&slot, "The Navel: Extreme?", at(9)).unwrap().unwrap();

    assert_eq!(
        first.file_name().unwrap(),
        "The Navel Extreme 2024.03.01 09.00.00.dat"
    );
    assert_eq!(
        second.file_name().unwrap(),
        "The Navel Extreme 2024.03.01 09.00.00 (2).dat"
    );
}

#[test]
fn test_auto_rename_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let slot = dir.path().join("slot.dat");
    short_replay().write(&slot);

    let lib = library(dir.path(), 0, 10);
    assert_eq!(lib.auto_rename_at(&slot, "Sastasha", at(1)).unwrap(), None);
    assert!(slot.exists());
}

#[test]
fn test_delete_moves_and_prunes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let lib = library(root, 30, 2);

    for name in ["a.dat", "b.dat", "c.dat"] {
        short_replay().write(&root.join(name));
        tick();
    }
    for name in ["a.dat", "b.dat", "c.dat"] {
        lib.delete(&root.join(name)).unwrap();
    }

    assert!(replay_names(root).is_empty());
    assert_eq!(replay_names(&root.join("deleted")), vec!["b.dat", "c.dat"]);
}

#[test]
fn test_delete_replaces_same_name() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let lib = library(root, 30, 5);

    short_replay().write(&root.join("a.dat"));
    lib.delete(&root.join("a.dat")).unwrap();
    short_replay().character(7).write(&root.join("a.dat"));
    lib.delete(&root.join("a.dat")).unwrap();

    assert_eq!(replay_names(&root.join("deleted")), vec!["a.dat"]);
    let (header, _) =
        duty_replay::replay::read_header_and_chapters(root.join("deleted").join("a.dat")).unwrap();
    assert_eq!(header.character_id, 7);
}

#[test]
fn test_delete_without_cap_removes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    short_replay().write(&root.join("a.dat"));

    library(root, 30, 0).delete(&root.join("a.dat")).unwrap();
    assert!(!root.join("a.dat").exists());
    assert!(!root.join("deleted").exists());
}

#[test]
fn test_rename() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let lib = library(root, 30, 10);
    std::fs::create_dir(root.join("autorenamed")).unwrap();
    let source = root.join("autorenamed").join("x.dat");
    short_replay().write(&source);
    short_replay().write(&root.join("Taken.dat"));

    assert!(lib.rename(&source, "bad/name").is_err());
    assert!(lib.rename(&source, "   ").is_err());
    assert!(lib.rename(&source, "Taken").is_err());
    assert!(source.exists());

    let renamed = lib.rename(&source, "My Clear").unwrap();
    assert_eq!(renamed, root.join("My Clear.dat"));
    assert!(renamed.exists());
    assert!(!source.exists());
}

#[test]
fn test_copy_into_slot() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let lib = library(root, 30, 10);
    short_replay().write(&root.join("clear.dat"));

    let slot = lib.copy_into_slot(&root.join("clear.dat"), 0x42, 2).unwrap();
    assert_eq!(slot, root.join("FFXIV_0000000000000042_002.dat"));
    assert!(root.join("clear.dat").exists());
    assert!(lib.copy_into_slot(&root.join("clear.dat"), 0x42, 3).is_err());
}

// ============================================================================
// Archiving
// ============================================================================

#[test]
fn test_archive_unplayable_replays() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let lib = library(root, 30, 10);
    std::fs::create_dir(root.join("autorenamed")).unwrap();

    short_replay().playable(false).write(&root.join("old1.dat"));
    short_replay().playable(false).write(&root.join("old2.dat"));
    short_replay().write(&root.join("current.dat"));
    short_replay()
        .playable(false)
        .write(&root.join("autorenamed").join("old3.dat"));

    assert_eq!(lib.archive().unwrap(), 2);
    assert!(!root.join("old1.dat").exists());
    assert!(!root.join("old2.dat").exists());
    assert!(root.join("current.dat").exists());
    assert!(root.join("autorenamed").join("old3.dat").exists());

    let archive = root.join("archive.zip");
    assert_eq!(zip_entries(&archive), vec!["old1.dat", "old2.dat"]);

    // a second run appends, renaming a clashing entry
    short_replay().playable(false).write(&root.join("old1.dat"));
    assert_eq!(lib.archive().unwrap(), 1);
    assert_eq!(
        zip_entries(&archive),
        vec!["old1 (2).dat", "old1.dat", "old2.dat"]
    );
}

#[test]
fn test_archive_nothing_to_do() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    short_replay().write(&root.join("current.dat"));

    assert_eq!(library(root, 30, 10).archive().unwrap(), 0);
    assert!(!root.join("archive.zip").exists());
}

#[test]
fn test_archive_failure_restores_container() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let lib = library(root, 30, 10);

    short_replay().playable(false).write(&root.join("first.dat"));
    assert_eq!(lib.archive().unwrap(), 1);
    let archive = root.join("archive.zip");
    let before = std::fs::read(&archive).unwrap();

    let present = root.join("second.dat");
    short_replay().playable(false).write(&present);
    let files: Vec<PathBuf> = vec![present.clone(), root.join("vanished.dat")];

    let err = lib.archive_files(&files).unwrap_err();
    assert!(matches!(err, ReplayError::Archive { .. }));
    assert_eq!(std::fs::read(&archive).unwrap(), before);
    assert!(present.exists());
}

#[test]
fn test_archive_failure_removes_new_container() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let lib = library(root, 30, 10);

    let present = root.join("first.dat");
    short_replay().playable(false).write(&present);

    let err = lib
        .archive_files(&[present.clone(), root.join("vanished.dat")])
        .unwrap_err();
    assert!(matches!(err, ReplayError::Archive { .. }));
    assert!(!root.join("archive.zip").exists());
    assert!(present.exists());
}
