//! Archival sweep integration tests
//!
//! Every sweep runs at a fixed local time so file ages are deterministic.

use std::fs;
use std::path::Path;

use batchlog_core::logging::archive::{count_zip_entries, ArchiveSweep, DateRule};
use chrono::{DateTime, Local, TimeZone};
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

fn at(year: i32, month: u32, day: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

// ============================================================================
// Moving Tests
// ============================================================================

#[test]
fn test_old_logs_move_to_year_directory() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    write(&dir.join("Import_2024-03-01.txt"), "march\n");
    write(&dir.join("Import_2023-12-31.txt"), "new year's eve\n");

    let report = ArchiveSweep::new(dir).run_at(at(2024, 6, 15));

    assert_eq!(report.moved.len(), 2);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(
        fs::read_to_string(dir.join("2024").join("Import_2024-03-01.txt")).unwrap(),
        "march\n"
    );
    assert!(dir.join("2023").join("Import_2023-12-31.txt").exists());
    assert!(!dir.join("Import_2024-03-01.txt").exists());
}

#[test]
fn test_recent_logs_stay() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    // 32 days old: kept. 33 days old: archived.
    write(&dir.join("Import_2024-05-14.txt"), "recent\n");
    write(&dir.join("Import_2024-05-13.txt"), "old enough\n");

    let report = ArchiveSweep::new(dir).run_at(at(2024, 6, 15));

    assert_eq!(report.moved, vec![dir.join("2024").join("Import_2024-05-13.txt")]);
    assert!(dir.join("Import_2024-05-14.txt").exists());
}

#[test]
fn test_legacy_names_are_archived() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    write(&dir.join("Import_01-20-2022.txt"), "legacy\n");

    let report = ArchiveSweep::new(dir).run_at(at(2024, 6, 15));

    assert_eq!(report.moved.len(), 1);
    assert!(dir.join("2022").join("Import_01-20-2022.txt").exists());
}

#[test]
fn test_unrelated_files_are_ignored() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    write(&dir.join("notes.txt"), "keep\n");
    write(&dir.join("Import.txt"), "rolled\n");
    write(&dir.join("Import.txt.1"), "rolled\n");
    write(&dir.join("Import_2020-01-01.csv"), "data\n");

    let report = ArchiveSweep::new(dir).run_at(at(2024, 6, 15));

    assert!(report.is_empty());
}

#[test]
fn test_custom_rule_without_day() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    write(&dir.join("Import_2024-05.log"), "month\n");
    write(&dir.join("Import_2024-04.log"), "month\n");
    let rule = DateRule::new("????-??", ".log", r"_(?P<Year>\d{4})-(?P<Month>\d{2})\.log$").unwrap();

    // May ends on the 31st, so it is only 15 days old on June 15.
    let report = ArchiveSweep::new(dir)
        .with_rules(vec![rule])
        .run_at(at(2024, 6, 15));

    assert_eq!(report.moved, vec![dir.join("2024").join("Import_2024-04.log")]);
}

// ============================================================================
// Collision Tests
// ============================================================================

#[test]
fn test_identical_copy_is_deduplicated() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    write(&dir.join("Import_2023-01-05.txt"), "same\n");
    write(&dir.join("2023").join("Import_2023-01-05.txt"), "same\n");

    let report = ArchiveSweep::new(dir).run_at(at(2024, 6, 15));

    assert_eq!(report.deduplicated, vec![dir.join("Import_2023-01-05.txt")]);
    assert!(report.moved.is_empty());
    assert!(!dir.join("Import_2023-01-05.txt").exists());
    assert_eq!(
        fs::read_to_string(dir.join("2023").join("Import_2023-01-05.txt")).unwrap(),
        "same\n"
    );
}

#[test]
fn test_different_copy_is_backed_up() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    write(&dir.join("Import_2023-01-05.txt"), "newer\n");
    write(&dir.join("2023").join("Import_2023-01-05.txt"), "older\n");

    let report = ArchiveSweep::new(dir).run_at(at(2024, 6, 15));

    assert_eq!(report.moved.len(), 1);
    assert_eq!(
        fs::read_to_string(dir.join("2023").join("Import_2023-01-05.txt")).unwrap(),
        "newer\n"
    );
    assert_eq!(
        fs::read_to_string(dir.join("2023").join("Import_2023-01-05.txt.bak")).unwrap(),
        "older\n"
    );
}

#[test]
fn test_sweep_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    write(&dir.join("Import_2023-01-05.txt"), "one\n");
    write(&dir.join("Import_2024-06-14.txt"), "recent\n");

    let first = ArchiveSweep::new(dir).run_at(at(2024, 6, 15));
    let second = ArchiveSweep::new(dir).run_at(at(2024, 6, 15));

    assert_eq!(first.moved.len(), 1);
    assert!(second.is_empty());
}

#[test]
fn test_missing_directory_is_not_an_error() {
    let temp = TempDir::new().unwrap();
    let report = ArchiveSweep::new(temp.path().join("absent")).run_at(at(2024, 6, 15));
    assert!(report.is_empty());
}

// ============================================================================
// Zip Tests
// ============================================================================

#[test]
fn test_old_year_is_zipped_into_archived() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    write(&dir.join("Import_2019-05-01.txt"), "a\n");
    write(&dir.join("2019").join("Import_2019-04-01.txt"), "b\n");

    let report = ArchiveSweep::new(dir)
        .zip_old_directories(true)
        .run_at(at(2024, 6, 15));

    let zip_path = dir.join("Archived").join("2019.zip");
    assert_eq!(report.zipped, vec![zip_path.clone()]);
    assert_eq!(count_zip_entries(&zip_path).unwrap(), 2);
    assert!(!dir.join("2019").exists());
    assert!(!dir.join("2019.zip").exists());
}

#[test]
fn test_previous_year_waits_for_grace_window() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    write(&dir.join("2023").join("Import_2023-11-01.txt"), "late\n");

    // March 1 is within 90 days of January 1.
    let early = ArchiveSweep::new(dir)
        .zip_old_directories(true)
        .run_at(at(2024, 3, 1));
    assert!(early.zipped.is_empty());
    assert!(dir.join("2023").exists());

    let later = ArchiveSweep::new(dir)
        .zip_old_directories(true)
        .run_at(at(2024, 6, 15));
    assert_eq!(later.zipped.len(), 1);
}

#[test]
fn test_zipping_is_off_by_default() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    write(&dir.join("2019").join("Import_2019-04-01.txt"), "b\n");

    let report = ArchiveSweep::new(dir).run_at(at(2024, 6, 15));

    assert!(report.zipped.is_empty());
    assert!(dir.join("2019").exists());
}

#[test]
fn test_existing_archive_is_not_overwritten() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    write(&dir.join("2019").join("Import_2019-04-01.txt"), "b\n");
    write(&dir.join("Archived").join("2019.zip"), "previous archive");

    let report = ArchiveSweep::new(dir)
        .zip_old_directories(true)
        .run_at(at(2024, 6, 15));

    assert!(report.zipped.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("already archived"));
    assert!(dir.join("2019").join("Import_2019-04-01.txt").exists());
    assert_eq!(
        fs::read_to_string(dir.join("Archived").join("2019.zip")).unwrap(),
        "previous archive"
    );
}
