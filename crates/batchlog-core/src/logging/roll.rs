//! Numbered backup rotation for non date-stamped log files.
//!
//! ```text
//! before:  App.txt  App.txt.1  App.txt.2  App.txt.3      (max = 3)
//! after:            App.txt.1  App.txt.2  App.txt.3
//!          (old .3 deleted, .2 -> .3, .1 -> .2, App.txt -> .1)
//! ```

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone};

/// Default number of numbered backups kept.
pub const DEFAULT_MAX_ROLLED_LOG_FILES: usize = 5;

/// Result of a roll attempt.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RollReport {
    /// The current file was renamed to `.1`
    pub rolled: bool,
    /// Per-generation failures
    pub warnings: Vec<String>,
}

/// Path of backup generation `n` (`App.txt` -> `App.txt.n`).
pub fn generation_path(path: &Path, n: usize) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(format!(".{}", n));
    PathBuf::from(name)
}

/// Whether `path` exists and was last written before local midnight of `today`.
pub fn needs_roll(path: &Path, today: NaiveDate) -> bool {
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => DateTime::<Local>::from(modified),
        Err(_) => return false,
    };
    match Local
        .from_local_datetime(&today.and_time(NaiveTime::MIN))
        .earliest()
    {
        Some(midnight) => modified < midnight,
        None => false,
    }
}

/// Shift `path` into the numbered backup chain, keeping at most `max` backups.
pub fn roll_generations(path: &Path, max: usize) -> RollReport {
    let max = max.max(1);
    let mut report = RollReport::default();

    if !path.exists() {
        return report;
    }

    let mut chain = 0;
    while generation_path(path, chain + 1).exists() {
        chain += 1;
    }

    // Generations at or beyond `max` would exceed the bound after shifting.
    for n in (max..=chain).rev() {
        let doomed = generation_path(path, n);
        if let Err(e) = fs::remove_file(&doomed) {
            report
                .warnings
                .push(format!("Failed to delete {}: {}", doomed.display(), e));
        }
    }

    for n in (1..=chain.min(max - 1)).rev() {
        let from = generation_path(path, n);
        let to = generation_path(path, n + 1);
        if let Err(warning) = move_generation(&from, &to) {
            report.warnings.push(warning);
        }
    }

    match move_generation(path, &generation_path(path, 1)) {
        Ok(()) => report.rolled = true,
        Err(warning) => report.warnings.push(warning),
    }

    report
}

fn move_generation(from: &Path, to: &Path) -> Result<(), String> {
    if to.exists() {
        fs::remove_file(to)
            .map_err(|e| format!("Failed to clear {}: {}", to.display(), e))?;
    }
    fs::rename(from, to).map_err(|e| {
        format!(
            "Failed to rename {} to {}: {}",
            from.display(),
            to.display(),
            e
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_generation_path() {
        assert_eq!(
            generation_path(Path::new("/logs/App.txt"), 2),
            PathBuf::from("/logs/App.txt.2")
        );
    }

    #[test]
    fn test_roll_missing_file_is_noop() {
        let temp = TempDir::new().unwrap();
        let report = roll_generations(&temp.path().join("App.txt"), 3);
        assert!(!report.rolled);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_roll_shifts_chain_in_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("App.txt");
        write(&path, "current");
        write(&generation_path(&path, 1), "one");
        write(&generation_path(&path, 2), "two");

        let report = roll_generations(&path, 5);

        assert!(report.rolled);
        assert!(!path.exists());
        assert_eq!(fs::read_to_string(generation_path(&path, 1)).unwrap(), "current");
        assert_eq!(fs::read_to_string(generation_path(&path, 2)).unwrap(), "one");
        assert_eq!(fs::read_to_string(generation_path(&path, 3)).unwrap(), "two");
    }

    #[test]
    fn test_roll_drops_oldest_beyond_max() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("App.txt");
        write(&path, "current");
        write(&generation_path(&path, 1), "one");
        write(&generation_path(&path, 2), "two");
        write(&generation_path(&path, 3), "three");

        let report = roll_generations(&path, 3);

        assert!(report.rolled, "{:?}", report.warnings);
        assert_eq!(fs::read_to_string(generation_path(&path, 3)).unwrap(), "two");
        assert!(!generation_path(&path, 4).exists());
    }

    #[test]
    fn test_roll_continues_past_failed_generation() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("App.txt");
        write(&path, "current");
        write(&generation_path(&path, 1), "one");
        let stuck = generation_path(&path, 2);
        fs::create_dir(&stuck).unwrap();
        write(&stuck.join("keep.txt"), "occupied");

        let report = roll_generations(&path, 2);

        assert!(!report.warnings.is_empty());
        assert!(report.rolled, "{:?}", report.warnings);
        assert!(!path.exists());
        assert_eq!(fs::read_to_string(generation_path(&path, 1)).unwrap(), "current");
        assert!(stuck.join("keep.txt").exists());
    }

    #[test]
    fn test_roll_max_zero_behaves_as_one() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("App.txt");
        write(&path, "current");
        write(&generation_path(&path, 1), "one");

        roll_generations(&path, 0);

        assert_eq!(fs::read_to_string(generation_path(&path, 1)).unwrap(), "current");
        assert!(!generation_path(&path, 2).exists());
    }

    #[test]
    fn test_needs_roll_compares_with_midnight() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("App.txt");
        assert!(!needs_roll(&path, Local::now().date_naive()));

        write(&path, "old");
        let two_days_ago = SystemTime::now() - Duration::from_secs(2 * 24 * 3600);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(two_days_ago)
            .unwrap();

        assert!(needs_roll(&path, Local::now().date_naive()));
        let long_ago = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        assert!(!needs_roll(&path, long_ago));
    }
}
