//! Archival sweep for old log files.
//!
//! ```text
//! logs/App_2024-01-05.txt            (older than 32 days)
//!   -> logs/2024/App_2024-01-05.txt   (moved, deduplicated by SHA-1)
//! logs/2019/                          (year no longer current or previous)
//!   -> logs/2019.zip                  (entry count verified, sources deleted)
//!   -> logs/Archived/2019.zip
//! ```
//!
//! The sweep never fails: every problem is recorded as a warning string in
//! the returned [`ArchiveReport`].

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Local, NaiveDate};
use regex::Regex;
use sha1::{Digest, Sha1};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::LogResult;

use super::identity::LOG_EXTENSION;

/// Files are archived once their date is more than this many days old.
pub const ARCHIVE_AGE_DAYS: i64 = 32;

/// The previous year's directory is zipped only this many days after Jan 1.
pub const ZIP_GRACE_DAYS: i64 = 90;

/// Terminal directory for finished zip archives.
pub const ARCHIVED_DIR_NAME: &str = "Archived";

/// How to recognize a date-stamped log file and extract its date.
#[derive(Debug, Clone)]
pub struct DateRule {
    file_pattern: glob::Pattern,
    date_regex: Regex,
}

impl DateRule {
    /// Build a rule.
    ///
    /// Files match `*_<date_glob><extension>`; `date_regex` must define the
    /// named groups `Year` and `Month` and may define `Day`.
    pub fn new(date_glob: &str, extension: &str, date_regex: &str) -> LogResult<Self> {
        Ok(Self {
            file_pattern: glob::Pattern::new(&format!("*_{}{}", date_glob, extension))?,
            date_regex: Regex::new(date_regex)?,
        })
    }

    /// `<name>_yyyy-MM-dd.txt`
    pub fn current() -> Self {
        Self::new(
            "????-??-??",
            LOG_EXTENSION,
            r"_(?P<Year>\d{4})-(?P<Month>\d{2})-(?P<Day>\d{2})\.txt$",
        )
        .expect("built-in date rule is valid")
    }

    /// `<name>_MM-dd-yyyy.txt`, written by older releases
    pub fn legacy() -> Self {
        Self::new(
            "??-??-????",
            LOG_EXTENSION,
            r"_(?P<Month>\d{2})-(?P<Day>\d{2})-(?P<Year>\d{4})\.txt$",
        )
        .expect("built-in legacy date rule is valid")
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.file_pattern.matches(file_name)
    }

    /// Date embedded in `file_name`.
    ///
    /// Without a `Day` group the last day of the month is used, so a
    /// month-stamped file is never archived early.
    pub fn parse_date(&self, file_name: &str) -> Option<NaiveDate> {
        let caps = self.date_regex.captures(file_name)?;
        let year: i32 = caps.name("Year")?.as_str().parse().ok()?;
        let month: u32 = caps.name("Month")?.as_str().parse().ok()?;
        match caps.name("Day") {
            Some(day) => NaiveDate::from_ymd_opt(year, month, day.as_str().parse().ok()?),
            None => last_day_of_month(year, month),
        }
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// What a sweep did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    /// Files moved into year directories (new location)
    pub moved: Vec<PathBuf>,
    /// Source files deleted because an identical copy was already archived
    pub deduplicated: Vec<PathBuf>,
    /// Zip archives created (final location under `Archived/`)
    pub zipped: Vec<PathBuf>,
    /// Everything that went wrong
    pub warnings: Vec<String>,
}

impl ArchiveReport {
    /// True when the sweep changed nothing and reported nothing.
    pub fn is_empty(&self) -> bool {
        self.moved.is_empty()
            && self.deduplicated.is_empty()
            && self.zipped.is_empty()
            && self.warnings.is_empty()
    }
}

/// Archival sweep over one log directory.
#[derive(Debug, Clone)]
pub struct ArchiveSweep {
    log_dir: PathBuf,
    rules: Vec<DateRule>,
    zip_old_directories: bool,
}

impl ArchiveSweep {
    /// Sweep `log_dir` using the current and legacy date rules.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            rules: vec![DateRule::current(), DateRule::legacy()],
            zip_old_directories: false,
        }
    }

    /// Replace the date rules.
    pub fn with_rules(mut self, rules: Vec<DateRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Enable zipping of old year directories.
    pub fn zip_old_directories(mut self, enabled: bool) -> Self {
        self.zip_old_directories = enabled;
        self
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Run the sweep against the current local time.
    pub fn run(&self) -> ArchiveReport {
        self.run_at(Local::now())
    }

    /// Run the sweep as if the local time were `now`.
    pub fn run_at(&self, now: DateTime<Local>) -> ArchiveReport {
        let today = now.date_naive();
        let mut report = ArchiveReport::default();

        if !self.log_dir.is_dir() {
            return report;
        }

        for (path, date) in self.collect_candidates(&mut report) {
            if (today - date).num_days() <= ARCHIVE_AGE_DAYS {
                continue;
            }
            self.archive_file(&path, date.year(), &mut report);
        }

        if self.zip_old_directories {
            self.zip_old_years(today, &mut report);
        }

        report
    }

    fn collect_candidates(&self, report: &mut ArchiveReport) -> Vec<(PathBuf, NaiveDate)> {
        let entries = match fs::read_dir(&self.log_dir) {
            Ok(entries) => entries,
            Err(e) => {
                report.warnings.push(format!(
                    "Cannot list {}: {}",
                    self.log_dir.display(),
                    e
                ));
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(rule) = self.rules.iter().find(|r| r.matches(&name)) else {
                continue;
            };
            match rule.parse_date(&name).or_else(|| modified_date(&path)) {
                Some(date) => candidates.push((path, date)),
                None => report
                    .warnings
                    .push(format!("Cannot determine date of {}", path.display())),
            }
        }
        candidates.sort();
        candidates
    }

    fn archive_file(&self, source: &Path, year: i32, report: &mut ArchiveReport) {
        let Some(file_name) = source.file_name() else {
            return;
        };
        let year_dir = self.log_dir.join(format!("{:04}", year));
        if let Err(e) = fs::create_dir_all(&year_dir) {
            report
                .warnings
                .push(format!("Cannot create {}: {}", year_dir.display(), e));
            return;
        }

        let target = year_dir.join(file_name);
        if target.exists() {
            match same_content(source, &target) {
                Ok(true) => {
                    match fs::remove_file(source) {
                        Ok(()) => report.deduplicated.push(source.to_path_buf()),
                        Err(e) => report.warnings.push(format!(
                            "Cannot delete duplicate {}: {}",
                            source.display(),
                            e
                        )),
                    }
                    return;
                }
                Ok(false) => {
                    if let Err(warning) = back_up(&target) {
                        report.warnings.push(warning);
                    }
                    if target.exists() {
                        report.warnings.push(format!(
                            "Skipping {}: {} already exists with different content",
                            source.display(),
                            target.display()
                        ));
                        return;
                    }
                }
                Err(e) => {
                    report.warnings.push(format!(
                        "Cannot compare {} with {}: {}",
                        source.display(),
                        target.display(),
                        e
                    ));
                    return;
                }
            }
        }

        match move_file(source, &target) {
            Ok(()) => report.moved.push(target),
            Err(e) => report.warnings.push(format!(
                "Cannot move {} to {}: {}",
                source.display(),
                target.display(),
                e
            )),
        }
    }

    fn zip_old_years(&self, today: NaiveDate, report: &mut ArchiveReport) {
        let entries = match fs::read_dir(&self.log_dir) {
            Ok(entries) => entries,
            Err(e) => {
                report.warnings.push(format!(
                    "Cannot list {}: {}",
                    self.log_dir.display(),
                    e
                ));
                return;
            }
        };

        let mut years: Vec<(i32, PathBuf)> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                parse_year_dir(&name).map(|year| (year, e.path()))
            })
            .filter(|(year, _)| year_is_zippable(*year, today))
            .collect();
        years.sort();

        for (year, dir) in years {
            self.zip_year(year, &dir, report);
        }
    }

    fn zip_year(&self, year: i32, dir: &Path, report: &mut ArchiveReport) {
        let zip_name = format!("{:04}.zip", year);
        let zip_path = self.log_dir.join(&zip_name);
        let archived_dir = self.log_dir.join(ARCHIVED_DIR_NAME);
        let archived_path = archived_dir.join(&zip_name);

        if archived_path.exists() {
            report.warnings.push(format!(
                "{} already archived; leaving {} in place",
                archived_path.display(),
                dir.display()
            ));
            return;
        }
        if zip_path.exists() {
            report.warnings.push(format!(
                "{} already exists; not zipping {}",
                zip_path.display(),
                dir.display()
            ));
            return;
        }

        let mut sources: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        sources.sort();

        if sources.is_empty() {
            remove_year_dir(dir, report);
            return;
        }

        if let Err(e) = write_zip(dir, &sources, &zip_path) {
            report.warnings.push(format!(
                "Cannot create {}: {}",
                zip_path.display(),
                e
            ));
            let _ = fs::remove_file(&zip_path);
            return;
        }

        if !commit_zip(&zip_path, &sources, report) {
            return;
        }

        remove_year_dir(dir, report);

        if let Err(e) = fs::create_dir_all(&archived_dir) {
            report.warnings.push(format!(
                "Cannot create {}: {}",
                archived_dir.display(),
                e
            ));
            return;
        }
        match move_file(&zip_path, &archived_path) {
            Ok(()) => report.zipped.push(archived_path),
            Err(e) => report.warnings.push(format!(
                "Cannot move {} to {}: {}",
                zip_path.display(),
                archived_path.display(),
                e
            )),
        }
    }
}

/// Whether the year directory for `year` should be zipped on `today`.
pub fn year_is_zippable(year: i32, today: NaiveDate) -> bool {
    let current = today.year();
    if year >= current {
        return false;
    }
    if year < current - 1 {
        return true;
    }
    match NaiveDate::from_ymd_opt(current, 1, 1) {
        Some(jan_first) => (today - jan_first).num_days() > ZIP_GRACE_DAYS,
        None => false,
    }
}

fn parse_year_dir(name: &str) -> Option<i32> {
    if name.len() == 4 && name.bytes().all(|b| b.is_ascii_digit()) {
        name.parse().ok()
    } else {
        None
    }
}

fn remove_year_dir(dir: &Path, report: &mut ArchiveReport) {
    if let Err(e) = fs::remove_dir_all(dir) {
        report
            .warnings
            .push(format!("Cannot remove {}: {}", dir.display(), e));
    }
}

fn modified_date(path: &Path) -> Option<NaiveDate> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Local>::from(modified).date_naive())
}

/// SHA-1 of a file's content.
pub fn sha1_file(path: &Path) -> io::Result<[u8; 20]> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let mut digest = [0u8; 20];
    digest.copy_from_slice(&hasher.finalize());
    Ok(digest)
}

fn same_content(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    let (hash_a, hash_b) = (sha1_file(a)?, sha1_file(b)?);
    if hash_a != hash_b {
        tracing::debug!(
            source = %a.display(),
            target = %b.display(),
            "Same size, different hash ({} vs {})",
            hex::encode(hash_a),
            hex::encode(hash_b)
        );
    }
    Ok(hash_a == hash_b)
}

/// Rename `target` to the first free `<name>.bak`, `<name>.bak2`, ...
fn back_up(target: &Path) -> Result<PathBuf, String> {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let backup = (1..=100)
        .map(|n| {
            let suffix = if n == 1 { String::new() } else { n.to_string() };
            target.with_file_name(format!("{}.bak{}", name, suffix))
        })
        .find(|candidate| !candidate.exists())
        .ok_or_else(|| format!("No free backup name for {}", target.display()))?;

    fs::rename(target, &backup).map_err(|e| {
        format!(
            "Cannot back up {} to {}: {}",
            target.display(),
            backup.display(),
            e
        )
    })?;
    Ok(backup)
}

/// Rename, falling back to copy + delete across file systems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

fn write_zip(root: &Path, sources: &[PathBuf], zip_path: &Path) -> LogResult<()> {
    let mut zip = ZipWriter::new(File::create(zip_path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for source in sources {
        let relative = source.strip_prefix(root).unwrap_or(source);
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(name, options)?;
        let mut file = File::open(source)?;
        io::copy(&mut file, &mut zip)?;
    }

    zip.finish()?;
    Ok(())
}

/// Number of entries in a zip archive.
pub fn count_zip_entries(zip_path: &Path) -> LogResult<usize> {
    let archive = ZipArchive::new(File::open(zip_path)?)?;
    Ok(archive.len())
}

/// Verify `zip_path` holds at least one entry per source, then delete the
/// sources.
///
/// On a failed verification the sources are kept, the untrusted zip is
/// removed so a later sweep can retry, and false is returned.
pub(crate) fn commit_zip(zip_path: &Path, sources: &[PathBuf], report: &mut ArchiveReport) -> bool {
    match count_zip_entries(zip_path) {
        Ok(entries) if entries >= sources.len() => {
            for source in sources {
                if let Err(e) = fs::remove_file(source) {
                    report.warnings.push(format!(
                        "Cannot delete zipped file {}: {}",
                        source.display(),
                        e
                    ));
                }
            }
            true
        }
        Ok(entries) => {
            report.warnings.push(format!(
                "{} holds {} entries but {} files were added; sources kept",
                zip_path.display(),
                entries,
                sources.len()
            ));
            let _ = fs::remove_file(zip_path);
            false
        }
        Err(e) => {
            report.warnings.push(format!(
                "Cannot verify {}: {}; sources kept",
                zip_path.display(),
                e
            ));
            let _ = fs::remove_file(zip_path);
            false
        }
    }
}
