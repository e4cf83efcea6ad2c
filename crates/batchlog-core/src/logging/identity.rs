//! Log file naming.
//!
//! ```text
//! append_date = true    <base>_2024-01-05.txt   (new file each local day)
//! append_date = false   <base>.txt              (rolled to .1, .2, ...)
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};

/// Extension of every log file.
pub const LOG_EXTENSION: &str = ".txt";

/// Date segment format inside file names.
pub const FILE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Resolved identity of the current log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileIdentity {
    base: PathBuf,
    append_date: bool,
    current_date: Option<NaiveDate>,
    current_path: PathBuf,
}

impl LogFileIdentity {
    /// Build an identity for `base_path`.
    ///
    /// Relative paths resolve against the working directory. A trailing
    /// `.txt` on the base is dropped so `App.txt` and `App` name the same
    /// lineage.
    pub fn new(base_path: impl AsRef<Path>, append_date: bool) -> Self {
        let base = normalize_base(base_path.as_ref());
        let today = Local::now().date_naive();
        let current_path = compose_path(&base, append_date, today);
        Self {
            base,
            append_date,
            current_date: None,
            current_path,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn append_date(&self) -> bool {
        self.append_date
    }

    /// Date of the last message routed through this identity.
    pub fn current_date(&self) -> Option<NaiveDate> {
        self.current_date
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    /// Directory holding the log files.
    pub fn log_dir(&self) -> PathBuf {
        self.base
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// File name of the base without directories (e.g. `App`).
    pub fn base_file_name(&self) -> String {
        self.base
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Path of the log file for `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        compose_path(&self.base, self.append_date, date)
    }

    /// Move the identity to `date`.
    ///
    /// Returns true when the date changed (a rollover), in which case the
    /// current path has been recomputed.
    pub fn advance_to(&mut self, date: NaiveDate) -> bool {
        if self.current_date == Some(date) {
            return false;
        }
        self.current_date = Some(date);
        self.current_path = self.path_for(date);
        true
    }
}

fn normalize_base(base: &Path) -> PathBuf {
    let base = match base.extension() {
        Some(ext) if ext.eq_ignore_ascii_case(&LOG_EXTENSION[1..]) => base.with_extension(""),
        _ => base.to_path_buf(),
    };
    if base.is_absolute() {
        base
    } else {
        std::env::current_dir()
            .map(|dir| dir.join(&base))
            .unwrap_or(base)
    }
}

fn compose_path(base: &Path, append_date: bool, date: NaiveDate) -> PathBuf {
    let mut name: OsString = base.as_os_str().to_owned();
    if append_date {
        name.push("_");
        name.push(date.format(FILE_DATE_FORMAT).to_string());
    }
    name.push(LOG_EXTENSION);
    PathBuf::from(name)
}
