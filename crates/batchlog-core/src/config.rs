//! Sink configuration.
//!
//! Configs are plain serde structs with defaults for every field, so a JSON
//! file only needs to name what it changes:
//!
//! ```json
//! { "base_path": "/var/log/nightly/Import", "threshold": "WARN", "zip_old_directories": true }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LogError, LogResult};
use crate::logging::level::LogLevel;
use crate::logging::message::{LineStyle, TimestampFormat};
use crate::logging::roll::DEFAULT_MAX_ROLLED_LOG_FILES;
use crate::logging::timer::{DATABASE_DRAIN_INTERVAL, FILE_DRAIN_INTERVAL};

/// Configuration of a [`FileSink`](crate::logging::FileSink).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSinkConfig {
    /// Base name or path of the log file, without date or extension
    pub base_path: PathBuf,

    /// Write one `<base>_<yyyy-MM-dd>.txt` per day instead of rolling `<base>.txt`
    pub append_date: bool,

    /// Numbered backups kept when `append_date` is off (minimum 1)
    pub max_rolled_log_files: usize,

    /// Least severe level that is written
    pub threshold: LogLevel,

    /// Run the daily archival sweep
    pub archive_old_logs: bool,

    /// Zip year directories once they are old enough
    pub zip_old_directories: bool,

    pub timestamp_format: TimestampFormat,

    pub line_style: LineStyle,

    /// Timer interval between drains
    pub drain_interval_ms: u64,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("batchlog"),
            append_date: true,
            max_rolled_log_files: DEFAULT_MAX_ROLLED_LOG_FILES,
            threshold: LogLevel::Info,
            archive_old_logs: true,
            zip_old_directories: false,
            timestamp_format: TimestampFormat::default(),
            line_style: LineStyle::default(),
            drain_interval_ms: FILE_DRAIN_INTERVAL.as_millis() as u64,
        }
    }
}

impl FileSinkConfig {
    /// Default configuration writing to `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> LogResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()
    }

    /// Check the configuration, clamping `max_rolled_log_files` to at least 1.
    pub fn validate(mut self) -> LogResult<Self> {
        if self.base_path.as_os_str().is_empty() {
            return Err(LogError::InvalidConfig("base_path is empty".into()));
        }
        if self.drain_interval_ms == 0 {
            return Err(LogError::InvalidConfig(
                "drain_interval_ms must be positive".into(),
            ));
        }
        self.max_rolled_log_files = self.max_rolled_log_files.max(1);
        Ok(self)
    }

    pub fn with_append_date(mut self, append_date: bool) -> Self {
        self.append_date = append_date;
        self
    }

    pub fn with_max_rolled_log_files(mut self, max: usize) -> Self {
        self.max_rolled_log_files = max;
        self
    }

    pub fn with_threshold(mut self, threshold: LogLevel) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_archiving(mut self, archive_old_logs: bool, zip_old_directories: bool) -> Self {
        self.archive_old_logs = archive_old_logs;
        self.zip_old_directories = zip_old_directories;
        self
    }

    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    pub fn with_line_style(mut self, style: LineStyle) -> Self {
        self.line_style = style;
        self
    }

    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval_ms = interval.as_millis().max(1) as u64;
        self
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

/// Configuration of a [`DatabaseSink`](crate::logging::DatabaseSink).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSinkConfig {
    pub threshold: LogLevel,

    /// Also write successfully stored messages to the fallback file sink
    pub echo_to_file: bool,

    /// Additional attempts after a failed procedure call
    pub max_retries: u32,

    pub drain_interval_ms: u64,
}

impl Default for DatabaseSinkConfig {
    fn default() -> Self {
        Self {
            threshold: LogLevel::Info,
            echo_to_file: true,
            max_retries: 2,
            drain_interval_ms: DATABASE_DRAIN_INTERVAL.as_millis() as u64,
        }
    }
}

impl DatabaseSinkConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms.max(1))
    }
}
