//! Severity levels and the threshold check.
//!
//! Levels are ordered by severity, most severe first:
//! `None < Fatal < Error < Warn < Info < Debug`. A threshold admits every
//! level at or below it, so `Debug` is the most permissive threshold and
//! `None` disables logging entirely.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Log severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    #[serde(alias = "none")]
    None = 0,
    #[serde(alias = "fatal")]
    Fatal = 1,
    #[serde(alias = "error")]
    Error = 2,
    #[serde(alias = "warn", alias = "warning")]
    Warn = 3,
    #[default]
    #[serde(alias = "info")]
    Info = 4,
    #[serde(alias = "debug")]
    Debug = 5,
}

impl LogLevel {
    /// The five levels a message can be written at.
    pub const WRITABLE: [LogLevel; 5] = [
        LogLevel::Fatal,
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
    ];

    /// Numeric severity (0 = none, 5 = debug).
    pub fn severity(self) -> u8 {
        self as u8
    }

    /// Upper-case name written into log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::None => "NONE",
            LogLevel::Fatal => "FATAL",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    /// Whether this level counts as an error for error tracking.
    pub fn is_error(self) -> bool {
        matches!(self, LogLevel::Fatal | LogLevel::Error)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(LogLevel::None),
            "fatal" => Ok(LogLevel::Fatal),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(LogError::InvalidLevel(s.to_string())),
        }
    }
}

/// Returns true iff a message at `level` passes `threshold`.
///
/// A `None` threshold rejects everything, and a `None` message is never
/// written.
pub fn allow_log(level: LogLevel, threshold: LogLevel) -> bool {
    if level == LogLevel::None || threshold == LogLevel::None {
        return false;
    }
    level <= threshold
}
