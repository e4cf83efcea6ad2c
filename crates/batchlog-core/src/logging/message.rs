//! Log message value type and line rendering.
//!
//! A [`LogMessage`] is immutable once built: the timestamp is captured in UTC
//! at construction and the fields are only reachable through getters.

use std::error::Error;
use std::fmt;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::level::LogLevel;

/// Captured error cause attached to a message.
///
/// The error itself is not retained; its display text and the display text
/// of every `source()` in the chain are copied so the message can cross
/// threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCause {
    /// Top-level error text
    pub message: String,

    /// Source chain, outermost first (excluding `message`)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub chain: Vec<String>,
}

impl ErrorCause {
    /// Capture an error and its source chain.
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(inner) = source {
            chain.push(inner.to_string());
            source = inner.source();
        }
        Self {
            message: err.to_string(),
            chain,
        }
    }

    /// Build a cause from plain text (no chain).
    pub fn from_text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            chain: Vec::new(),
        }
    }

    /// Multi-line trace written after the message line.
    pub fn trace(&self) -> String {
        let mut out = format!("Error: {}", self.message);
        for (depth, inner) in self.chain.iter().enumerate() {
            out.push_str(&format!("\n  Caused by ({}): {}", depth + 1, inner));
        }
        out
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Timestamp rendering modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// `MM/dd/yyyy hh:mm:ss AM`
    MonthDayYear12h,
    /// `MM/dd/yyyy HH:mm:ss`
    MonthDayYear24h,
    /// `yyyy-MM-dd hh:mm:ss AM`
    YearMonthDay12h,
    /// `yyyy-MM-dd HH:mm:ss`
    #[default]
    YearMonthDay24h,
}

impl TimestampFormat {
    /// chrono format string for this mode.
    pub fn pattern(self) -> &'static str {
        match self {
            TimestampFormat::MonthDayYear12h => "%m/%d/%Y %I:%M:%S %p",
            TimestampFormat::MonthDayYear24h => "%m/%d/%Y %H:%M:%S",
            TimestampFormat::YearMonthDay12h => "%Y-%m-%d %I:%M:%S %p",
            TimestampFormat::YearMonthDay24h => "%Y-%m-%d %H:%M:%S",
        }
    }
}

/// Field layout of a rendered line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    /// `<timestamp>\t<text>\t<LEVEL>`
    Tab,
    /// `<timestamp>, <text>, <LEVEL>`
    #[default]
    Comma,
    /// One JSON object per line
    Json,
}

/// A single log message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    level: LogLevel,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    cause: Option<ErrorCause>,
    #[serde(rename = "ts")]
    timestamp_utc: DateTime<Utc>,
}

impl LogMessage {
    /// Create a message stamped with the current time.
    pub fn new(level: LogLevel, text: impl Into<String>) -> Self {
        Self::at(level, text, None, Utc::now())
    }

    /// Create a message carrying an error cause.
    pub fn with_cause(
        level: LogLevel,
        text: impl Into<String>,
        cause: &(dyn Error + 'static),
    ) -> Self {
        Self::at(level, text, Some(ErrorCause::from_error(cause)), Utc::now())
    }

    /// Create a message with an explicit timestamp (replay, imports, tests).
    pub fn at(
        level: LogLevel,
        text: impl Into<String>,
        cause: Option<ErrorCause>,
        timestamp_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            level,
            text: text.into(),
            cause,
            timestamp_utc,
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    pub fn timestamp_utc(&self) -> DateTime<Utc> {
        self.timestamp_utc
    }

    /// Local calendar date of the message, used to pick the log file.
    pub fn local_date(&self) -> NaiveDate {
        self.timestamp_utc.with_timezone(&Local).date_naive()
    }

    /// Timestamp rendered in local time.
    pub fn format_timestamp(&self, format: TimestampFormat) -> String {
        self.timestamp_utc
            .with_timezone(&Local)
            .format(format.pattern())
            .to_string()
    }

    /// Render the message as a single line (no trailing newline).
    pub fn render(&self, format: TimestampFormat, style: LineStyle) -> String {
        match style {
            LineStyle::Tab => format!(
                "{}\t{}\t{}",
                self.format_timestamp(format),
                self.text,
                self.level
            ),
            LineStyle::Comma => format!(
                "{}, {}, {}",
                self.format_timestamp(format),
                self.text,
                self.level
            ),
            // Serializing plain strings and a timestamp cannot fail; fall
            // back to the comma layout rather than lose the line.
            LineStyle::Json => serde_json::to_string(self)
                .unwrap_or_else(|_| self.render(format, LineStyle::Comma)),
        }
    }
}
