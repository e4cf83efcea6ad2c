//! Error types for batchlog

use thiserror::Error;

/// Main error type for batchlog operations
///
/// Public logging entry points never return this type; it is used by the
/// configuration, archival and processing APIs and internally by the sinks
/// before a failure is turned into a diagnostic warning.
#[derive(Error, Debug)]
pub enum LogError {
    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The log directory could not be created or the log file opened
    #[error("Cannot open log file {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration was rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Unknown log level name
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Malformed wildcard pattern
    #[error("Invalid wildcard pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Malformed date regular expression
    #[error("Invalid date expression: {0}")]
    Regex(#[from] regex::Error),

    /// Zip archive creation or verification failed
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// SQLite error from the database sink
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The queue reported pending messages but none could be dequeued
    #[error("Queue inconsistent: {0}")]
    QueueInconsistent(String),

    /// Tree walk failed before any entry was processed
    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type alias using LogError
pub type LogResult<T> = Result<T, LogError>;
