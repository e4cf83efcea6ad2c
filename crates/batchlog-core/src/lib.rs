//! batchlog core library
//!
//! Infrastructure for unattended batch jobs: an asynchronous, file-backed
//! logger with daily files, numbered roll-over and archival of old logs,
//! an optional database sink, and drivers that walk directory trees.
//!
//! ## Overview
//!
//! Callers write through the [`LogSink`] trait. Every write is a cheap,
//! non-blocking enqueue; a background timer drains the queue into the log
//! file. Once a day the file sink sweeps old logs into per-year
//! directories, de-duplicating identical copies, and optionally zips year
//! directories that are old enough.
//!
//! ## Quick Start
//!
//! ```ignore
//! use batchlog_core::{FileSink, FileSinkConfig, LogLevel, LogSink};
//!
//! let sink = FileSink::new(
//!     FileSinkConfig::new("/var/log/nightly/Import").with_threshold(LogLevel::Info),
//! )?;
//!
//! sink.info("Import started");
//! if let Err(e) = run_import() {
//!     sink.error_with_cause("Import failed", &e);
//! }
//!
//! // Write everything still queued before exit.
//! sink.shutdown();
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod processing;

// Re-exports
pub use config::{DatabaseSinkConfig, FileSinkConfig};
pub use error::{LogError, LogResult};
pub use logging::{
    allow_log, ArchiveReport, ArchiveSweep, ConnectedSink, ConnectionInfo, DatabaseSink,
    DrainOutcome, FileSink, LogDispatcher, LogLevel, LogMessage, LogSink, SinkLayer,
    SqliteLogProcedure,
};
pub use processing::{
    AbortHandle, EntryHandler, LoggingObserver, ProcessingEvent, ProcessingObserver, TreeWalker,
    WalkOptions, WalkSummary, WalkTarget,
};
