//! Queued, file-backed logging.
//!
//! ## Architecture
//!
//! ```text
//! caller ──write_log──► threshold ──► MessageQueue ◄── DrainTimer (500 ms)
//!                                          │
//!                                          ▼
//!                                   FileSink drain ──► logs/App_2024-01-05.txt
//!                                          │
//!                                          └─ daily ──► ArchiveSweep ──► logs/2023/...
//!                                                                       logs/Archived/2019.zip
//! ```
//!
//! Producers never block on I/O. Each sink owns one queue and one drain
//! lock; the timer and explicit flushes both go through a skip-if-busy
//! try-lock, so only one thread writes at a time.
//!
//! ## Usage
//!
//! ```ignore
//! use batchlog_core::config::FileSinkConfig;
//! use batchlog_core::logging::{FileSink, LogSink};
//!
//! let sink = FileSink::new(FileSinkConfig::new("/var/log/nightly/Import"))?;
//! sink.info("Import started");
//! sink.shutdown();
//! ```

pub mod archive;
pub mod database;
pub mod file_sink;
pub mod identity;
pub mod layer;
pub mod level;
pub mod message;
pub mod queue;
pub mod roll;
pub mod sink;
pub mod timer;

pub use archive::{ArchiveReport, ArchiveSweep, DateRule};
pub use database::{
    ConnectedSink, ConnectionInfo, DatabaseSink, LogProcedure, ProcedureCall, ProcedureError,
    SqliteLogProcedure,
};
pub use file_sink::{DrainOutcome, FileSink};
pub use identity::LogFileIdentity;
pub use layer::SinkLayer;
pub use level::{allow_log, LogLevel};
pub use message::{ErrorCause, LineStyle, LogMessage, TimestampFormat};
pub use queue::{DrainStats, MessageQueue};
pub use roll::{roll_generations, RollReport};
pub use sink::{LogDispatcher, LogSink};
pub use timer::DrainTimer;
