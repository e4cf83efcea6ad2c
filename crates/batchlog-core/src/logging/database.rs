//! Database sink.
//!
//! Messages are queued like the file sink's and drained every second into a
//! logging procedure. The procedure boundary is a trait so the storage
//! backend can be swapped; [`SqliteLogProcedure`] stores each call as a row
//! in a table named after the procedure.
//!
//! When no connection is configured, or a call keeps failing, messages go to
//! the fallback [`FileSink`] instead of being dropped.

use std::error::Error;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DatabaseSinkConfig;
use crate::error::{LogError, LogResult};

use super::file_sink::{DrainOutcome, FileSink, FLUSH_POLL_INTERVAL, FLUSH_TIMEOUT};
use super::level::{allow_log, LogLevel};
use super::message::LogMessage;
use super::queue::{flush_with_deadline, DrainStats, MessageQueue};
use super::sink::LogSink;
use super::timer::DrainTimer;

/// Where and as whom database messages are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Backend-specific connection string (a database file for SQLite)
    pub connection_string: String,
    /// Name of the logging procedure to call
    pub procedure: String,
    /// Recorded as the author of every stored message
    pub posted_by: String,
}

impl ConnectionInfo {
    pub fn new(
        connection_string: impl Into<String>,
        procedure: impl Into<String>,
        posted_by: impl Into<String>,
    ) -> Self {
        Self {
            connection_string: connection_string.into(),
            procedure: procedure.into(),
            posted_by: posted_by.into(),
        }
    }
}

/// Arguments of one logging procedure call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureCall {
    pub procedure: String,
    /// Level name, e.g. `ERROR`
    pub log_type: String,
    pub message: String,
    pub posted_by: String,
}

#[derive(Error, Debug)]
pub enum ProcedureError {
    /// The procedure does not exist; retrying cannot help
    #[error("Logging procedure not found: {0}")]
    NotFound(String),

    #[error("Logging procedure failed: {0}")]
    Failed(String),
}

/// A stored-procedure-like call that persists one log message.
pub trait LogProcedure: Send + Sync {
    fn execute(&self, connection: &ConnectionInfo, call: &ProcedureCall)
        -> Result<(), ProcedureError>;
}

/// A sink whose destination is a connection that can change at runtime.
pub trait ConnectedSink: LogSink {
    fn change_connection_info(&self, info: ConnectionInfo);

    /// Forget the connection; later messages go to the fallback sink.
    fn remove_connection_info(&self);

    fn connection_info(&self) -> Option<ConnectionInfo>;
}

/// Procedure names become table names, so only plain identifiers pass.
fn is_valid_procedure_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

const CREATE_PROCEDURE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS "{table}" (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        log_type TEXT NOT NULL,
        message TEXT NOT NULL,
        posted_by TEXT NOT NULL,
        posted_at TEXT NOT NULL
    )
"#;

const INSERT_CALL_SQL: &str =
    r#"INSERT INTO "{table}" (log_type, message, posted_by, posted_at) VALUES (?1, ?2, ?3, ?4)"#;

/// SQLite-backed logging procedure.
///
/// The connection for the most recent connection string is cached and
/// reopened when the string changes.
#[derive(Default)]
pub struct SqliteLogProcedure {
    connection: Mutex<Option<(String, Connection)>>,
}

impl SqliteLogProcedure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the table backing `procedure` in the database at `db_path`.
    pub fn create_procedure_table(db_path: impl AsRef<Path>, procedure: &str) -> LogResult<()> {
        if !is_valid_procedure_name(procedure) {
            return Err(LogError::InvalidConfig(format!(
                "Invalid procedure name: {}",
                procedure
            )));
        }
        let conn = Connection::open(db_path.as_ref())?;
        conn.execute(&CREATE_PROCEDURE_TABLE_SQL.replace("{table}", procedure), params![])?;
        Ok(())
    }

    /// Number of rows stored by `procedure`.
    pub fn count_rows(db_path: impl AsRef<Path>, procedure: &str) -> LogResult<u64> {
        if !is_valid_procedure_name(procedure) {
            return Err(LogError::InvalidConfig(format!(
                "Invalid procedure name: {}",
                procedure
            )));
        }
        let conn = Connection::open(db_path.as_ref())?;
        let count: i64 = conn.query_row(
            &format!(r#"SELECT COUNT(*) FROM "{}""#, procedure),
            params![],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl LogProcedure for SqliteLogProcedure {
    #[allow(clippy::significant_drop_tightening)]
    fn execute(
        &self,
        connection: &ConnectionInfo,
        call: &ProcedureCall,
    ) -> Result<(), ProcedureError> {
        if !is_valid_procedure_name(&call.procedure) {
            return Err(ProcedureError::NotFound(call.procedure.clone()));
        }

        let mut cached = self.connection.lock();
        let reuse = matches!(&*cached, Some((target, _)) if *target == connection.connection_string);
        if !reuse {
            let conn = Connection::open(&connection.connection_string)
                .map_err(|e| ProcedureError::Failed(e.to_string()))?;
            *cached = Some((connection.connection_string.clone(), conn));
        }
        let Some((_, conn)) = cached.as_ref() else {
            return Err(ProcedureError::Failed("connection unavailable".into()));
        };

        let sql = INSERT_CALL_SQL.replace("{table}", &call.procedure);
        let result = conn.prepare_cached(&sql).and_then(|mut stmt| {
            stmt.execute(params![
                call.log_type,
                call.message,
                call.posted_by,
                Utc::now().to_rfc3339()
            ])
        });

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("no such table") => {
                Err(ProcedureError::NotFound(call.procedure.clone()))
            }
            Err(e) => {
                // Drop the connection so the next call starts fresh.
                *cached = None;
                Err(ProcedureError::Failed(e.to_string()))
            }
        }
    }
}

struct DbShared {
    queue: MessageQueue<LogMessage>,
    drain_lock: Mutex<()>,
    threshold: RwLock<LogLevel>,
    connection: RwLock<Option<ConnectionInfo>>,
    procedure: Box<dyn LogProcedure>,
    fallback: Option<FileSink>,
    echo_to_file: bool,
    max_retries: u32,
    stored: AtomicU64,
    diverted: AtomicU64,
}

impl DbShared {
    fn start_drain(&self) -> DrainOutcome {
        if self.queue.is_empty() {
            return DrainOutcome::Idle;
        }
        let Some(_guard) = self.drain_lock.try_lock() else {
            return DrainOutcome::Busy;
        };
        DrainOutcome::Drained(self.drain())
    }

    fn drain(&self) -> DrainStats {
        let connection = self.connection.read().clone();
        self.queue.drain(|message| {
            match &connection {
                Some(connection) => self.store(connection, message),
                None => self.divert(message),
            }
            ControlFlow::Continue(())
        })
    }

    fn store(&self, connection: &ConnectionInfo, message: LogMessage) {
        let mut text = message.text().to_string();
        if let Some(cause) = message.cause() {
            text.push('\n');
            text.push_str(&cause.trace());
        }
        let call = ProcedureCall {
            procedure: connection.procedure.clone(),
            log_type: message.level().as_str().to_string(),
            message: text,
            posted_by: connection.posted_by.clone(),
        };

        match self.call_with_retries(connection, &call) {
            Ok(()) => {
                self.stored.fetch_add(1, Ordering::Relaxed);
                if self.echo_to_file {
                    if let Some(fallback) = &self.fallback {
                        fallback.log_message(message);
                    }
                }
            }
            Err(ProcedureError::NotFound(procedure)) => {
                self.escalate(format!(
                    "Logging procedure {} not found; message kept in log file: [{}] {}",
                    procedure, call.log_type, call.message
                ));
            }
            Err(e) => {
                self.escalate(format!(
                    "Database logging failed after {} attempts ({}); message kept in log file: [{}] {}",
                    self.max_retries + 1,
                    e,
                    call.log_type,
                    call.message
                ));
            }
        }
    }

    fn call_with_retries(
        &self,
        connection: &ConnectionInfo,
        call: &ProcedureCall,
    ) -> Result<(), ProcedureError> {
        let attempts = self.max_retries + 1;
        let mut attempt = 1;
        loop {
            match self.procedure.execute(connection, call) {
                Ok(()) => return Ok(()),
                Err(e @ ProcedureError::NotFound(_)) => return Err(e),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        procedure = %call.procedure,
                        "Logging procedure call failed, retrying: {}",
                        e
                    );
                    attempt += 1;
                }
            }
        }
    }

    /// Write an undeliverable message to the fallback at ERROR level.
    fn escalate(&self, text: String) {
        self.diverted.fetch_add(1, Ordering::Relaxed);
        tracing::error!("{}", text);
        if let Some(fallback) = &self.fallback {
            fallback.write_log(LogLevel::Error, &text, None);
        }
    }

    fn divert(&self, message: LogMessage) {
        self.diverted.fetch_add(1, Ordering::Relaxed);
        match &self.fallback {
            Some(fallback) => fallback.log_message(message),
            None => tracing::warn!(
                level = message.level().as_str(),
                "No database connection or fallback file; dropping log message: {}",
                message.text()
            ),
        }
    }

    fn flush(&self) -> bool {
        flush_with_deadline(
            FLUSH_TIMEOUT,
            FLUSH_POLL_INTERVAL,
            || {
                self.start_drain();
            },
            || self.queue.is_empty(),
            |wait| self.drain_lock.try_lock_for(wait).is_some(),
        )
    }
}

struct DbInner {
    shared: Arc<DbShared>,
    timer: Mutex<Option<DrainTimer>>,
}

/// Asynchronous sink that stores messages through a [`LogProcedure`].
#[derive(Clone)]
pub struct DatabaseSink {
    inner: Arc<DbInner>,
}

impl DatabaseSink {
    /// Create a sink and start its drain timer.
    pub fn new(
        config: DatabaseSinkConfig,
        procedure: impl LogProcedure + 'static,
        fallback: Option<FileSink>,
    ) -> LogResult<Self> {
        let interval = config.drain_interval();
        let sink = Self::build(config, Box::new(procedure), fallback);

        let shared = Arc::clone(&sink.inner.shared);
        let timer = DrainTimer::start("batchlog-db-drain", interval, move || {
            shared.start_drain();
        })?;
        *sink.inner.timer.lock() = Some(timer);

        Ok(sink)
    }

    /// Create a sink without a timer.
    pub fn manual(
        config: DatabaseSinkConfig,
        procedure: impl LogProcedure + 'static,
        fallback: Option<FileSink>,
    ) -> Self {
        Self::build(config, Box::new(procedure), fallback)
    }

    fn build(
        config: DatabaseSinkConfig,
        procedure: Box<dyn LogProcedure>,
        fallback: Option<FileSink>,
    ) -> Self {
        let shared = Arc::new(DbShared {
            queue: MessageQueue::new("database-sink"),
            drain_lock: Mutex::new(()),
            threshold: RwLock::new(config.threshold),
            connection: RwLock::new(None),
            procedure,
            fallback,
            echo_to_file: config.echo_to_file,
            max_retries: config.max_retries,
            stored: AtomicU64::new(0),
            diverted: AtomicU64::new(0),
        });
        Self {
            inner: Arc::new(DbInner {
                shared,
                timer: Mutex::new(None),
            }),
        }
    }

    /// Builder-style variant of [`ConnectedSink::change_connection_info`].
    pub fn with_connection_info(self, info: ConnectionInfo) -> Self {
        self.change_connection_info(info);
        self
    }

    fn shared(&self) -> &DbShared {
        &self.inner.shared
    }

    pub fn log_message(&self, message: LogMessage) {
        let shared = self.shared();
        if allow_log(message.level(), *shared.threshold.read()) {
            shared.queue.enqueue(message);
        }
    }

    pub fn start_drain(&self) -> DrainOutcome {
        self.shared().start_drain()
    }

    pub fn threshold(&self) -> LogLevel {
        *self.shared().threshold.read()
    }

    pub fn set_threshold(&self, threshold: LogLevel) {
        *self.shared().threshold.write() = threshold;
    }

    pub fn pending_count(&self) -> usize {
        self.shared().queue.len()
    }

    /// Messages accepted by the procedure.
    pub fn stored_count(&self) -> u64 {
        self.shared().stored.load(Ordering::Relaxed)
    }

    /// Messages sent to the fallback instead of the database.
    pub fn diverted_count(&self) -> u64 {
        self.shared().diverted.load(Ordering::Relaxed)
    }

    pub fn fallback(&self) -> Option<&FileSink> {
        self.shared().fallback.as_ref()
    }

    /// Stop the timer and deliver everything still queued, then flush the
    /// fallback file sink.
    pub fn shutdown(&self) -> bool {
        if let Some(mut timer) = self.inner.timer.lock().take() {
            timer.stop();
        }
        self.flush_pending_messages()
    }
}

impl ConnectedSink for DatabaseSink {
    fn change_connection_info(&self, info: ConnectionInfo) {
        tracing::debug!(procedure = %info.procedure, "Database log connection changed");
        *self.shared().connection.write() = Some(info);
    }

    fn remove_connection_info(&self) {
        *self.shared().connection.write() = None;
    }

    fn connection_info(&self) -> Option<ConnectionInfo> {
        self.shared().connection.read().clone()
    }
}

impl LogSink for DatabaseSink {
    fn write_log(&self, level: LogLevel, text: &str, cause: Option<&(dyn Error + 'static)>) {
        if !allow_log(level, self.threshold()) {
            return;
        }
        let message = match cause {
            Some(cause) => LogMessage::with_cause(level, text, cause),
            None => LogMessage::new(level, text),
        };
        self.shared().queue.enqueue(message);
    }

    fn flush_pending_messages(&self) -> bool {
        let shared = self.shared();
        let drained = shared.flush();
        let fallback_drained = shared
            .fallback
            .as_ref()
            .map_or(true, |fallback| fallback.flush_pending_messages());
        drained && fallback_drained
    }
}
