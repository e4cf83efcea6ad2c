//! Rolling file sink.
//!
//! Callers enqueue messages; a background timer drains the queue into the
//! current log file. Only the thread holding the drain lock touches the
//! writer, so individual writes need no further locking.
//!
//! ```text
//! write_log ──► MessageQueue ──(500 ms tick, try-lock)──► drain
//!                                                          ├─ date changed? close, recompute path
//!                                                          ├─ no writer? mkdir, roll, open append
//!                                                          ├─ write line (+ cause trace)
//!                                                          └─ after batch: flush, daily archive sweep
//! ```

use std::error::Error;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};

use crate::config::FileSinkConfig;
use crate::error::{LogError, LogResult};

use super::archive::{ArchiveReport, ArchiveSweep};
use super::identity::LogFileIdentity;
use super::level::{allow_log, LogLevel};
use super::message::{LineStyle, LogMessage, TimestampFormat};
use super::queue::{flush_with_deadline, DrainStats, MessageQueue};
use super::roll::{needs_roll, roll_generations};
use super::sink::LogSink;
use super::timer::DrainTimer;

/// Longest time [`FileSink::flush_pending_messages`] waits.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while flushing.
pub const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Minimum time between automatic archival sweeps.
pub const ARCHIVE_CHECK_INTERVAL_HOURS: i64 = 24;

/// Result of one drain attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Queue was empty; the lock was not touched
    Idle,
    /// Another drain holds the lock; this attempt was skipped
    Busy,
    /// The queue was drained
    Drained(DrainStats),
}

#[derive(Debug, Clone)]
struct Settings {
    threshold: LogLevel,
    timestamp_format: TimestampFormat,
    line_style: LineStyle,
    max_rolled_log_files: usize,
    archive_old_logs: bool,
    zip_old_directories: bool,
}

/// State owned by the drain-lock holder.
struct WriterState {
    identity: LogFileIdentity,
    writer: Option<BufWriter<File>>,
    roll_pending: bool,
    last_archive_check: Option<DateTime<Utc>>,
}

impl WriterState {
    fn close_writer(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                tracing::error!(
                    path = %self.identity.current_path().display(),
                    "Failed to flush log file on close: {}",
                    e
                );
            }
        }
    }

    fn archive_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_archive_check {
            None => true,
            Some(last) => now - last >= chrono::Duration::hours(ARCHIVE_CHECK_INTERVAL_HOURS),
        }
    }
}

struct Shared {
    queue: MessageQueue<LogMessage>,
    state: Mutex<WriterState>,
    settings: RwLock<Settings>,
    most_recent_error: RwLock<Option<String>>,
}

impl Shared {
    fn enqueue(&self, message: LogMessage) {
        if allow_log(message.level(), self.settings.read().threshold) {
            self.queue.enqueue(message);
        }
    }

    fn start_drain(&self) -> DrainOutcome {
        if self.queue.is_empty() {
            return DrainOutcome::Idle;
        }
        match self.state.try_lock() {
            Some(mut state) => DrainOutcome::Drained(self.drain(&mut state)),
            None => DrainOutcome::Busy,
        }
    }

    fn drain(&self, state: &mut WriterState) -> DrainStats {
        let settings = self.settings.read().clone();

        let stats = self.queue.drain(|message| {
            match self.write_message(state, &settings, &message) {
                Ok(()) => ControlFlow::Continue(()),
                Err(e @ LogError::OpenFailed { .. }) => {
                    tracing::error!("{}; retrying on the next drain", e);
                    ControlFlow::Break(())
                }
                Err(e) => {
                    tracing::error!(
                        path = %state.identity.current_path().display(),
                        "Failed to write log message: {}",
                        e
                    );
                    // Reopen on the next message.
                    state.writer = None;
                    ControlFlow::Continue(())
                }
            }
        });

        if let Some(writer) = state.writer.as_mut() {
            if let Err(e) = writer.flush() {
                tracing::error!(
                    path = %state.identity.current_path().display(),
                    "Failed to flush log file: {}",
                    e
                );
                state.writer = None;
            }
        }

        let now = Utc::now();
        if settings.archive_old_logs && state.archive_due(now) {
            state.last_archive_check = Some(now);
            let report = self.archive(state, &settings);
            self.surface_warnings(&report.warnings, &settings);
        }

        stats
    }

    fn write_message(
        &self,
        state: &mut WriterState,
        settings: &Settings,
        message: &LogMessage,
    ) -> LogResult<()> {
        let date = message.local_date();
        if state.identity.advance_to(date) {
            state.close_writer();
            state.roll_pending = true;
        }

        if message.level().is_error() {
            *self.most_recent_error.write() = Some(message.text().to_string());
        }

        if state.writer.is_none() {
            self.open_writer(state, settings, date)?;
        }
        let Some(writer) = state.writer.as_mut() else {
            return Ok(());
        };

        writeln!(
            writer,
            "{}",
            message.render(settings.timestamp_format, settings.line_style)
        )?;
        if settings.line_style != LineStyle::Json {
            if let Some(cause) = message.cause() {
                writeln!(writer, "{}", cause.trace())?;
            }
        }
        Ok(())
    }

    fn open_writer(
        &self,
        state: &mut WriterState,
        settings: &Settings,
        date: NaiveDate,
    ) -> LogResult<()> {
        let path = state.identity.current_path().to_path_buf();
        let open_failed = |source: std::io::Error| LogError::OpenFailed {
            path: path.display().to_string(),
            source,
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(open_failed)?;
        }

        if !state.identity.append_date() && state.roll_pending && needs_roll(&path, date) {
            let report = roll_generations(&path, settings.max_rolled_log_files);
            self.surface_warnings(&report.warnings, settings);
        }
        state.roll_pending = false;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_failed)?;
        tracing::debug!(path = %path.display(), "Opened log file");

        state.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn archive(&self, state: &WriterState, settings: &Settings) -> ArchiveReport {
        let report = ArchiveSweep::new(state.identity.log_dir())
            .zip_old_directories(settings.zip_old_directories)
            .run();
        if !report.moved.is_empty() || !report.zipped.is_empty() {
            tracing::info!(
                moved = report.moved.len(),
                deduplicated = report.deduplicated.len(),
                zipped = report.zipped.len(),
                "Archived old log files"
            );
        }
        report
    }

    /// Report warnings on the diagnostic channel and queue them for the log
    /// file itself.
    fn surface_warnings(&self, warnings: &[String], settings: &Settings) {
        for warning in warnings {
            tracing::warn!("{}", warning);
            if allow_log(LogLevel::Warn, settings.threshold) {
                self.queue
                    .enqueue(LogMessage::new(LogLevel::Warn, warning.clone()));
            }
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
            |wait| self.state.try_lock_for(wait).is_some(),
        )
    }
}

struct Inner {
    shared: Arc<Shared>,
    timer: Mutex<Option<DrainTimer>>,
}

/// Asynchronous rolling file sink.
///
/// Cloning the handle shares the same queue, writer and file lineage; this
/// is how several components log into one physical file. Call
/// [`FileSink::shutdown`] before exit: dropping the last handle stops the
/// timer without flushing.
#[derive(Clone)]
pub struct FileSink {
    inner: Arc<Inner>,
}

impl FileSink {
    /// Create a sink and start its drain timer.
    pub fn new(config: FileSinkConfig) -> LogResult<Self> {
        let config = config.validate()?;
        let interval = config.drain_interval();
        let sink = Self::build(config);

        let shared = Arc::clone(&sink.inner.shared);
        let timer = DrainTimer::start("batchlog-file-drain", interval, move || {
            shared.start_drain();
        })?;
        *sink.inner.timer.lock() = Some(timer);

        Ok(sink)
    }

    /// Create a sink without a timer; messages are written only by
    /// [`start_drain`](Self::start_drain) and flushes.
    pub fn manual(config: FileSinkConfig) -> LogResult<Self> {
        let config = config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: FileSinkConfig) -> Self {
        let identity = LogFileIdentity::new(&config.base_path, config.append_date);
        let settings = Settings {
            threshold: config.threshold,
            timestamp_format: config.timestamp_format,
            line_style: config.line_style,
            max_rolled_log_files: config.max_rolled_log_files.max(1),
            archive_old_logs: config.archive_old_logs,
            zip_old_directories: config.zip_old_directories,
        };
        let shared = Arc::new(Shared {
            queue: MessageQueue::new("file-sink"),
            state: Mutex::new(WriterState {
                identity,
                writer: None,
                roll_pending: true,
                last_archive_check: None,
            }),
            settings: RwLock::new(settings),
            most_recent_error: RwLock::new(None),
        });
        Self {
            inner: Arc::new(Inner {
                shared,
                timer: Mutex::new(None),
            }),
        }
    }

    fn shared(&self) -> &Shared {
        &self.inner.shared
    }

    /// Queue a prebuilt message, subject to the threshold.
    pub fn log_message(&self, message: LogMessage) {
        self.shared().enqueue(message);
    }

    /// Drain the queue now on the calling thread unless a drain is running.
    pub fn start_drain(&self) -> DrainOutcome {
        self.shared().start_drain()
    }

    pub fn threshold(&self) -> LogLevel {
        self.shared().settings.read().threshold
    }

    pub fn set_threshold(&self, threshold: LogLevel) {
        self.shared().settings.write().threshold = threshold;
    }

    pub fn set_timestamp_format(&self, format: TimestampFormat) {
        self.shared().settings.write().timestamp_format = format;
    }

    /// Text of the most recent ERROR or FATAL message written.
    pub fn most_recent_error_message(&self) -> Option<String> {
        self.shared().most_recent_error.read().clone()
    }

    /// Messages waiting to be written.
    pub fn pending_count(&self) -> usize {
        self.shared().queue.len()
    }

    pub fn dequeue_failures(&self) -> u64 {
        self.shared().queue.dequeue_failures()
    }

    /// Path of the file the next message for today would be written to.
    pub fn current_log_path(&self) -> PathBuf {
        self.shared().state.lock().identity.current_path().to_path_buf()
    }

    /// Path the sink uses for messages dated `date`.
    pub fn log_path_for(&self, date: NaiveDate) -> PathBuf {
        self.shared().state.lock().identity.path_for(date)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.shared().state.lock().identity.log_dir()
    }

    /// Point the sink at a new base name or path.
    ///
    /// Pending messages are flushed to the old file first. This affects every
    /// clone of the handle.
    pub fn change_base_name(&self, base_path: impl AsRef<Path>) {
        self.flush_pending_messages();
        let mut state = self.shared().state.lock();
        state.close_writer();
        let append_date = state.identity.append_date();
        state.identity = LogFileIdentity::new(base_path, append_date);
        state.roll_pending = true;
    }

    /// Switch between date-stamped and rolled file naming.
    pub fn set_append_date(&self, append_date: bool) {
        self.flush_pending_messages();
        let mut state = self.shared().state.lock();
        if state.identity.append_date() == append_date {
            return;
        }
        state.close_writer();
        let base = state.identity.base().to_path_buf();
        state.identity = LogFileIdentity::new(base, append_date);
        state.roll_pending = true;
    }

    /// Run the archival sweep now, waiting for any in-flight drain.
    ///
    /// Warnings are also queued as WARN messages.
    pub fn archive_now(&self) -> ArchiveReport {
        let shared = self.shared();
        let settings = shared.settings.read().clone();
        let report = {
            let mut state = shared.state.lock();
            state.last_archive_check = Some(Utc::now());
            shared.archive(&state, &settings)
        };
        shared.surface_warnings(&report.warnings, &settings);
        report
    }

    /// Stop the timer, write everything still queued and close the file.
    ///
    /// Returns false if the queue could not be emptied within the flush
    /// timeout. Further messages are only written by explicit flushes.
    pub fn shutdown(&self) -> bool {
        if let Some(mut timer) = self.inner.timer.lock().take() {
            timer.stop();
        }
        let drained = self.flush_pending_messages();
        self.shared().state.lock().close_writer();
        drained
    }
}

impl LogSink for FileSink {
    fn write_log(&self, level: LogLevel, text: &str, cause: Option<&(dyn Error + 'static)>) {
        let shared = self.shared();
        if !allow_log(level, shared.settings.read().threshold) {
            return;
        }
        let message = match cause {
            Some(cause) => LogMessage::with_cause(level, text, cause),
            None => LogMessage::new(level, text),
        };
        shared.queue.enqueue(message);
    }

    fn flush_pending_messages(&self) -> bool {
        self.shared().flush()
    }
}
