//! Progress reporting for tree walks.

use std::error::Error;
use std::path::Path;

use crate::logging::{LogLevel, LogSink};

use super::walker::WalkSummary;

/// Something that happened during a walk.
#[derive(Debug)]
pub enum ProcessingEvent<'a> {
    Started {
        root: &'a Path,
    },
    /// A matching entry is about to be handled; `index` counts from 1
    Entry {
        path: &'a Path,
        index: usize,
    },
    /// The handler failed, or the entry could not be read
    Failed {
        path: &'a Path,
        error: &'a (dyn Error + 'static),
    },
    Progress {
        matched: usize,
        processed: usize,
        failed: usize,
    },
    /// The abort handle was set; no further entries are handled
    Aborted {
        processed: usize,
    },
    Finished {
        summary: &'a WalkSummary,
    },
}

pub trait ProcessingObserver {
    fn on_event(&mut self, event: &ProcessingEvent<'_>);
}

impl<F> ProcessingObserver for F
where
    F: FnMut(&ProcessingEvent<'_>),
{
    fn on_event(&mut self, event: &ProcessingEvent<'_>) {
        self(event)
    }
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProcessingObserver for NoopObserver {
    fn on_event(&mut self, _event: &ProcessingEvent<'_>) {}
}

/// Writes walk events to a [`LogSink`].
///
/// Entries are logged at DEBUG, failures at ERROR with their cause chain,
/// aborts at WARN and everything else at INFO. Each line starts with the
/// job label.
pub struct LoggingObserver<S> {
    sink: S,
    label: String,
}

impl<S: LogSink> LoggingObserver<S> {
    pub fn new(sink: S, label: impl Into<String>) -> Self {
        Self {
            sink,
            label: label.into(),
        }
    }

    fn log(&self, level: LogLevel, text: String, cause: Option<&(dyn Error + 'static)>) {
        self.sink
            .write_log(level, &format!("{}: {}", self.label, text), cause);
    }
}

impl<S: LogSink> ProcessingObserver for LoggingObserver<S> {
    fn on_event(&mut self, event: &ProcessingEvent<'_>) {
        match event {
            ProcessingEvent::Started { root } => {
                self.log(
                    LogLevel::Info,
                    format!("Started processing {}", root.display()),
                    None,
                );
            }
            ProcessingEvent::Entry { path, index } => {
                self.log(
                    LogLevel::Debug,
                    format!("Processing #{} {}", index, path.display()),
                    None,
                );
            }
            ProcessingEvent::Failed { path, error } => {
                self.log(
                    LogLevel::Error,
                    format!("Failed to process {}", path.display()),
                    Some(*error),
                );
            }
            ProcessingEvent::Progress {
                matched,
                processed,
                failed,
            } => {
                self.log(
                    LogLevel::Info,
                    format!(
                        "Progress: {} matched, {} processed, {} failed",
                        matched, processed, failed
                    ),
                    None,
                );
            }
            ProcessingEvent::Aborted { processed } => {
                self.log(
                    LogLevel::Warn,
                    format!("Aborted after {} entries", processed),
                    None,
                );
            }
            ProcessingEvent::Finished { summary } => {
                self.log(
                    LogLevel::Info,
                    format!(
                        "Finished: {} matched, {} processed, {} failed{}",
                        summary.matched,
                        summary.processed,
                        summary.failed,
                        if summary.aborted { " (aborted)" } else { "" }
                    ),
                    None,
                );
            }
        }
    }
}
