//! The write contract shared by every sink, and a fan-out dispatcher.

use std::error::Error;
use std::sync::Arc;

use super::level::LogLevel;

/// A destination for log messages.
///
/// Writes never block on I/O and never fail; a sink that cannot persist a
/// message reports it on its diagnostic channel instead.
pub trait LogSink: Send + Sync {
    /// Queue a message if `level` passes the sink's threshold.
    fn write_log(&self, level: LogLevel, text: &str, cause: Option<&(dyn Error + 'static)>);

    /// Block until queued messages are persisted (bounded wait).
    ///
    /// Returns false if messages were still pending when the wait ended.
    fn flush_pending_messages(&self) -> bool;

    fn debug(&self, text: &str) {
        self.write_log(LogLevel::Debug, text, None);
    }

    fn info(&self, text: &str) {
        self.write_log(LogLevel::Info, text, None);
    }

    fn warn(&self, text: &str) {
        self.write_log(LogLevel::Warn, text, None);
    }

    fn error(&self, text: &str) {
        self.write_log(LogLevel::Error, text, None);
    }

    fn fatal(&self, text: &str) {
        self.write_log(LogLevel::Fatal, text, None);
    }

    /// Error message with its cause chain.
    fn error_with_cause(&self, text: &str, cause: &(dyn Error + 'static)) {
        self.write_log(LogLevel::Error, text, Some(cause));
    }
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn write_log(&self, level: LogLevel, text: &str, cause: Option<&(dyn Error + 'static)>) {
        (**self).write_log(level, text, cause)
    }

    fn flush_pending_messages(&self) -> bool {
        (**self).flush_pending_messages()
    }
}

/// Forwards every message to all registered sinks.
///
/// Each sink applies its own threshold.
#[derive(Clone, Default)]
pub struct LogDispatcher {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl LogDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn LogSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl LogSink for LogDispatcher {
    fn write_log(&self, level: LogLevel, text: &str, cause: Option<&(dyn Error + 'static)>) {
        for sink in &self.sinks {
            sink.write_log(level, text, cause);
        }
    }

    fn flush_pending_messages(&self) -> bool {
        // Flush every sink even after one times out.
        self.sinks
            .iter()
            .fold(true, |all, sink| sink.flush_pending_messages() && all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        lines: Mutex<Vec<(LogLevel, String, Option<String>)>>,
    }

    impl LogSink for RecordingSink {
        fn write_log(&self, level: LogLevel, text: &str, cause: Option<&(dyn Error + 'static)>) {
            self.lines
                .lock()
                .push((level, text.to_string(), cause.map(|c| c.to_string())));
        }

        fn flush_pending_messages(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_level_helpers() {
        let sink = RecordingSink::default();
        sink.debug("d");
        sink.info("i");
        sink.warn("w");
        sink.error("e");
        sink.fatal("f");

        let levels: Vec<_> = sink.lines.lock().iter().map(|l| l.0).collect();
        assert_eq!(
            levels,
            vec![
                LogLevel::Debug,
                LogLevel::Info,
                LogLevel::Warn,
                LogLevel::Error,
                LogLevel::Fatal
            ]
        );
    }

    #[test]
    fn test_error_with_cause() {
        let sink = RecordingSink::default();
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        sink.error_with_cause("Write failed", &cause);

        let lines = sink.lines.lock();
        assert_eq!(lines[0].2.as_deref(), Some("disk gone"));
    }

    #[test]
    fn test_dispatcher_fans_out() {
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        let dispatcher = LogDispatcher::new()
            .with_sink(a.clone())
            .with_sink(b.clone());

        dispatcher.warn("Low disk space");

        assert_eq!(dispatcher.len(), 2);
        assert_eq!(a.lines.lock().len(), 1);
        assert_eq!(b.lines.lock()[0].1, "Low disk space");
        assert!(dispatcher.flush_pending_messages());
    }
}
