//! Tracing layer that forwards events into a [`LogSink`].
//!
//! Lets applications keep using `tracing::info!` and friends while the sink
//! decides what reaches the log file. Events emitted by this crate itself
//! are skipped so a sink never logs its own diagnostics back into itself.

use std::fmt::Write as FmtWrite;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::level::LogLevel;
use super::sink::LogSink;

/// Targets starting with this prefix are not forwarded.
pub const INTERNAL_TARGET_PREFIX: &str = "batchlog_core";

/// A tracing Layer that writes events to a sink.
pub struct SinkLayer<S> {
    sink: S,
    include_spans: bool,
}

impl<S: LogSink> SinkLayer<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            include_spans: true,
        }
    }

    /// Don't prefix messages with the active span path.
    pub fn without_spans(mut self) -> Self {
        self.include_spans = false;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

/// Map a tracing level onto the sink's levels. TRACE folds into DEBUG.
pub fn level_from_tracing(level: &Level) -> LogLevel {
    if *level == Level::ERROR {
        LogLevel::Error
    } else if *level == Level::WARN {
        LogLevel::Warn
    } else if *level == Level::INFO {
        LogLevel::Info
    } else {
        LogLevel::Debug
    }
}

impl<S, Sub> Layer<Sub> for SinkLayer<S>
where
    S: LogSink + 'static,
    Sub: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, Sub>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(INTERNAL_TARGET_PREFIX) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let mut text = visitor.finish();

        if self.include_spans {
            if let Some(scope) = ctx.event_scope(event) {
                let spans: Vec<&str> = scope.from_root().map(|span| span.name()).collect();
                if !spans.is_empty() {
                    text = format!("[{}] {}", spans.join(" > "), text);
                }
            }
        }

        self.sink
            .write_log(level_from_tracing(metadata.level()), &text, None);
    }
}

/// Collects the `message` field followed by the remaining fields as
/// `key=value` pairs.
#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
    fields: String,
}

impl MessageVisitor {
    fn push_field(&mut self, name: &str, value: std::fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }

    fn finish(self) -> String {
        match (self.message, self.fields.is_empty()) {
            (Some(message), true) => message,
            (Some(message), false) => format!("{} {}", message, self.fields),
            (None, _) => self.fields,
        }
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.push_field(field.name(), format_args!("{}", value));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push_field(field.name(), format_args!("{}", value));
    }
}
