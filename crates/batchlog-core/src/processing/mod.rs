//! Drivers for batch jobs that walk a directory tree.
//!
//! A [`TreeWalker`] visits the entries under a root that match its
//! [`WalkOptions`], hands each one to an [`EntryHandler`] and reports what
//! happened to a [`ProcessingObserver`]. Handler failures are counted and
//! reported, never propagated, so one bad file doesn't stop a nightly run.
//!
//! ```ignore
//! use batchlog_core::processing::{LoggingObserver, TreeWalker, WalkOptions};
//!
//! let options = WalkOptions::new("/data/incoming").with_pattern("*.csv")?.recursive(true);
//! let walker = TreeWalker::new(options);
//! let summary = walker.run(
//!     &mut |path: &std::path::Path| import_csv(path),
//!     &mut LoggingObserver::new(sink.clone(), "Import"),
//! )?;
//! ```

pub mod observer;
pub mod walker;

pub use observer::{LoggingObserver, NoopObserver, ProcessingEvent, ProcessingObserver};
pub use walker::{
    AbortHandle, EntryHandler, HandlerResult, TreeWalker, WalkOptions, WalkSummary, WalkTarget,
    DEFAULT_PROGRESS_EVERY,
};
