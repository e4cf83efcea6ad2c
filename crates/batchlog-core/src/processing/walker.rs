//! Directory tree walker.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glob::{MatchOptions, Pattern};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{LogError, LogResult};

use super::observer::{ProcessingEvent, ProcessingObserver};

/// Default number of matched entries between progress events.
pub const DEFAULT_PROGRESS_EVERY: usize = 100;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Result of handling one entry.
pub type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Processes one matched entry.
pub trait EntryHandler {
    fn handle(&mut self, path: &Path) -> HandlerResult;
}

impl<F> EntryHandler for F
where
    F: FnMut(&Path) -> HandlerResult,
{
    fn handle(&mut self, path: &Path) -> HandlerResult {
        self(path)
    }
}

/// Kind of entry a walk hands to its handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WalkTarget {
    #[default]
    Files,
    Directories,
}

/// What to visit.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    root: PathBuf,
    patterns: Vec<Pattern>,
    recursive: bool,
    max_depth: Option<usize>,
    target: WalkTarget,
    progress_every: usize,
}

impl WalkOptions {
    /// Visit every file directly under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            patterns: Vec::new(),
            recursive: false,
            max_depth: None,
            target: WalkTarget::Files,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }

    /// Add a wildcard pattern for entry names, e.g. `*.csv`.
    ///
    /// With no patterns every entry matches; with several, any one suffices.
    pub fn with_pattern(mut self, pattern: &str) -> LogResult<Self> {
        self.patterns.push(Pattern::new(pattern)?);
        Ok(self)
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Deepest level visited when recursive; children of the root are depth 1.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth.max(1));
        self
    }

    pub fn target(mut self, target: WalkTarget) -> Self {
        self.target = target;
        self
    }

    /// Emit a progress event every `n` matched entries; 0 disables them.
    pub fn progress_every(mut self, n: usize) -> Self {
        self.progress_every = n;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Case-insensitive match of an entry name against the patterns.
    pub fn matches_name(&self, name: &str) -> bool {
        self.patterns.is_empty()
            || self
                .patterns
                .iter()
                .any(|pattern| pattern.matches_with(name, MATCH_OPTIONS))
    }

    fn effective_max_depth(&self) -> usize {
        if self.recursive {
            self.max_depth.unwrap_or(usize::MAX)
        } else {
            1
        }
    }
}

/// Counts from one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkSummary {
    /// Entries that matched the target kind and patterns
    pub matched: usize,
    /// Matched entries the handler accepted
    pub processed: usize,
    /// Handler failures plus unreadable entries
    pub failed: usize,
    pub aborted: bool,
}

/// Cloneable flag that stops a running walk before its next entry.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag so the walker can run again.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Walks a tree in file-name order, handling each matching entry.
pub struct TreeWalker {
    options: WalkOptions,
    abort: AbortHandle,
}

impl TreeWalker {
    pub fn new(options: WalkOptions) -> Self {
        Self {
            options,
            abort: AbortHandle::new(),
        }
    }

    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    /// Handle that aborts this walker's runs.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Walk the tree.
    ///
    /// Fails only if the root is not a readable directory.
    pub fn run<H, O>(&self, handler: &mut H, observer: &mut O) -> LogResult<WalkSummary>
    where
        H: EntryHandler + ?Sized,
        O: ProcessingObserver + ?Sized,
    {
        let root = self.options.root();
        if !root.is_dir() {
            return Err(LogError::Processing(format!(
                "Root directory not found: {}",
                root.display()
            )));
        }

        let mut summary = WalkSummary::default();
        observer.on_event(&ProcessingEvent::Started { root });

        let entries = WalkDir::new(root)
            .min_depth(1)
            .max_depth(self.options.effective_max_depth())
            .sort_by_file_name();

        for entry in entries {
            if self.abort.is_aborted() {
                summary.aborted = true;
                observer.on_event(&ProcessingEvent::Aborted {
                    processed: summary.processed,
                });
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    summary.failed += 1;
                    let path = e.path().unwrap_or(root).to_path_buf();
                    tracing::warn!(path = %path.display(), "Unreadable entry: {}", e);
                    observer.on_event(&ProcessingEvent::Failed {
                        path: &path,
                        error: &e,
                    });
                    continue;
                }
            };

            let is_target = match self.options.target {
                WalkTarget::Files => entry.file_type().is_file(),
                WalkTarget::Directories => entry.file_type().is_dir(),
            };
            if !is_target || !self.options.matches_name(&entry.file_name().to_string_lossy()) {
                continue;
            }

            summary.matched += 1;
            observer.on_event(&ProcessingEvent::Entry {
                path: entry.path(),
                index: summary.matched,
            });

            match handler.handle(entry.path()) {
                Ok(()) => summary.processed += 1,
                Err(e) => {
                    summary.failed += 1;
                    observer.on_event(&ProcessingEvent::Failed {
                        path: entry.path(),
                        error: &*e,
                    });
                }
            }

            let every = self.options.progress_every;
            if every > 0 && summary.matched % every == 0 {
                observer.on_event(&ProcessingEvent::Progress {
                    matched: summary.matched,
                    processed: summary.processed,
                    failed: summary.failed,
                });
            }
        }

        observer.on_event(&ProcessingEvent::Finished { summary: &summary });
        tracing::debug!(
            root = %root.display(),
            matched = summary.matched,
            processed = summary.processed,
            failed = summary.failed,
            "Walk finished"
        );
        Ok(summary)
    }
}
