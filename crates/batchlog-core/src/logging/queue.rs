//! Unbounded multi-producer message queue with a single draining consumer.
//!
//! Producers call [`MessageQueue::enqueue`], which never blocks. The sink
//! that owns the queue drains it from its timer thread while holding its
//! drain lock, so only one consumer is ever active.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use crate::error::{LogError, LogResult};

/// Outcome of one [`MessageQueue::drain`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Items handed to the consumer
    pub processed: usize,
    /// The pass stopped before the queue reported empty
    pub aborted: bool,
}

/// Thread-safe unbounded FIFO queue.
pub struct MessageQueue<T> {
    name: &'static str,
    sender: Sender<T>,
    receiver: Receiver<T>,
    dequeue_failures: AtomicU64,
}

impl<T> MessageQueue<T> {
    /// Create an empty queue. `name` identifies the queue in diagnostics.
    pub fn new(name: &'static str) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            name,
            sender,
            receiver,
            dequeue_failures: AtomicU64::new(0),
        }
    }

    /// Append an item. Never blocks and never fails.
    pub fn enqueue(&self, item: T) {
        // The receiver lives as long as the sender, so the channel can't be
        // disconnected here.
        let _ = self.sender.send(item);
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Total dequeue failures observed since creation.
    pub fn dequeue_failures(&self) -> u64 {
        self.dequeue_failures.load(Ordering::Relaxed)
    }

    /// Take one item.
    ///
    /// `Ok(None)` means the queue is empty. An error means the queue claimed
    /// to hold items but none could be taken.
    pub fn dequeue(&self) -> LogResult<Option<T>> {
        match self.receiver.try_recv() {
            Ok(item) => Ok(Some(item)),
            Err(TryRecvError::Empty) => {
                let pending = self.receiver.len();
                if pending > 0 {
                    Err(LogError::QueueInconsistent(format!(
                        "{} reports {} pending messages but dequeue returned none",
                        self.name, pending
                    )))
                } else {
                    Ok(None)
                }
            }
            Err(TryRecvError::Disconnected) => Err(LogError::QueueInconsistent(format!(
                "{} channel disconnected",
                self.name
            ))),
        }
    }

    /// Dequeue items one at a time until the queue is empty, the consumer
    /// breaks, or a dequeue fails.
    ///
    /// A failed dequeue aborts the pass; the remaining items stay queued for
    /// the next drain.
    pub fn drain<F>(&self, mut consume: F) -> DrainStats
    where
        F: FnMut(T) -> ControlFlow<()>,
    {
        let mut stats = DrainStats::default();
        loop {
            match self.dequeue() {
                Ok(Some(item)) => {
                    stats.processed += 1;
                    if consume(item).is_break() {
                        stats.aborted = true;
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    self.record_dequeue_failure(&err);
                    stats.aborted = true;
                    break;
                }
            }
        }
        stats
    }

    pub(crate) fn record_dequeue_failure(&self, err: &LogError) -> u64 {
        let failures = self.dequeue_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if should_report_failure(failures) {
            tracing::warn!(queue = self.name, failures, "Dequeue failed: {}", err);
        }
        failures
    }
}

/// Force drains until the queue is empty and no drain is in flight, or
/// until `timeout` passes.
///
/// `drain` attempts one drain (skip-if-busy), `is_empty` reports the queue
/// state, and `wait_idle` waits up to the given time for an in-flight drain
/// to release its lock, returning true if it did.
pub(crate) fn flush_with_deadline(
    timeout: Duration,
    poll: Duration,
    drain: impl Fn(),
    is_empty: impl Fn() -> bool,
    wait_idle: impl Fn(Duration) -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        drain();
        if is_empty() && wait_idle(deadline.saturating_duration_since(Instant::now())) && is_empty()
        {
            return true;
        }
        if Instant::now() >= deadline {
            return is_empty();
        }
        thread::sleep(poll);
    }
}

/// Throttle for repeated failure warnings.
///
/// Reports failures 1 through 4, then only when `n` is a multiple of
/// `10^ceil(log10(n))`, which works out to 10, 100, 1000, and so on.
pub fn should_report_failure(n: u64) -> bool {
    if n == 0 {
        return false;
    }
    if n <= 4 {
        return true;
    }
    let mut magnitude = 1u64;
    while magnitude < n {
        match magnitude.checked_mul(10) {
            Some(next) => magnitude = next,
            None => return false,
        }
    }
    n % magnitude == 0
}
