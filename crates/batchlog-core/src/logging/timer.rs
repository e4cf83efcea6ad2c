//! Recurring background timer that drives queue drains.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

/// Drain interval for the file sink.
pub const FILE_DRAIN_INTERVAL: Duration = Duration::from_millis(500);

/// Drain interval for database sinks.
pub const DATABASE_DRAIN_INTERVAL: Duration = Duration::from_millis(1000);

/// A named thread that calls `tick` every `interval` until stopped.
///
/// Stopping is prompt: the thread waits on a stop channel with the interval
/// as timeout instead of sleeping.
pub struct DrainTimer {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DrainTimer {
    /// Spawn the timer thread.
    pub fn start<F>(name: &str, interval: Duration, tick: F) -> std::io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => tick(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Whether the timer thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the thread and wait for an in-flight tick to finish.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Stopped from inside a tick; the loop exits on its own.
                return;
            }
            if handle.join().is_err() {
                tracing::error!("Drain timer thread panicked");
            }
        }
    }
}

impl Drop for DrainTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_timer_ticks_repeatedly() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let mut timer = DrainTimer::start("test-timer", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        thread::sleep(Duration::from_millis(200));
        timer.stop();

        assert!(ticks.load(Ordering::SeqCst) >= 3);
        assert!(!timer.is_running());
    }

    #[test]
    fn test_stop_is_prompt_and_final() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let mut timer = DrainTimer::start("slow-timer", Duration::from_secs(60), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let started = std::time::Instant::now();
        timer.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
