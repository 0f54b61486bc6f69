//! Watcher debounce (§4.4, §5, §8 invariant 6).
//!
//! N raw change notifications within `FileChangeSync` ms must collapse
//! into exactly one `sync` invocation. A backend's `watch` forwards every
//! raw event; this is the engine-side coalescing layer that sits between
//! that raw callback and `sync`.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

/// Coalesces bursts of `notify()` calls into a single `fire` invocation,
/// delayed by `window`. Each `notify()` restarts the window (trailing-edge
/// debounce) rather than rate-limiting on a fixed cadence.
pub struct Debouncer {
    window: Duration,
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Debouncer {
    pub fn new(window_ms: u64) -> Self {
        Debouncer {
            window: Duration::from_millis(window_ms),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Schedule `fire` to run once `window` has elapsed without another
    /// `notify()`. Safe to call from a synchronous watcher callback since
    /// it only spawns a task rather than awaiting.
    pub fn notify<F>(&self, fire: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let window = self.window;
        let pending = self.pending.clone();
        tokio::spawn(async move {
            let mut slot = pending.lock().await;
            if let Some(handle) = slot.take() {
                handle.abort();
            }
            let handle = tokio::spawn(async move {
                sleep(window).await;
                fire();
            });
            *slot = Some(handle);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn five_rapid_notifies_fire_exactly_once() {
        let debouncer = Debouncer::new(50);
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let counter = count.clone();
            debouncer.notify(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }

        tokio::time::sleep(StdDuration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn notifies_spaced_past_the_window_each_fire() {
        let debouncer = Debouncer::new(20);
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = count.clone();
            debouncer.notify(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(StdDuration::from_millis(60)).await;
        }

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
