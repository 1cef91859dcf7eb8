//! Cancelable deferred callbacks backed by tokio tasks.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

/// A single pending invocation that can be replaced or cancelled.
///
/// Scheduling a new callback always cancels the previous one. Recurring
/// timers sleep again only after the callback finished, so a slow callback
/// pushes the next tick back instead of overlapping with it.
#[derive(Debug, Default)]
pub struct Timer {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` after `timeout`, and keep running it every `timeout`
    /// afterwards when `recurring` is set.
    pub fn run<F, Fut>(&self, timeout: Duration, recurring: bool, callback: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.schedule(timeout, timeout, recurring, callback);
    }

    /// Run `callback` right away, then every `period` until cancelled.
    pub fn start<F, Fut>(&self, period: Duration, callback: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.schedule(Duration::ZERO, period, true, callback);
    }

    fn schedule<F, Fut>(&self, first: Duration, period: Duration, recurring: bool, mut callback: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut delay = first;
            loop {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                callback().await;
                if !recurring {
                    break;
                }
                delay = period;
            }
        });

        if let Some(previous) = self.slot().replace(handle) {
            previous.abort();
        }
    }

    /// Drop the pending invocation, if any. Safe to call repeatedly.
    pub fn cancel(&self) {
        if let Some(handle) = self.slot().take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter(timer: &Timer, timeout: Duration, recurring: bool) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        timer.run(timeout, recurring, move || {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        hits
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_the_pending_callback() {
        let timer = Timer::new();
        let first = counter(&timer, Duration::from_millis(200), false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = counter(&timer, Duration::from_millis(200), false);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let timer = Timer::new();
        timer.cancel();
        let hits = counter(&timer, Duration::from_millis(50), false);
        timer.cancel();
        timer.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recurring_timer_waits_for_slow_callbacks() {
        let timer = Timer::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        timer.run(Duration::from_secs(1), true, move || {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });

        // Ticks land at 1s, 3s, 5s: each callback holds the timer for a second.
        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        timer.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn start_fires_immediately() {
        let timer = Timer::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        timer.start(Duration::from_secs(20), move || {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
