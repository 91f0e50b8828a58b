//! Cancellable background tasks.
//!
//! A [`TaskHandle`] wraps a `tokio` join handle and aborts its task when
//! dropped or explicitly cancelled. Device sessions use this to guarantee
//! that no interval or deadline timer outlives the session that created it.

use std::future::Future;

use tokio::task::JoinHandle;

/// A running background task that can be cancelled.
#[derive(Debug)]
pub struct TaskHandle {
    handle: JoinHandle<()>,
}

impl TaskHandle {
    /// Aborts the underlying task. Idempotent: aborting a finished or
    /// already-aborted task is a no-op.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns `future` on the current `tokio` runtime and returns a handle that
/// can later abort it.
pub fn run<F>(future: F) -> TaskHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    TaskHandle {
        handle: tokio::task::spawn(future),
    }
}

/// Spawns `future` and forgets the handle: fire-and-forget, used by
/// [`crate::utils::events::EventManager::emit`] where no caller ever needs
/// to cancel an individual callback invocation.
pub fn fire<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::task::spawn(future);
}

/// Spawns a repeating interval task calling `tick` every `period`, returning
/// a [`TaskHandle`] that stops the loop when aborted.
pub fn interval<F, Fut>(period: std::time::Duration, mut tick: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    run(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // first tick fires immediately, skip it
        loop {
            ticker.tick().await;
            tick().await;
        }
    })
}

/// Spawns a one-shot deadline task calling `fire_at` after `delay`.
pub fn deadline<F, Fut>(delay: std::time::Duration, fire_at: F) -> TaskHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    run(async move {
        tokio::time::sleep(delay).await;
        fire_at().await;
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_interval_ticks_and_aborts() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let handle = interval(Duration::from_millis(10), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(55)).await;
        handle.abort();
        let seen = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), seen, "ticks stop after abort");
        assert!(seen >= 3, "expected several ticks, got {seen}");
    }

    #[tokio::test]
    async fn test_deadline_fires_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let _handle = deadline(Duration::from_millis(10), move || async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_aborts_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        {
            let _handle = interval(Duration::from_millis(10), move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            });
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let seen = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), seen, "dropping the handle cancels the task");
    }
}
