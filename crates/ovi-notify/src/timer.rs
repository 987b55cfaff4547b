//! Injectable delay source for toast expiry.
//!
//! The queue never calls `tokio::time::sleep` directly; it goes
//! through [`Timer`] so tests can drive expiry by hand instead of
//! waiting out real seconds.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Boxed future returned by [`Timer::sleep`].
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Source of delay. Production uses [`TokioTimer`]; tests crank a
/// [`ManualTimer`].
pub trait Timer: Send + Sync {
    /// A future that completes after `duration` has passed, by
    /// whatever clock the implementation keeps.
    fn sleep(&self, duration: Duration) -> SleepFuture;
}

/// Real-time [`Timer`] over the tokio runtime clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Hand-cranked [`Timer`] with a virtual clock.
///
/// Sleeps register their deadline when created and complete only once
/// [`ManualTimer::advance`] moves the clock past it. Nothing here ever
/// waits on real time.
pub struct ManualTimer {
    inner: Mutex<ManualInner>,
}

struct ManualInner {
    now: Duration,
    entries: Vec<Entry>,
}

struct Entry {
    due: Duration,
    tx: oneshot::Sender<()>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ManualInner {
                now: Duration::ZERO,
                entries: Vec::new(),
            }),
        }
    }

    /// Move the virtual clock forward, completing every sleep whose
    /// deadline has passed.
    pub fn advance(&self, by: Duration) {
        let fired: Vec<oneshot::Sender<()>> = {
            let mut inner = self.inner.lock();
            inner.now += by;
            let now = inner.now;
            let (due, pending): (Vec<_>, Vec<_>) =
                inner.entries.drain(..).partition(|e| e.due <= now);
            inner.entries = pending;
            due.into_iter().map(|e| e.tx).collect()
        };
        for tx in fired {
            let _ = tx.send(());
        }
    }

    /// Sleeps still waiting on the virtual clock.
    pub fn pending(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for ManualTimer {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock();
            let due = inner.now + duration;
            inner.entries.push(Entry { due, tx });
        }
        Box::pin(async move {
            if rx.await.is_err() {
                // The entry was dropped without firing; never complete.
                std::future::pending::<()>().await;
            }
        })
    }
}
