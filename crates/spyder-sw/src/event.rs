//! Event lifetime extension.
//!
//! The host may suspend the worker whenever no event is being handled. Any
//! async work started from a handler has to be registered here first, the
//! same way `event.waitUntil()` holds an extendable event open.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    pending: AtomicUsize,
    idle: Notify,
}

/// Counts work that keeps the worker alive.
#[derive(Debug, Clone, Default)]
pub struct KeepAlive {
    inner: Arc<Inner>,
}

impl KeepAlive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the worker open until the returned guard is dropped.
    pub fn extend(&self) -> LifetimeGuard {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        LifetimeGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Run `work` with the worker held open for its whole duration.
    pub async fn wait_until<F: Future>(&self, work: F) -> F::Output {
        let _guard = self.extend();
        work.await
    }

    /// Number of outstanding extensions.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Whether the host may suspend the worker right now.
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Resolve once no extension is outstanding.
    pub async fn idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

/// Releases one extension on drop.
#[derive(Debug)]
pub struct LifetimeGuard {
    inner: Arc<Inner>,
}

impl Drop for LifetimeGuard {
    fn drop(&mut self) {
        if self.inner.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
