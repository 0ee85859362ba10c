//! Process-wide shutdown authority shared by every blocking loop.
//!
//! A [`CancellationSignal`] is created once at startup, cloned into each loop that must
//! observe it, and set exactly once when shutdown is requested. It is never reset.
//! Waits park on a condvar so a sleeping poll loop wakes as soon as the flag is set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Write-once cancellation flag. Cloning shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    inner: Arc<Inner>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every waiter. Later calls are no-ops.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        // Take the lock so a waiter between its flag check and `wait` cannot miss the notify.
        let _guard = self.inner.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for up to `timeout`, returning early if the signal is set.
    ///
    /// Returns `true` when cancelled (before or during the wait).
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self
                .inner
                .wake
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|p| p.into_inner());
            guard = next;
        }
    }
}
