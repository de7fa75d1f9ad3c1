//! A single-wakeup condition signal, the async analogue of
//! `original_source/lib/syncx/cond.go`'s unbuffered-channel `Cond`.

use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Wakes at most one waiter per [`Cond::signal`] call (or, if nobody is
/// currently waiting, arms the next `wait`/`wait_timeout` to return
/// immediately — `tokio::sync::Notify`'s single-permit behavior).
#[derive(Debug, Default)]
pub struct Cond {
    notify: Notify,
}

impl Cond {
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
        }
    }

    /// Waits for a signal with no bound.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    /// Waits for a signal for at most `timeout`. Returns the remaining
    /// timeout budget and whether a signal arrived, mirroring the Go
    /// `WaitWithTimeout(timeout) (time.Duration, bool)` shape so callers
    /// (e.g. [`crate::TimeoutLimit::borrow`]) can retry against the
    /// remainder rather than the full timeout each loop iteration.
    pub async fn wait_timeout(&self, timeout: Duration) -> (Duration, bool) {
        let start = Instant::now();
        match tokio::time::timeout(timeout, self.notify.notified()).await {
            Ok(()) => (timeout.saturating_sub(start.elapsed()), true),
            Err(_) => (Duration::ZERO, false),
        }
    }

    /// Wakes one waiter, if any.
    pub fn signal(&self) {
        self.notify.notify_one();
    }

    /// Wakes every currently-waiting `wait`/`wait_timeout` call, the
    /// analogue of `sync.Cond.Broadcast` — unlike `signal`, a waiter that
    /// arrives after this call does not see it.
    pub fn broadcast(&self) {
        self.notify.notify_waiters();
    }
}
