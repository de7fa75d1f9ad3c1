//! A bounded concurrent-borrow counter with a timed wait, the async
//! analogue of `original_source/lib/syncx/timeoutlimit.go`.

use crate::Cond;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("timed out waiting to borrow")]
pub struct TimeoutError;

/// A non-blocking counting limit, the piece `TimeoutLimit` wraps with a
/// [`Cond`] to turn `try_borrow` failures into a bounded wait.
struct Limit {
    remaining: AtomicI64,
}

impl Limit {
    fn new(n: i64) -> Self {
        Self {
            remaining: AtomicI64::new(n),
        }
    }

    /// Takes one slot if available. Uses a CAS loop rather than a plain
    /// fetch_sub so a failed attempt never dips the counter negative.
    fn try_borrow(&self) -> bool {
        let mut cur = self.remaining.load(Ordering::Acquire);
        loop {
            if cur <= 0 {
                return false;
            }
            match self.remaining.compare_exchange_weak(
                cur,
                cur - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => cur = observed,
            }
        }
    }

    fn return_one(&self) {
        self.remaining.fetch_add(1, Ordering::AcqRel);
    }
}

/// Bounds how many callers may hold a borrow concurrently, blocking
/// (with a timeout) rather than rejecting outright when the limit is
/// currently exhausted.
pub struct TimeoutLimit {
    limit: Limit,
    cond: Cond,
}

impl TimeoutLimit {
    pub fn new(n: i64) -> Self {
        Self {
            limit: Limit::new(n),
            cond: Cond::new(),
        }
    }

    /// Takes a slot immediately, without waiting.
    pub fn try_borrow(&self) -> bool {
        self.limit.try_borrow()
    }

    /// Takes a slot, waiting up to `timeout` for one to free up. Retries
    /// against the remaining budget reported by [`Cond::wait_timeout`]
    /// rather than the full timeout, so a string of near-simultaneous
    /// signals can't extend the effective deadline.
    pub async fn borrow(&self, timeout: Duration) -> Result<(), TimeoutError> {
        if self.limit.try_borrow() {
            return Ok(());
        }

        let mut remaining = timeout;
        loop {
            let (left, signalled) = self.cond.wait_timeout(remaining).await;
            if !signalled {
                return Err(TimeoutError);
            }
            if self.limit.try_borrow() {
                return Ok(());
            }
            if left.is_zero() {
                return Err(TimeoutError);
            }
            remaining = left;
        }
    }

    /// Releases a previously taken slot and wakes one waiter, if any.
    pub fn return_one(&self) {
        self.limit.return_one();
        self.cond.signal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn borrows_up_to_the_limit() {
        let limit = TimeoutLimit::new(2);
        assert!(limit.try_borrow());
        assert!(limit.try_borrow());
        assert!(!limit.try_borrow());
    }

    #[tokio::test]
    async fn borrow_times_out_when_exhausted() {
        let limit = TimeoutLimit::new(1);
        assert!(limit.try_borrow());
        let err = limit.borrow(Duration::from_millis(20)).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn borrow_unblocks_on_return() {
        let limit = Arc::new(TimeoutLimit::new(1));
        assert!(limit.try_borrow());

        let waiter = {
            let limit = limit.clone();
            tokio::spawn(async move { limit.borrow(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        limit.return_one();

        assert!(waiter.await.unwrap().is_ok());
    }
}
