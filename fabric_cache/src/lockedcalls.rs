//! Key-serialized call group, translated from
//! `original_source/lib/syncx/lockedcall.go`. Unlike [`crate::SfGroup`],
//! waiters don't share the leader's result: each re-enters the critical
//! section in turn and runs `fn` itself exactly once.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Mutex;

use tokio::sync::Notify;

pub struct LockedCalls {
    keys: Mutex<HashSet<String>>,
    notify: Notify,
}

impl LockedCalls {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashSet::new()),
            notify: Notify::new(),
        }
    }

    pub async fn do_call<F, Fut, V, E>(&self, key: &str, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        loop {
            let notified = self.notify.notified();
            {
                let mut keys = self.keys.lock().unwrap();
                if !keys.contains(key) {
                    keys.insert(key.to_string());
                    break;
                }
            }
            notified.await;
        }

        let result = f().await;

        self.keys.lock().unwrap().remove(key);
        self.notify.notify_waiters();

        result
    }
}

impl Default for LockedCalls {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn each_caller_runs_fn_exactly_once() {
        let calls: Arc<LockedCalls> = Arc::new(LockedCalls::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let a_calls = calls.clone();
        let a_runs = runs.clone();
        let a = tokio::spawn(async move {
            a_calls
                .do_call("k", || async move {
                    a_runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<u32, String>(1)
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(5)).await;

        let b_calls = calls.clone();
        let b_runs = runs.clone();
        let b = tokio::spawn(async move {
            b_calls
                .do_call("k", || async move {
                    b_runs.fetch_add(1, Ordering::SeqCst);
                    Ok::<u32, String>(2)
                })
                .await
        });

        let a_result: Result<u32, String> = a.await.unwrap();
        let b_result: Result<u32, String> = b.await.unwrap();

        assert_eq!(a_result.unwrap(), 1);
        assert_eq!(b_result.unwrap(), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
