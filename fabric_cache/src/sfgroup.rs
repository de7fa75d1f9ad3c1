//! Single-flight call group, translated from
//! `original_source/lib/syncx/exclusivecall.go`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

struct Call<V, E> {
    notify: Notify,
    outcome: Mutex<Option<Result<V, E>>>,
}

impl<V, E> Call<V, E>
where
    V: Clone,
    E: Clone,
{
    fn new() -> Arc<Self> {
        Arc::new(Self {
            notify: Notify::new(),
            outcome: Mutex::new(None),
        })
    }

    async fn wait(&self) -> Result<V, E> {
        loop {
            // Registering interest before checking the outcome is required:
            // `notify_waiters` only wakes futures that already exist, so a
            // notify fired between the check and the await would otherwise
            // be missed.
            let notified = self.notify.notified();
            if let Some(result) = self.outcome.lock().unwrap().clone() {
                return result;
            }
            notified.await;
        }
    }

    fn complete(&self, result: Result<V, E>) {
        *self.outcome.lock().unwrap() = Some(result);
        self.notify.notify_waiters();
    }
}

/// Deduplicates concurrent calls that share a key: the first caller to
/// arrive ("the leader") runs `fn`; everyone who arrives while it's
/// in-flight waits and receives the same `(val, err)` without re-running
/// it. The key is deleted from the table before the barrier is released,
/// so a waiter can never observe the entry after it's already gone stale.
pub struct SfGroup<V, E> {
    calls: Mutex<HashMap<String, Arc<Call<V, E>>>>,
}

impl<V, E> SfGroup<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `f` under `key`, deduplicating concurrent callers. Returns
    /// `true` in the second element iff this caller was the leader (ran
    /// `f` itself rather than reusing an in-flight result).
    pub async fn do_ex<F, Fut>(&self, key: &str, f: F) -> (Result<V, E>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let (call, is_leader) = {
            let mut calls = self.calls.lock().unwrap();
            if let Some(existing) = calls.get(key) {
                (existing.clone(), false)
            } else {
                let call = Call::new();
                calls.insert(key.to_string(), call.clone());
                (call, true)
            }
        };

        if !is_leader {
            return (call.wait().await, false);
        }

        let result = f().await;

        self.calls.lock().unwrap().remove(key);
        call.complete(result.clone());

        (result, true)
    }

    pub async fn do_call<F, Fut>(&self, key: &str, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.do_ex(key, f).await.0
    }
}

impl<V, E> Default for SfGroup<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn leader_runs_fn_and_waiter_reuses_result() {
        let group: Arc<SfGroup<u32, String>> = Arc::new(SfGroup::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let leader_group = group.clone();
        let leader_runs = runs.clone();
        let leader = tokio::spawn(async move {
            leader_group
                .do_ex("k", || async move {
                    leader_runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok::<u32, String>(7)
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(5)).await;

        let waiter_group = group.clone();
        let waiter = tokio::spawn(async move {
            waiter_group
                .do_ex("k", || async move { Ok::<u32, String>(999) })
                .await
        });

        let (leader_val, leader_fresh) = leader.await.unwrap();
        let (waiter_val, waiter_fresh) = waiter.await.unwrap();

        assert_eq!(leader_val.unwrap(), 7);
        assert!(leader_fresh);
        assert_eq!(waiter_val.unwrap(), 7);
        assert!(!waiter_fresh);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn key_is_available_again_after_completion() {
        let group: SfGroup<u32, String> = SfGroup::new();
        let (first, _) = group.do_ex("k", || async { Ok::<u32, String>(1) }).await;
        let (second, fresh) = group.do_ex("k", || async { Ok::<u32, String>(2) }).await;

        assert_eq!(first.unwrap(), 1);
        assert_eq!(second.unwrap(), 2);
        assert!(fresh);
    }
}
