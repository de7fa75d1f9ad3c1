//! Read-through cache with placeholder negative caching, translated from
//! `original_source/lib/stores/internal/cache.go`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CacheError, TakeError};
use crate::sfgroup::SfGroup;
use crate::stat::CacheStat;

/// Sentinel value written in place of a cache entry to remember "this key
/// doesn't exist" without re-querying the loader on every miss.
pub const NOT_FOUND_PLACEHOLDER: &str = "*";
/// TTL applied to a placeholder entry — short, so a later write is picked
/// up promptly rather than shadowed by a stale negative cache.
pub const NOT_FOUND_EXPIRY: Duration = Duration::from_secs(60);

/// Minimal capability the cache needs from its backing store. Deliberately
/// string-valued (mirroring the original's Redis string commands) rather
/// than tied to any concrete client.
#[async_trait]
pub trait CacheKv: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn del(&self, key: &str) -> Result<(), CacheError>;
}

/// Read-through cache in front of a loader of error type `E`. `E` must be
/// `Clone`: unlike Go's `interface{}`, a Rust `SfGroup` waiter needs its
/// own owned copy of the leader's outcome, not a shared reference.
pub struct Cache<K, E> {
    kv: Arc<K>,
    barrier: SfGroup<String, TakeError<E>>,
    stat: Arc<CacheStat>,
}

impl<K, E> Cache<K, E>
where
    K: CacheKv + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(kv: Arc<K>, stat: Arc<CacheStat>) -> Self {
        Self {
            kv,
            barrier: SfGroup::new(),
            stat,
        }
    }

    pub fn stat(&self) -> &CacheStat {
        &self.stat
    }

    pub async fn del_cache(&self, key: &str) -> Result<(), CacheError> {
        self.kv.del(key).await
    }

    /// Invalidates `key` before running a write (`exec`), matching the
    /// original's `ExecDropCache`/`*DropCache` family: the delete happens
    /// first so a stale read racing the write has the smallest possible
    /// window to repopulate the cache with pre-write data.
    pub async fn exec_drop_cache<T, F, Fut>(&self, key: &str, exec: F) -> Result<T, TakeError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.del_cache(key).await.map_err(TakeError::Cache)?;
        exec().await.map_err(TakeError::Db)
    }

    pub async fn set_cache<V: Serialize + Sync>(
        &self,
        key: &str,
        value: &V,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let data = serde_json::to_string(value).map_err(|e| CacheError(e.into()))?;
        self.kv.set(key, data, ttl).await
    }

    async fn set_cache_with_not_found(&self, key: &str) -> Result<(), CacheError> {
        self.kv
            .set(key, NOT_FOUND_PLACEHOLDER.to_string(), Some(NOT_FOUND_EXPIRY))
            .await
    }

    /// Single entry point: check the cache, fall through to `load` on a
    /// miss, write the loaded value back. `load` reports [`TakeError::NotFound`]
    /// (via returning `Err(TakeError::NotFound)`) to have the miss recorded
    /// as a placeholder, or `Err(TakeError::Db(e))` for any other failure.
    pub async fn take<V, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        load: F,
    ) -> Result<V, TakeError<E>>
    where
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, TakeError<E>>> + Send,
    {
        self.stat.increment_total();

        let (encoded, is_leader) = self
            .barrier
            .do_ex(key, || self.run_load(key, ttl, load))
            .await;

        let encoded = encoded?;
        if !is_leader {
            // Waiters reusing the leader's already-encoded result count as
            // cache hits too, but only once the outcome is known good.
            self.stat.increment_cache();
        }

        serde_json::from_str(&encoded).map_err(|e| TakeError::Cache(CacheError(e.into())))
    }

    async fn run_load<V, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        load: F,
    ) -> Result<String, TakeError<E>>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, TakeError<E>>>,
    {
        match self.query_cache::<V>(key).await {
            Ok(value) => {
                self.stat.increment_cache();
                return serde_json::to_string(&value).map_err(|e| TakeError::Cache(CacheError(e.into())));
            }
            Err(TakeError::NotFound) => {}
            Err(TakeError::Cache(err)) => {
                self.stat.increment_cache_fails();
                // Fast-fail: a cache transport error must not fall through
                // to the loader, or a cache outage would stampede it.
                return Err(TakeError::Cache(err));
            }
            Err(TakeError::Db(_)) => unreachable!("query_cache never returns Db"),
        }

        match load().await {
            Ok(value) => {
                let encoded =
                    serde_json::to_string(&value).map_err(|e| TakeError::Cache(CacheError(e.into())))?;
                if let Err(err) = self.set_cache(key, &value, Some(ttl)).await {
                    tracing::error!(error = %err, key, "failed to populate cache after load");
                }
                Ok(encoded)
            }
            Err(TakeError::NotFound) => {
                if let Err(err) = self.set_cache_with_not_found(key).await {
                    tracing::error!(error = %err, key, "failed to write not-found placeholder");
                }
                Err(TakeError::NotFound)
            }
            Err(TakeError::Db(err)) => {
                self.stat.increment_db_fails();
                Err(TakeError::Db(err))
            }
            Err(TakeError::Cache(err)) => Err(TakeError::Cache(err)),
        }
    }

    async fn query_cache<V>(&self, key: &str) -> Result<V, TakeError<E>>
    where
        V: DeserializeOwned,
    {
        let data = self.kv.get(key).await.map_err(TakeError::Cache)?;
        let data = match data {
            Some(data) if !data.is_empty() => data,
            _ => return Err(TakeError::NotFound),
        };

        if data == NOT_FOUND_PLACEHOLDER {
            return Err(TakeError::NotFound);
        }

        serde_json::from_str(&data).map_err(|e| TakeError::Cache(CacheError(e.into())))
    }
}
