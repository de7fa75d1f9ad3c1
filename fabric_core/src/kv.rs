//! Abstract interface to a strongly-consistent KV store with lease/watch
//! semantics (spec.md §6). Concrete drivers (etcd, consul, ...) are external
//! collaborators; this crate only pins down the shape they must implement.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio_stream::Stream;

/// Opaque lease identifier handed back by [`KvStore::grant_lease`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseId(pub i64);

/// A single key/value pair as stored under a registry prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
}

impl KvEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One incremental change delivered by a watch stream, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Add(KvEntry),
    Delete(KvEntry),
}

pub type WatchStream = Pin<Box<dyn Stream<Item = WatchEvent> + Send>>;

/// Yields a unit each time the lease is successfully renewed. The stream
/// ends when the keep-alive channel is lost (mirrors the Go `<-ch` closing),
/// at which point the caller must revoke and re-register from scratch.
pub type KeepAliveStream = Pin<Box<dyn Stream<Item = ()> + Send>>;

/// The minimal capability the registry publisher/subscriber need from a
/// KV store: leases with TTL, prefix reads, and a prefix watch.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn grant_lease(&self, ttl: Duration) -> anyhow::Result<LeaseId>;

    async fn put_with_lease(&self, key: &str, value: &str, lease: LeaseId) -> anyhow::Result<()>;

    /// Starts renewing `lease` in the background; the returned stream emits
    /// once per successful renewal and ends when renewal can no longer
    /// succeed.
    async fn keep_alive(&self, lease: LeaseId) -> anyhow::Result<KeepAliveStream>;

    async fn revoke(&self, lease: LeaseId) -> anyhow::Result<()>;

    /// Full snapshot of all entries under `prefix`.
    async fn get_prefix(&self, prefix: &str) -> anyhow::Result<Vec<KvEntry>>;

    /// Starts a watch over `prefix`; events arrive in stream order.
    fn watch_prefix(&self, prefix: &str) -> WatchStream;
}
