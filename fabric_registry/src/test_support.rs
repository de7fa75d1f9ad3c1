//! An in-memory `KvStore` double shared by this crate's unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fabric_core::{KeepAliveStream, KvEntry, KvStore, LeaseId, WatchEvent, WatchStream, extract_key};
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

pub struct MemoryKv {
    store: Mutex<HashMap<String, String>>,
    next_lease: AtomicI64,
    events: broadcast::Sender<WatchEvent>,
}

impl MemoryKv {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            store: Mutex::new(HashMap::new()),
            next_lease: AtomicI64::new(1),
            events,
        }
    }

    pub fn seed(&self, key: &str, value: &str) {
        self.store.lock().unwrap().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.store.lock().unwrap().get(key).cloned()
    }

    pub fn publish_add(&self, key: &str, value: &str) {
        self.store.lock().unwrap().insert(key.into(), value.into());
        let _ = self.events.send(WatchEvent::Add(KvEntry::new(key, value)));
    }

    pub fn publish_delete(&self, key: &str, value: &str) {
        self.store.lock().unwrap().remove(key);
        let _ = self
            .events
            .send(WatchEvent::Delete(KvEntry::new(key, value)));
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn grant_lease(&self, _ttl: Duration) -> anyhow::Result<LeaseId> {
        Ok(LeaseId(self.next_lease.fetch_add(1, Ordering::SeqCst)))
    }

    async fn put_with_lease(&self, key: &str, value: &str, _lease: LeaseId) -> anyhow::Result<()> {
        self.store.lock().unwrap().insert(key.into(), value.into());
        Ok(())
    }

    async fn keep_alive(&self, _lease: LeaseId) -> anyhow::Result<KeepAliveStream> {
        Ok(Box::pin(tokio_stream::pending()))
    }

    async fn revoke(&self, _lease: LeaseId) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> anyhow::Result<Vec<KvEntry>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .iter()
            .filter(|(k, _)| extract_key(k) == Some(prefix))
            .map(|(k, v)| KvEntry::new(k.clone(), v.clone()))
            .collect())
    }

    fn watch_prefix(&self, _prefix: &str) -> WatchStream {
        let rx = self.events.subscribe();
        Box::pin(BroadcastStream::new(rx).filter_map(|item| item.ok()))
    }
}
