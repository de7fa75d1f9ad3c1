//! Prefix snapshot + watch, translated from
//! `original_source/lib/etcd/{subscriber,monitor}.go`.

use std::sync::Arc;

use fabric_core::{KvStore, WatchEvent, extract_key};
use tokio_stream::StreamExt;

use crate::container::{Container, Listener};

/// Maintains a live view of every value published under `prefix`,
/// refreshed by an initial snapshot and then a background watch.
pub struct Subscriber<K> {
    kv: Arc<K>,
    prefix: String,
    items: Container,
}

impl<K: KvStore + 'static> Subscriber<K> {
    /// Loads the initial snapshot and starts the background watch.
    pub async fn subscribe(
        kv: Arc<K>,
        prefix: impl Into<String>,
        exclusive: bool,
    ) -> anyhow::Result<Arc<Self>> {
        let subscriber = Arc::new(Self {
            kv,
            prefix: prefix.into(),
            items: Container::new(exclusive),
        });
        subscriber.load().await?;
        subscriber.clone().watch();
        Ok(subscriber)
    }

    pub fn add_listener(&self, listener: Box<dyn Listener>) {
        self.items.add_listener(listener);
    }

    /// The distinct set of values currently bound to at least one key.
    pub fn values(&self) -> Vec<String> {
        self.items.values()
    }

    async fn load(&self) -> anyhow::Result<()> {
        let entries = self.kv.get_prefix(&self.prefix).await?;
        for entry in entries {
            self.items.add_kv(&entry.key, &entry.value);
        }
        Ok(())
    }

    fn watch(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut stream = self.kv.watch_prefix(&self.prefix);
            while let Some(event) = stream.next().await {
                self.handle_event(event);
            }
            tracing::warn!(prefix = %self.prefix, "subscriber watch stream ended");
        });
    }

    fn handle_event(&self, event: WatchEvent) {
        match event {
            WatchEvent::Add(entry) => {
                if self.matches(&entry.key) {
                    self.items.add_kv(&entry.key, &entry.value);
                }
            }
            WatchEvent::Delete(entry) => {
                if self.matches(&entry.key) {
                    self.items.remove_kv(&entry.key);
                }
            }
        }
    }

    fn matches(&self, key: &str) -> bool {
        extract_key(key) == Some(self.prefix.as_str())
    }
}
