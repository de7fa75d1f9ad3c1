//! Consistent-hash balancer, translated from
//! `original_source/lib/etcd/{balancer,subclient}.go`'s
//! `consistentBalancer` / `ConsistentSubClient`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fabric_core::{Dialer, KvStore, WatchEvent, extract_id, extract_key};
use fabric_registry::Listener;
use fabric_sync::Cond;
use tokio_stream::StreamExt;

use crate::base::BaseState;
use crate::ring::ConsistentHash;

/// Derives a ring bucket identity from a registry `(key, value)` pair.
pub type Keyer = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

/// Default keyer: the bucket identity is the dialed value itself.
pub fn value_keyer() -> Keyer {
    Arc::new(|_key: &str, value: &str| value.to_string())
}

/// Alternate keyer: the bucket identity is the id extracted from the
/// registry key's trailing segment, falling back to the value when the
/// key carries no id (original `idBasedBalance`).
pub fn id_keyer() -> Keyer {
    Arc::new(|key: &str, value: &str| {
        extract_id(key)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string())
    })
}

struct State<C> {
    base: BaseState,
    conns: HashMap<String, C>,
    ring: ConsistentHash,
}

/// Routes by a stable hash of the caller-supplied probe key onto one of
/// the dialed connections, fed by a live registry watch under `prefix`.
/// Always runs in non-exclusive mode: rebinding a key to a different
/// value would otherwise churn ring placement on every event.
pub struct ConsistentHashBalancer<D, C> {
    state: Mutex<State<C>>,
    dialer: Arc<D>,
    keyer: Keyer,
    ready: Cond,
}

impl<D, C> ConsistentHashBalancer<D, C>
where
    D: Dialer<C> + 'static,
    C: Clone + Send + Sync + 'static,
{
    pub fn new(dialer: Arc<D>, keyer: Keyer) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                base: BaseState::new(false),
                conns: HashMap::new(),
                ring: ConsistentHash::new(),
            }),
            dialer,
            keyer,
            ready: Cond::new(),
        })
    }

    pub async fn subscribe<K: KvStore + 'static>(
        kv: Arc<K>,
        prefix: impl Into<String>,
        dialer: Arc<D>,
        keyer: Keyer,
    ) -> anyhow::Result<Arc<Self>> {
        let prefix = prefix.into();
        let balancer = Self::new(dialer, keyer);

        let entries = kv.get_prefix(&prefix).await?;
        for entry in &entries {
            if extract_key(&entry.key).as_deref() != Some(prefix.as_str()) {
                continue;
            }
            if let Err(err) = balancer.add_conn(&entry.key, &entry.value).await {
                tracing::error!(error = %err, key = %entry.key, "initial dial failed");
            }
        }

        let watch_balancer = balancer.clone();
        let watch_prefix = prefix.clone();
        tokio::spawn(async move {
            let mut stream = kv.watch_prefix(&watch_prefix);
            while let Some(event) = stream.next().await {
                watch_balancer.handle_watch_event(&watch_prefix, event).await;
            }
            tracing::warn!(prefix = %watch_prefix, "balancer watch stream ended");
        });

        Ok(balancer)
    }

    async fn handle_watch_event(self: &Arc<Self>, prefix: &str, event: WatchEvent) {
        match event {
            WatchEvent::Add(entry) => {
                if extract_key(&entry.key).as_deref() != Some(prefix) {
                    return;
                }
                if let Err(err) = self.add_conn(&entry.key, &entry.value).await {
                    tracing::error!(error = %err, key = %entry.key, "dial failed on add");
                }
            }
            WatchEvent::Delete(entry) => {
                if extract_key(&entry.key).as_deref() != Some(prefix) {
                    return;
                }
                self.remove_conn(&entry.key).await;
            }
        }
    }

    pub fn add_listener(&self, listener: Box<dyn Listener>) {
        self.state.lock().unwrap().base.add_listener(listener);
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().conns.is_empty()
    }

    /// Routes `probe` to the connection owning its ring slot.
    pub fn next(&self, probe: &str) -> Option<C> {
        let state = self.state.lock().unwrap();
        let bucket = state.ring.get(probe)?;
        state.conns.get(&bucket).cloned()
    }

    pub async fn wait_for_servers(&self) {
        if self.is_empty() {
            self.ready.wait().await;
        }
    }

    pub async fn wait_for_servers_timeout(&self, timeout: Duration) -> bool {
        if !self.is_empty() {
            return true;
        }
        let (_, signalled) = self.ready.wait_timeout(timeout).await;
        signalled
    }

    pub async fn add_conn(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.state.lock().unwrap().base.add_kv(key, value);

        let conn = match self.dialer.dial(value).await {
            Ok(conn) => conn,
            Err(err) => {
                self.state.lock().unwrap().base.remove_kv(key);
                return Err(err);
            }
        };

        let bucket_key = (self.keyer)(key, value);
        {
            let mut state = self.state.lock().unwrap();
            state.conns.insert(bucket_key.clone(), conn);
            state.ring.add(bucket_key.clone());
            state.base.notify(&bucket_key);
        }
        self.ready.broadcast();
        Ok(())
    }

    pub async fn remove_conn(&self, key: &str) {
        let (value, keep) = self.state.lock().unwrap().base.remove_kv(key);
        let bucket_key = (self.keyer)(key, &value);

        // The ring entry is dropped unconditionally, matching the
        // original: when the keyer maps several keys onto one bucket
        // identity, removing any one of them evicts the shared slot
        // even while `keep` says the connection itself should stay.
        let removed = {
            let mut state = self.state.lock().unwrap();
            state.ring.remove(&bucket_key);
            if keep {
                None
            } else {
                state.conns.remove(&bucket_key)
            }
        };

        if let Some(conn) = removed {
            if let Err(err) = self.dialer.close(&conn).await {
                tracing::error!(error = %err, bucket = %bucket_key, "failed to close connection");
            }
        }
    }
}
