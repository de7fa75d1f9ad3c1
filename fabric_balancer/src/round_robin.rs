//! Round-robin balancer, translated from
//! `original_source/lib/etcd/{balancer,subclient}.go`'s
//! `roundRobinBalancer` / `RoundRobinSubClient`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fabric_core::{Dialer, KvStore, WatchEvent, extract_key};
use fabric_registry::Listener;
use fabric_sync::Cond;
use rand::Rng;
use tokio_stream::StreamExt;

use crate::base::BaseState;

struct Conn<C> {
    key: String,
    conn: C,
}

struct State<C> {
    base: BaseState,
    conns: Vec<Conn<C>>,
    index: usize,
}

/// Cycles through dialed connections in round-robin order, fed by a
/// live registry watch under `prefix`.
pub struct RoundRobinBalancer<D, C> {
    state: Mutex<State<C>>,
    dialer: Arc<D>,
    ready: Cond,
}

impl<D, C> RoundRobinBalancer<D, C>
where
    D: Dialer<C> + 'static,
    C: Clone + Send + Sync + 'static,
{
    pub fn new(dialer: Arc<D>, exclusive: bool) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                base: BaseState::new(exclusive),
                conns: Vec::new(),
                index: 0,
            }),
            dialer,
            ready: Cond::new(),
        })
    }

    /// Performs the initial snapshot dial and starts the background
    /// watch for `prefix`, the round-robin analogue of the original's
    /// `NewRoundRobinSubClient`.
    pub async fn subscribe<K: KvStore + 'static>(
        kv: Arc<K>,
        prefix: impl Into<String>,
        dialer: Arc<D>,
        exclusive: bool,
    ) -> anyhow::Result<Arc<Self>> {
        let prefix = prefix.into();
        let balancer = Self::new(dialer, exclusive);

        let entries = kv.get_prefix(&prefix).await?;
        for entry in &entries {
            if extract_key(&entry.key).as_deref() != Some(prefix.as_str()) {
                continue;
            }
            if let Err(err) = balancer.add_conn(&entry.key, &entry.value).await {
                tracing::error!(error = %err, key = %entry.key, "initial dial failed");
            }
        }
        balancer.randomize_cursor();

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

    fn randomize_cursor(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.conns.is_empty() {
            let len = state.conns.len();
            state.index = rand::rng().random_range(0..len);
        }
    }

    pub fn add_listener(&self, listener: Box<dyn Listener>) {
        self.state.lock().unwrap().base.add_listener(listener);
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().conns.is_empty()
    }

    pub fn next(&self) -> Option<C> {
        let mut state = self.state.lock().unwrap();
        if state.conns.is_empty() {
            return None;
        }
        state.index = (state.index + 1) % state.conns.len();
        Some(state.conns[state.index].conn.clone())
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
        let previous = self.state.lock().unwrap().base.add_kv(key, value);

        let reused = match previous {
            Some(prev) => self.handle_previous(prev, value).await,
            None => None,
        };

        let conn = match reused {
            Some(conn) => conn,
            None => match self.dialer.dial(value).await {
                Ok(conn) => conn,
                Err(err) => {
                    self.state.lock().unwrap().base.remove_kv(key);
                    return Err(err);
                }
            },
        };

        {
            let mut state = self.state.lock().unwrap();
            state.conns.push(Conn {
                key: key.to_string(),
                conn,
            });
            state.base.notify(key);
        }
        self.ready.broadcast();
        Ok(())
    }

    async fn handle_previous(&self, prev: Vec<String>, server: &str) -> Option<C> {
        if prev.is_empty() {
            return None;
        }

        let exclusive = self.state.lock().unwrap().base.exclusive;
        if !exclusive {
            return self
                .state
                .lock()
                .unwrap()
                .conns
                .iter()
                .find(|c| c.key == prev[0])
                .map(|c| c.conn.clone());
        }

        for item in prev {
            let stale = {
                let mut state = self.state.lock().unwrap();
                state.base.remove_kv(&item);
                let mut kept = Vec::new();
                let mut closed = None;
                for each in state.conns.drain(..) {
                    if each.key == item {
                        closed = Some(each.conn);
                    } else {
                        kept.push(each);
                    }
                }
                state.conns = kept;
                closed
            };
            if let Some(conn) = stale {
                if let Err(err) = self.dialer.close(&conn).await {
                    tracing::error!(error = %err, server = %server, "failed to close stale connection");
                }
            }
        }
        None
    }

    pub async fn remove_conn(&self, key: &str) {
        let (server, keep) = self.state.lock().unwrap().base.remove_kv(key);
        if keep {
            return;
        }

        let removed = {
            let mut state = self.state.lock().unwrap();
            let mut kept = Vec::new();
            let mut removed = None;
            for each in state.conns.drain(..) {
                if each.key == key {
                    removed = Some(each.conn);
                } else {
                    kept.push(each);
                }
            }
            state.conns = kept;
            removed
        };

        if let Some(conn) = removed {
            if let Err(err) = self.dialer.close(&conn).await {
                tracing::error!(error = %err, server = %server, "failed to close connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDialer {
        dials: AtomicUsize,
    }

    #[async_trait]
    impl Dialer<String> for CountingDialer {
        async fn dial(&self, addr: &str) -> anyhow::Result<String> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            Ok(addr.to_string())
        }
    }

    #[tokio::test]
    async fn next_cycles_through_connections() {
        let dialer = Arc::new(CountingDialer {
            dials: AtomicUsize::new(0),
        });
        let balancer = RoundRobinBalancer::new(dialer, false);
        balancer.add_conn("k1", "addr-a").await.unwrap();
        balancer.add_conn("k2", "addr-b").await.unwrap();

        let first = balancer.next().unwrap();
        let second = balancer.next().unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn remove_conn_empties_the_table() {
        let dialer = Arc::new(CountingDialer {
            dials: AtomicUsize::new(0),
        });
        let balancer = RoundRobinBalancer::new(dialer, false);
        balancer.add_conn("k1", "addr-a").await.unwrap();
        assert!(!balancer.is_empty());

        balancer.remove_conn("k1").await;
        assert!(balancer.is_empty());
        assert_eq!(balancer.next(), None);
    }

    #[tokio::test]
    async fn exclusive_mode_evicts_previous_connection() {
        let dialer = Arc::new(CountingDialer {
            dials: AtomicUsize::new(0),
        });
        let balancer = RoundRobinBalancer::new(dialer, true);
        balancer.add_conn("k1", "addr-a").await.unwrap();
        balancer.add_conn("k2", "addr-a").await.unwrap();

        // k1 is evicted; only one connection remains for addr-a.
        let state = balancer.state.lock().unwrap();
        assert_eq!(state.conns.len(), 1);
        assert_eq!(state.conns[0].key, "k2");
    }
}
