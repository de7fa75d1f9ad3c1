//! Shared key/value bookkeeping for the balancer variants, translated
//! from `original_source/lib/etcd/balancer.go`'s `baseBalancer`.
//!
//! Deliberately lock-free: spec.md's "serialised under a single mutex"
//! requirement means the *balancer*, not just this multimap, owns one
//! critical section spanning bookkeeping and connection storage
//! together — each variant embeds a [`BaseState`] inside its own
//! `Mutex<...>` alongside its connection table rather than this type
//! taking its own lock.

use std::collections::HashMap;

use fabric_registry::Listener;

/// The `value -> [keys]` / `key -> value` bookkeeping shared by every
/// balancer variant.
pub struct BaseState {
    pub exclusive: bool,
    servers: HashMap<String, Vec<String>>,
    mapping: HashMap<String, String>,
    listeners: Vec<Box<dyn Listener>>,
}

impl BaseState {
    pub fn new(exclusive: bool) -> Self {
        Self {
            exclusive,
            servers: HashMap::new(),
            mapping: HashMap::new(),
            listeners: Vec::new(),
        }
    }

    /// Binds `key` to `value`. Returns the keys previously bound to
    /// `value`, if any, removing them first when running in exclusive
    /// mode.
    pub fn add_kv(&mut self, key: &str, value: &str) -> Option<Vec<String>> {
        let previous = self.servers.get(value).cloned();
        let early = previous.as_ref().is_some_and(|k| !k.is_empty());

        if self.exclusive && early {
            for each in previous.clone().unwrap_or_default() {
                self.remove_kv(&each);
            }
        }

        self.servers
            .entry(value.to_string())
            .or_default()
            .push(key.to_string());
        self.mapping.insert(key.to_string(), value.to_string());

        if early { previous } else { None }
    }

    /// Unbinds `key`. Returns `(value, keep_conn)`: `value` is the
    /// server `key` was bound to (empty if it wasn't bound at all), and
    /// `keep_conn` is true when other keys still reference that value,
    /// so the caller must not close its connection.
    pub fn remove_kv(&mut self, key: &str) -> (String, bool) {
        let Some(value) = self.mapping.remove(key) else {
            return (String::new(), true);
        };

        let keep = if let Some(keys) = self.servers.get_mut(&value) {
            keys.retain(|k| k != key);
            if keys.is_empty() {
                self.servers.remove(&value);
                false
            } else {
                true
            }
        } else {
            false
        };

        (value, keep)
    }

    pub fn add_listener(&mut self, listener: Box<dyn Listener>) {
        self.listeners.push(listener);
    }

    /// Notifies every listener with the full set of bound keys, the key
    /// that just triggered the change, and the full set of distinct
    /// values currently bound.
    pub fn notify(&self, key: &str) {
        if self.listeners.is_empty() {
            return;
        }

        let all_keys: Vec<String> = self.mapping.keys().cloned().collect();
        let all_values: Vec<String> = self.servers.keys().cloned().collect();
        for listener in &self.listeners {
            listener.on_add(&all_keys, key, &all_values);
        }
    }
}
