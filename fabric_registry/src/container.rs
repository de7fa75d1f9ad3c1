//! The key/value multimap backing [`crate::Subscriber`], translated
//! from `original_source/lib/etcd/subscriber.go`'s `container`.

use std::collections::HashMap;
use std::sync::Mutex;

/// Notified whenever the subscriber's key set changes.
pub trait Listener: Send + Sync {
    fn on_add(&self, keys: &[String], key: &str, values: &[String]);
}

struct Inner {
    exclusive: bool,
    values: HashMap<String, Vec<String>>,
    mapping: HashMap<String, String>,
    listeners: Vec<Box<dyn Listener>>,
}

/// Tracks which keys are bound to which values. In exclusive mode a
/// value may only ever be bound to one key at a time: binding a new key
/// first evicts whichever keys previously held that value.
pub struct Container {
    inner: Mutex<Inner>,
}

impl Container {
    pub fn new(exclusive: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                exclusive,
                values: HashMap::new(),
                mapping: HashMap::new(),
                listeners: Vec::new(),
            }),
        }
    }

    /// Binds `key` to `value`. Returns the keys previously bound to
    /// `value`, if any existed before this call.
    pub fn add_kv(&self, key: &str, value: &str) -> Option<Vec<String>> {
        let mut inner = self.inner.lock().unwrap();

        let previous = inner.values.get(value).cloned();
        let early = previous.as_ref().is_some_and(|k| !k.is_empty());

        if inner.exclusive && early {
            for each in previous.clone().unwrap_or_default() {
                Self::remove_locked(&mut inner, &each);
            }
        }

        inner
            .values
            .entry(value.to_string())
            .or_default()
            .push(key.to_string());
        inner.mapping.insert(key.to_string(), value.to_string());

        if early { previous } else { None }
    }

    /// Unbinds `key`, dropping the value entry entirely once no key
    /// references it anymore.
    pub fn remove_kv(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        Self::remove_locked(&mut inner, key);
    }

    fn remove_locked(inner: &mut Inner, key: &str) {
        let Some(value) = inner.mapping.remove(key) else {
            return;
        };
        if let Some(keys) = inner.values.get_mut(&value) {
            keys.retain(|k| k != key);
            if keys.is_empty() {
                inner.values.remove(&value);
            }
        }
    }

    pub fn add_listener(&self, listener: Box<dyn Listener>) {
        self.inner.lock().unwrap().listeners.push(listener);
    }

    pub fn values(&self) -> Vec<String> {
        self.inner.lock().unwrap().values.keys().cloned().collect()
    }

    pub fn notify_add(&self, keys: &[String], key: &str, values: &[String]) {
        let inner = self.inner.lock().unwrap();
        for listener in &inner.listeners {
            listener.on_add(keys, key, values);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn shared_mode_keeps_previous_keys() {
        let container = Container::new(false);
        assert_eq!(container.add_kv("k1", "v1"), None);
        assert_eq!(container.add_kv("k2", "v1"), Some(vec!["k1".to_string()]));
        assert_eq!(container.values(), vec!["v1".to_string()]);
    }

    #[test]
    fn exclusive_mode_evicts_previous_keys() {
        let container = Container::new(true);
        container.add_kv("k1", "v1");
        container.add_kv("k2", "v1");
        container.remove_kv("k1");
        // k1 was already evicted by exclusive rebind, so k2 remains alone.
        assert_eq!(container.values(), vec!["v1".to_string()]);
    }

    #[test]
    fn remove_kv_drops_empty_value_entries() {
        let container = Container::new(false);
        container.add_kv("k1", "v1");
        container.remove_kv("k1");
        assert!(container.values().is_empty());
    }

    #[test]
    fn listeners_receive_add_notifications() {
        struct Counter(Arc<AtomicUsize>);
        impl Listener for Counter {
            fn on_add(&self, _keys: &[String], _key: &str, _values: &[String]) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let count = Arc::new(AtomicUsize::new(0));
        let container = Container::new(false);
        container.add_listener(Box::new(Counter(count.clone())));
        container.notify_add(&["k1".into()], "k1", &["v1".into()]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
