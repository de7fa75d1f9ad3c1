//! An in-memory `CacheKv` double shared by this crate's unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::CacheKv;
use crate::error::CacheError;

pub struct MemoryCacheKv {
    store: Mutex<HashMap<String, String>>,
}

impl MemoryCacheKv {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CacheKv for MemoryCacheKv {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.store.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String, _ttl: Option<Duration>) -> Result<(), CacheError> {
        self.store.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.store.lock().unwrap().remove(key);
        Ok(())
    }
}
