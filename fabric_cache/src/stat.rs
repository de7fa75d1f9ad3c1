//! Cache hit/miss counters, grounded on the `CacheStat` usage in
//! `original_source/lib/stores/internal/cache.go` (`IncrementTotal`/
//! `IncrementCache`/`IncrementCacheFails`/`IncrementDbFails`).

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time read of a [`CacheStat`]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatSnapshot {
    pub total: u64,
    pub hits: u64,
    pub cache_fails: u64,
    pub db_fails: u64,
}

pub struct CacheStat {
    name: String,
    total: AtomicU64,
    hits: AtomicU64,
    cache_fails: AtomicU64,
    db_fails: AtomicU64,
}

impl CacheStat {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            cache_fails: AtomicU64::new(0),
            db_fails: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn increment_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_fails(&self) {
        self.cache_fails.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_db_fails(&self) {
        self.db_fails.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatSnapshot {
        CacheStatSnapshot {
            total: self.total.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            cache_fails: self.cache_fails.load(Ordering::Relaxed),
            db_fails: self.db_fails.load(Ordering::Relaxed),
        }
    }
}
