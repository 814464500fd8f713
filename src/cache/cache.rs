//! Generic cache trait and in-process implementation
//!
//! Entries are never evicted on their own: callers decide freshness from the
//! stored timestamp, which lets them fall back to a stale value when a
//! refresh fails.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// A cached value and when it was written
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: DateTime<Utc>,
}

/// Generic cache trait supporting any cloneable value
#[async_trait]
pub trait Cache<T: Clone + Send + Sync + 'static>: Send + Sync {
    /// Get a value from cache by key
    async fn get(&self, key: &str) -> Option<CacheEntry<T>>;

    /// Store a value, replacing whatever was there
    async fn set(&self, key: &str, value: T, stored_at: DateTime<Utc>);

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> bool;
}

/// Process-wide cache guarded by a single lock
///
/// Concurrent writers race; the last `set` wins and readers never observe a
/// partially written entry.
pub struct MemoryCache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T> MemoryCache<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> Default for MemoryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Cache<T> for MemoryCache<T> {
    async fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        let entry = self.entries.read().await.get(key).cloned();
        match entry {
            Some(_) => debug!("Cache hit for key: {}", key),
            None => debug!("Cache miss for key: {}", key),
        }
        entry
    }

    async fn set(&self, key: &str, value: T, stored_at: DateTime<Utc>) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), CacheEntry { value, stored_at });
        debug!("Cache set for key: {}", key);
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }
}
