//! Key/value storage behind the entity cache.
//!
//! Backends are per-key atomic and know nothing about expiry; the entity cache
//! wraps values in its own envelope.

use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;
use tracing::debug;

use super::config::CacheConfig;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::storage";
const METRIC_EVICT: &str = "tripwire_entity_cache_evict_total";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: String, value: String) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Remove every key starting with `prefix`, returning how many went.
    async fn remove_prefix(&self, prefix: &str) -> Result<usize, StorageError>;
}

/// LRU-bounded in-process storage.
pub struct MemoryStorage {
    entries: Mutex<LruCache<String, String>>,
}

impl MemoryStorage {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.storage_limit_non_zero())),
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        mutex_lock(&self.entries, SOURCE, "contains").contains(key)
    }

    pub fn clear(&self) {
        mutex_lock(&self.entries, SOURCE, "clear").clear();
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(mutex_lock(&self.entries, SOURCE, "get").get(key).cloned())
    }

    async fn set(&self, key: String, value: String) -> Result<(), StorageError> {
        let evicted = mutex_lock(&self.entries, SOURCE, "set").push(key.clone(), value);
        // `push` also returns the old value when the key is overwritten.
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_EVICT, "reason" => "capacity").increment(1);
            debug!(key = %evicted_key, "Entity cache entry evicted by capacity");
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        mutex_lock(&self.entries, SOURCE, "remove").pop(key);
        Ok(())
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "remove_prefix");
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        Ok(doomed.len())
    }
}
