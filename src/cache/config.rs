//! Cache and invalidation configuration.
//!
//! Populated from the `[cache]`, `[tracker]` and `[invalidation]` sections of
//! `tripwire.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_STORAGE_LIMIT: usize = 10_000;
const DEFAULT_PAGE_LIMIT: usize = 2_000;
const DEFAULT_AUTO_CONSUME_INTERVAL_MS: u64 = 5000;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Evict entity-cache entries on invalidation.
    pub enable_entity_cache: bool,
    /// Evict rendered pages on invalidation.
    pub enable_page_cache: bool,
    /// Maximum entries held by the in-memory entity storage.
    pub storage_limit: usize,
    /// Maximum rendered pages held in memory.
    pub page_limit: usize,
    /// Keep soft-deleted intermediate entities in closures.
    pub include_deleted: bool,
    /// Interval (ms) of the background consumer for deferred requests.
    pub auto_consume_interval_ms: u64,
    /// Maximum requests per consumption batch.
    pub consume_batch_limit: usize,
    /// Closure resolution attempts before falling back to a coarse plan.
    pub retry_attempts: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_entity_cache: true,
            enable_page_cache: true,
            storage_limit: DEFAULT_STORAGE_LIMIT,
            page_limit: DEFAULT_PAGE_LIMIT,
            include_deleted: false,
            auto_consume_interval_ms: DEFAULT_AUTO_CONSUME_INTERVAL_MS,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

impl From<&crate::config::Settings> for CacheConfig {
    fn from(settings: &crate::config::Settings) -> Self {
        Self {
            enable_entity_cache: settings.cache.enable_entity_cache,
            enable_page_cache: settings.cache.enable_page_cache,
            storage_limit: settings.cache.storage_limit.get(),
            page_limit: settings.cache.page_limit.get(),
            include_deleted: settings.tracker.include_deleted,
            auto_consume_interval_ms: settings.invalidation.auto_consume_interval.as_millis()
                as u64,
            consume_batch_limit: settings.invalidation.consume_batch_limit.get(),
            retry_attempts: settings.invalidation.retry_attempts.get(),
        }
    }
}

impl CacheConfig {
    /// Returns true if any cache layer is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enable_entity_cache || self.enable_page_cache
    }

    pub fn storage_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.storage_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn page_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.page_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn auto_consume_interval(&self) -> Duration {
        Duration::from_millis(self.auto_consume_interval_ms.max(1))
    }

    /// At least one attempt is always made.
    pub fn attempts(&self) -> u32 {
        self.retry_attempts.max(1)
    }
}
