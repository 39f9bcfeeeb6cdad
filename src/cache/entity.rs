//! Read-through TTL cache of origin entities.
//!
//! Every item is stored under its id key and, when it has one, its slug key.
//! Values are wrapped in a JSON envelope:
//!
//! ```json
//! {"item": {...}, "slug": "lisbon", "expireAt": 1767225600000}
//! ```
//!
//! `expireAt` is absolute milliseconds since the Unix epoch; entries without
//! it never expire. Expired entries read as misses and are left for the next
//! write to replace.
//!
//! The slugs written for each id are also tracked in process, so eviction
//! finds the slug keys even after the id key itself is gone.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::{counter, histogram};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::entities::{EntityRef, EntityType};

use super::clock::Clock;
use super::keys::CacheKey;
use super::lock::mutex_lock;
use super::origin::{OriginError, OriginRequest, RemoteOrigin};
use super::storage::{KeyValueStorage, StorageError};

const SOURCE: &str = "cache::entity";
const METRIC_HIT: &str = "tripwire_entity_cache_hit_total";
const METRIC_MISS: &str = "tripwire_entity_cache_miss_total";
const METRIC_EXPIRED: &str = "tripwire_entity_cache_expired_total";
const METRIC_EVICT: &str = "tripwire_entity_cache_evict_total";
const METRIC_ORIGIN_FETCH_MS: &str = "tripwire_origin_fetch_ms";

/// Anything the entity cache can hold.
pub trait CacheItem: Serialize + DeserializeOwned + Send + Sync {
    /// Textual id; `None` when the item has none.
    fn cache_id(&self) -> Option<Cow<'_, str>>;

    fn cache_slug(&self) -> Option<&str> {
        None
    }
}

/// Untyped origin payloads carry `id` and optionally `slug` fields. Numeric
/// ids are keyed by their decimal text.
impl CacheItem for serde_json::Value {
    fn cache_id(&self) -> Option<Cow<'_, str>> {
        match self.get("id")? {
            serde_json::Value::String(id) => Some(Cow::Borrowed(id.as_str())),
            serde_json::Value::Number(id) => Some(Cow::Owned(id.to_string())),
            _ => None,
        }
    }

    fn cache_slug(&self) -> Option<&str> {
        self.get("slug").and_then(serde_json::Value::as_str)
    }
}

/// Fetch misses from the origin and cache them with this ttl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOnMiss {
    /// `None` caches fetched items without expiry.
    pub expire_in_seconds: Option<u64>,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Origin(#[from] OriginError),
    #[error("{entity_type} item has no usable id")]
    MissingId { entity_type: EntityType },
    #[error("failed to encode cache entry {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    item: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    slug: Option<String>,
    #[serde(rename = "expireAt", default, skip_serializing_if = "Option::is_none")]
    expire_at: Option<i64>,
}

pub struct EntityCache {
    storage: Arc<dyn KeyValueStorage>,
    origin: Arc<dyn RemoteOrigin>,
    clock: Arc<dyn Clock>,
    default_ttl: Option<u64>,
    /// Id key to every slug key written alongside it.
    slugs: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl EntityCache {
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        origin: Arc<dyn RemoteOrigin>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            origin,
            clock,
            default_ttl: None,
            slugs: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_ttl(mut self, expire_in_seconds: Option<u64>) -> Self {
        self.default_ttl = expire_in_seconds;
        self
    }

    /// Fetch option carrying the configured default ttl.
    pub fn default_fetch(&self) -> FetchOnMiss {
        FetchOnMiss {
            expire_in_seconds: self.default_ttl,
        }
    }

    /// Write `item` under its id key and its slug key, if any.
    ///
    /// The two writes are sequential; a failure between them leaves only the
    /// id key written.
    pub async fn set<T: CacheItem>(
        &self,
        entity_type: EntityType,
        item: &T,
        expire_in_seconds: Option<u64>,
    ) -> Result<(), CacheError> {
        let entry = self.prepare(entity_type, item, expire_in_seconds)?;
        self.write(entry).await
    }

    /// Delete the single key `id_or_slug`. The twin key, if any, is untouched.
    pub async fn remove(&self, entity_type: EntityType, id_or_slug: &str) -> Result<(), CacheError> {
        let key = CacheKey::new(entity_type, id_or_slug);
        self.storage.remove(&key.to_string()).await?;
        Ok(())
    }

    /// Delete the id key of a cached entity and every slug key written with
    /// it. Returns the number of keys removed.
    ///
    /// Slugs come from the in-process index and from the stored entry, so a
    /// slug key outliving its id key is still found.
    pub async fn evict(&self, entity: &EntityRef) -> Result<usize, CacheError> {
        let id_key = CacheKey::for_entity(entity).to_string();
        let mut slug_keys = mutex_lock(&self.slugs, SOURCE, "evict")
            .get(&id_key)
            .cloned()
            .unwrap_or_default();

        let mut removed = 0;
        if let Some(raw) = self.storage.get(&id_key).await? {
            if let Some(slug) = serde_json::from_str::<Envelope<IgnoredAny>>(&raw)
                .ok()
                .and_then(|envelope| envelope.slug)
            {
                slug_keys.insert(CacheKey::new(entity.entity_type, slug).to_string());
            }
            self.storage.remove(&id_key).await?;
            removed += 1;
        }
        for slug_key in &slug_keys {
            if self.storage.get(slug_key).await?.is_some() {
                self.storage.remove(slug_key).await?;
                removed += 1;
            }
        }
        mutex_lock(&self.slugs, SOURCE, "evict").remove(&id_key);

        if removed > 0 {
            counter!(METRIC_EVICT, "reason" => "invalidation").increment(removed as u64);
        }
        debug!(entity = %entity, removed, "Entity cache entry evicted");
        Ok(removed)
    }

    /// Delete every entry of `entity_type`. Returns the number of keys removed.
    pub async fn evict_type(&self, entity_type: EntityType) -> Result<usize, CacheError> {
        let prefix = CacheKey::type_prefix(entity_type);
        let removed = self.storage.remove_prefix(&prefix).await?;
        mutex_lock(&self.slugs, SOURCE, "evict_type")
            .retain(|id_key, _| !id_key.starts_with(&prefix));

        if removed > 0 {
            counter!(METRIC_EVICT, "reason" => "invalidation").increment(removed as u64);
        }
        debug!(entity_type = %entity_type, removed, "Entity cache type flushed");
        Ok(removed)
    }

    pub async fn get_single<T: CacheItem>(
        &self,
        entity_type: EntityType,
        id_or_slug: &str,
    ) -> Result<Option<T>, CacheError> {
        self.lookup(entity_type, id_or_slug).await
    }

    /// Batch lookup, all or nothing.
    ///
    /// Results line up with `ids` followed by `slugs`. When any key misses and
    /// `fetch` is `None` the whole batch is `None`. Otherwise every miss is
    /// fetched in a single origin call; if that call fails nothing is cached.
    pub async fn get<T: CacheItem>(
        &self,
        entity_type: EntityType,
        ids: &[String],
        slugs: &[String],
        fetch: Option<FetchOnMiss>,
    ) -> Result<Option<Vec<T>>, CacheError> {
        let keys: Vec<&str> = ids.iter().chain(slugs).map(String::as_str).collect();

        let mut slots: Vec<Option<T>> = Vec::with_capacity(keys.len());
        for key in &keys {
            slots.push(self.lookup(entity_type, key).await?);
        }

        let missing: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(position, _)| position)
            .collect();
        if missing.is_empty() {
            return Ok(Some(slots.into_iter().flatten().collect()));
        }
        let Some(fetch) = fetch else {
            return Ok(None);
        };

        let (missing_ids, missing_slugs): (Vec<usize>, Vec<usize>) =
            missing.iter().partition(|&&position| position < ids.len());
        let request = OriginRequest {
            entity_type,
            ids: missing_ids.iter().map(|&p| keys[p].to_string()).collect(),
            slugs: missing_slugs.iter().map(|&p| keys[p].to_string()).collect(),
        };

        let items: Vec<T> = self.fetch_from_origin(&request).await?;

        let entries = items
            .iter()
            .map(|item| self.prepare(entity_type, item, fetch.expire_in_seconds))
            .collect::<Result<Vec<_>, _>>()?;
        for entry in entries {
            self.write(entry).await?;
        }

        for (position, item) in missing.into_iter().zip(items) {
            slots[position] = Some(item);
        }
        Ok(Some(slots.into_iter().flatten().collect()))
    }

    async fn fetch_from_origin<T: CacheItem>(
        &self,
        request: &OriginRequest,
    ) -> Result<Vec<T>, OriginError> {
        let started_at = Instant::now();
        let fetched = self.origin.fetch(request).await;
        histogram!(METRIC_ORIGIN_FETCH_MS, "entity_type" => request.entity_type.as_str())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        let fetched = fetched.inspect_err(|err| {
            warn!(
                entity_type = %request.entity_type,
                requested = request.len(),
                error = %err,
                "Origin fetch failed"
            );
        })?;
        if fetched.len() != request.len() {
            return Err(OriginError::LengthMismatch {
                requested: request.len(),
                returned: fetched.len(),
            });
        }
        fetched
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(OriginError::Decode)
    }

    async fn lookup<T: CacheItem>(
        &self,
        entity_type: EntityType,
        id_or_slug: &str,
    ) -> Result<Option<T>, CacheError> {
        let key = CacheKey::new(entity_type, id_or_slug).to_string();
        let label = entity_type.as_str();

        let Some(raw) = self.storage.get(&key).await? else {
            counter!(METRIC_MISS, "entity_type" => label).increment(1);
            return Ok(None);
        };

        let envelope = match serde_json::from_str::<Envelope<T>>(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(key = %key, error = %err, "Undecodable cache entry treated as miss");
                counter!(METRIC_MISS, "entity_type" => label).increment(1);
                return Ok(None);
            }
        };

        if envelope
            .expire_at
            .is_some_and(|expire_at| expire_at <= self.clock.now_millis())
        {
            counter!(METRIC_EXPIRED, "entity_type" => label).increment(1);
            counter!(METRIC_MISS, "entity_type" => label).increment(1);
            return Ok(None);
        }

        counter!(METRIC_HIT, "entity_type" => label).increment(1);
        Ok(Some(envelope.item))
    }

    /// Build the keys and payload for `item` without touching storage.
    fn prepare<T: CacheItem>(
        &self,
        entity_type: EntityType,
        item: &T,
        expire_in_seconds: Option<u64>,
    ) -> Result<PreparedEntry, CacheError> {
        let id = item
            .cache_id()
            .ok_or(CacheError::MissingId { entity_type })?;
        let id_key = CacheKey::new(entity_type, id.into_owned());
        let slug_key = item
            .cache_slug()
            .map(|slug| CacheKey::new(entity_type, slug).to_string());

        let expire_at = expire_in_seconds.map(|seconds| {
            let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
            self.clock
                .now_millis()
                .saturating_add(seconds.saturating_mul(1000))
        });
        let envelope = Envelope {
            item,
            slug: item.cache_slug().map(str::to_string),
            expire_at,
        };
        let payload = serde_json::to_string(&envelope).map_err(|source| CacheError::Encode {
            key: id_key.to_string(),
            source,
        })?;

        Ok(PreparedEntry {
            id_key: id_key.to_string(),
            slug_key,
            payload,
        })
    }

    /// Id key first, then the slug key. The slug is indexed before either
    /// write so a partial failure still leaves it reachable by eviction.
    async fn write(&self, entry: PreparedEntry) -> Result<(), CacheError> {
        if let Some(slug_key) = &entry.slug_key {
            mutex_lock(&self.slugs, SOURCE, "write")
                .entry(entry.id_key.clone())
                .or_default()
                .insert(slug_key.clone());
        }
        match entry.slug_key {
            Some(slug_key) => {
                self.storage
                    .set(entry.id_key, entry.payload.clone())
                    .await?;
                self.storage.set(slug_key, entry.payload).await?;
            }
            None => self.storage.set(entry.id_key, entry.payload).await?,
        }
        Ok(())
    }
}

struct PreparedEntry {
    id_key: String,
    slug_key: Option<String>,
    payload: String,
}
