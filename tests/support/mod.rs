//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::macros::datetime;
use tripwire::application::repos::{
    EntityRow, FieldDescriptor, ModelDescriptor, RelatedRow, RelationalStore, RepoError,
    SchemaIntrospector, StoreHealth,
};
use tripwire::cache::{
    CacheConfig, Clock, EntityCache, InvalidationCoordinator, InvalidationQueue,
    InvalidationTrigger, KeyValueStorage, MemoryStorage, OriginError, OriginRequest, PageCache,
    RemoteOrigin, StorageError,
};
use tripwire::domain::entities::{EntityId, EntityRef, EntityType};
use tripwire::graph::{EXCLUDED_RELATIONS, RelationGraph, TRAVEL_RELATIONS};
use tripwire::tracker::{ChangeTracker, TrackerOptions};

pub fn entity(entity_type: EntityType, id: &str) -> EntityRef {
    EntityRef::new(entity_type, id)
}

/// In-memory relational store keyed by `(type, id)`.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<EntityRef, EntityRow>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, entity_type: EntityType, row: EntityRow) {
        let key = EntityRef::new(entity_type, row.id.clone());
        self.rows.lock().expect("rows lock").insert(key, row);
    }

    /// Insert a live row with the given foreign keys.
    pub fn live(&self, entity_type: EntityType, id: &str, fields: &[(&str, &str)]) {
        self.insert(entity_type, build_row(id, false, fields));
    }

    /// Insert a soft-deleted row with the given foreign keys.
    pub fn deleted(&self, entity_type: EntityType, id: &str, fields: &[(&str, &str)]) {
        self.insert(entity_type, build_row(id, true, fields));
    }

    pub fn set_deleted(&self, entity: &EntityRef, is_deleted: bool) {
        if let Some(row) = self.rows.lock().expect("rows lock").get_mut(entity) {
            row.is_deleted = is_deleted;
        }
    }

    pub fn fail_lookups(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().expect("delay lock") = delay;
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    async fn before_lookup(&self) -> Result<(), RepoError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        Ok(())
    }
}

fn build_row(id: &str, is_deleted: bool, fields: &[(&str, &str)]) -> EntityRow {
    fields
        .iter()
        .fold(EntityRow::new(id, is_deleted), |row, (name, value)| {
            row.with_field(*name, *value)
        })
}

#[async_trait]
impl RelationalStore for MemoryStore {
    async fn find_by_id(
        &self,
        entity_type: EntityType,
        id: &EntityId,
    ) -> Result<Option<EntityRow>, RepoError> {
        self.before_lookup().await?;
        let key = EntityRef::new(entity_type, id.clone());
        Ok(self.rows.lock().expect("rows lock").get(&key).cloned())
    }

    async fn find_many_by_relation(
        &self,
        entity_type: EntityType,
        field: &str,
        value: &EntityId,
    ) -> Result<Vec<RelatedRow>, RepoError> {
        self.before_lookup().await?;
        let rows = self.rows.lock().expect("rows lock");
        let mut related: Vec<RelatedRow> = rows
            .iter()
            .filter(|(key, row)| {
                key.entity_type == entity_type
                    && row.fields.get(field).map(String::as_str) == Some(value.as_str())
            })
            .map(|(_, row)| RelatedRow {
                id: row.id.clone(),
                is_deleted: row.is_deleted,
            })
            .collect();
        related.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(related)
    }
}

/// Reports a schema declaring every curated and excluded foreign key.
#[async_trait]
impl SchemaIntrospector for MemoryStore {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, RepoError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        Ok(EntityType::ALL
            .into_iter()
            .map(|entity_type| {
                let mut fields = vec![FieldDescriptor {
                    name: "id".to_string(),
                    references: None,
                }];
                fields.extend(
                    TRAVEL_RELATIONS
                        .iter()
                        .filter(|relation| relation.owner == entity_type)
                        .map(|relation| (relation.field, relation.target))
                        .chain(
                            EXCLUDED_RELATIONS
                                .iter()
                                .filter(|relation| relation.owner == entity_type)
                                .map(|relation| (relation.field, relation.target)),
                        )
                        .map(|(field, target)| FieldDescriptor {
                            name: field.to_string(),
                            references: Some(target.as_str().to_string()),
                        }),
                );
                ModelDescriptor {
                    name: entity_type.as_str().to_string(),
                    fields,
                }
            })
            .collect())
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn check_health(&self) -> Result<(), RepoError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(RepoError::Persistence("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(datetime!(2026-01-01 00:00 UTC)),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().expect("clock lock")
    }
}

/// Origin answering every request with synthetic items, counting calls.
#[derive(Default)]
pub struct CountingOrigin {
    requests: Mutex<Vec<OriginRequest>>,
    failing: AtomicBool,
}

impl CountingOrigin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().expect("origin lock").len()
    }

    pub fn requests(&self) -> Vec<OriginRequest> {
        self.requests.lock().expect("origin lock").clone()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteOrigin for CountingOrigin {
    async fn fetch(&self, request: &OriginRequest) -> Result<Vec<Value>, OriginError> {
        self.requests
            .lock()
            .expect("origin lock")
            .push(request.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(OriginError::Status { status: 503 });
        }
        Ok(request
            .ids
            .iter()
            .map(|id| json!({"id": id, "name": format!("{} {id}", request.entity_type)}))
            .chain(
                request
                    .slugs
                    .iter()
                    .map(|slug| json!({"id": format!("{slug}-id"), "slug": slug})),
            )
            .collect())
    }
}

/// Storage whose removals can be made to fail a set number of times.
pub struct FlakyStorage {
    inner: Arc<MemoryStorage>,
    failing_removals: AtomicUsize,
}

impl FlakyStorage {
    pub fn new(inner: Arc<MemoryStorage>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failing_removals: AtomicUsize::new(0),
        })
    }

    pub fn fail_removals(&self, times: usize) {
        self.failing_removals.store(times, Ordering::SeqCst);
    }

    fn removal_fails(&self) -> bool {
        self.failing_removals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl KeyValueStorage for FlakyStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: String, value: String) -> Result<(), StorageError> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.removal_fails() {
            return Err(StorageError::Unavailable("remove refused".to_string()));
        }
        self.inner.remove(key).await
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        if self.removal_fails() {
            return Err(StorageError::Unavailable("remove refused".to_string()));
        }
        self.inner.remove_prefix(prefix).await
    }
}

pub fn tracker(store: Arc<MemoryStore>, options: TrackerOptions) -> ChangeTracker {
    ChangeTracker::new(
        Arc::new(RelationGraph::from_relations(TRAVEL_RELATIONS)),
        store,
        options,
    )
}

/// The full invalidation stack over in-memory collaborators.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub storage: Arc<MemoryStorage>,
    pub flaky: Arc<FlakyStorage>,
    pub origin: Arc<CountingOrigin>,
    pub clock: Arc<ManualClock>,
    pub entities: Arc<EntityCache>,
    pub pages: Arc<PageCache>,
    pub queue: Arc<InvalidationQueue>,
    pub coordinator: Arc<InvalidationCoordinator>,
    pub trigger: Arc<InvalidationTrigger>,
}

impl Harness {
    pub fn new(store: Arc<MemoryStore>, config: CacheConfig) -> Self {
        Self::with_options(store, config, TrackerOptions::default())
    }

    pub fn with_options(
        store: Arc<MemoryStore>,
        config: CacheConfig,
        options: TrackerOptions,
    ) -> Self {
        let storage = Arc::new(MemoryStorage::new(&config));
        let flaky = FlakyStorage::new(storage.clone());
        let origin = CountingOrigin::new();
        let clock = ManualClock::new();
        let entities = Arc::new(
            EntityCache::new(flaky.clone(), origin.clone(), clock.clone())
                .with_default_ttl(Some(3600)),
        );
        let pages = Arc::new(PageCache::new(&config));
        let queue = Arc::new(InvalidationQueue::new());
        let coordinator = Arc::new(InvalidationCoordinator::new(
            config.clone(),
            Arc::new(tracker(store.clone(), options)),
            entities.clone(),
            pages.clone(),
            queue.clone(),
        ));
        let trigger = Arc::new(InvalidationTrigger::new(
            config,
            queue.clone(),
            coordinator.clone(),
        ));

        Self {
            store,
            storage,
            flaky,
            origin,
            clock,
            entities,
            pages,
            queue,
            coordinator,
            trigger,
        }
    }
}
