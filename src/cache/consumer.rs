//! Invalidation coordinator.
//!
//! Drains the request queue, turns requests into one merged plan and applies
//! it to the entity cache and the page cache. Changed entities of a batch are
//! resolved in a single closure computation; when that keeps failing, the
//! batch falls back to a conservative plan so nothing stale survives.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::entities::{EntityRef, EntityType};
use crate::tracker::ChangeTracker;

use super::config::CacheConfig;
use super::entity::{CacheError, EntityCache};
use super::events::{InvalidationQueue, RequestKind};
use super::pages::PageCache;
use super::planner::InvalidationPlan;

const METRIC_CONSUME_MS: &str = "tripwire_invalidation_consume_ms";
const METRIC_FALLBACK: &str = "tripwire_invalidation_fallback_total";
const METRIC_PAGES_INVALIDATED: &str = "tripwire_page_cache_invalidated_total";

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Outcome of one consumption round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeReport {
    pub requests: usize,
    pub closure_size: usize,
    pub fallback: bool,
    pub entity_keys_evicted: usize,
    /// Entities and entity types still cached after every eviction attempt.
    pub failed_evictions: usize,
    pub pages_evicted: usize,
}

pub struct InvalidationCoordinator {
    config: CacheConfig,
    tracker: Arc<ChangeTracker>,
    entities: Arc<EntityCache>,
    pages: Arc<PageCache>,
    queue: Arc<InvalidationQueue>,
}

impl InvalidationCoordinator {
    pub fn new(
        config: CacheConfig,
        tracker: Arc<ChangeTracker>,
        entities: Arc<EntityCache>,
        pages: Arc<PageCache>,
        queue: Arc<InvalidationQueue>,
    ) -> Self {
        Self {
            config,
            tracker,
            entities,
            pages,
            queue,
        }
    }

    pub fn queue(&self) -> &Arc<InvalidationQueue> {
        &self.queue
    }

    /// Consume up to one batch of pending requests.
    #[instrument(skip(self))]
    pub async fn consume(&self) -> ConsumeReport {
        let started_at = Instant::now();
        let requests = self.queue.drain(self.config.consume_batch_limit);
        if requests.is_empty() {
            return ConsumeReport::default();
        }

        let mut report = ConsumeReport {
            requests: requests.len(),
            ..Default::default()
        };
        let request_ids: Vec<Uuid> = requests.iter().map(|request| request.id).collect();

        let mut seen = HashSet::new();
        let mut triggers: Vec<EntityRef> = Vec::new();
        let mut plan = InvalidationPlan::default();
        for request in requests {
            match request.kind {
                RequestKind::EntitiesChanged { triggers: changed } => {
                    triggers.extend(
                        changed
                            .into_iter()
                            .filter(|trigger| seen.insert(trigger.clone())),
                    );
                }
                RequestKind::PageAction { page, entity_id } => {
                    plan.merge(InvalidationPlan::from_page_action(page, entity_id.as_ref()));
                }
            }
        }

        if !triggers.is_empty() {
            match self.resolve_with_retry(&triggers).await {
                Some(closure_plan) => {
                    report.closure_size = closure_plan.evict_entities.len();
                    plan.merge(closure_plan);
                }
                None => {
                    counter!(METRIC_FALLBACK).increment(1);
                    report.fallback = true;
                    plan.merge(InvalidationPlan::conservative(
                        self.tracker.graph(),
                        &triggers,
                    ));
                }
            }
        }

        info!(
            requests = report.requests,
            request_ids = ?request_ids,
            plan = %plan,
            fallback = report.fallback,
            "Invalidation plan ready"
        );

        self.apply(&plan, &mut report).await;

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_CONSUME_MS).record(elapsed_ms);
        info!(
            entity_keys_evicted = report.entity_keys_evicted,
            failed_evictions = report.failed_evictions,
            pages_evicted = report.pages_evicted,
            elapsed_ms,
            "Invalidation applied"
        );
        report
    }

    /// Consume until the queue is empty.
    pub async fn consume_all(&self) -> Vec<ConsumeReport> {
        let mut reports = Vec::new();
        while !self.queue.is_empty() {
            reports.push(self.consume().await);
        }
        reports
    }

    async fn resolve_with_retry(&self, triggers: &[EntityRef]) -> Option<InvalidationPlan> {
        let attempts = self.config.attempts();
        for attempt in 1..=attempts {
            match self
                .tracker
                .changed_entity_chain(triggers, self.config.include_deleted)
                .await
            {
                Ok(closure) => return Some(InvalidationPlan::from_closure(&closure)),
                Err(err) if attempt < attempts => {
                    warn!(attempt, attempts, error = %err, "Closure resolution failed, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(err) => {
                    error!(
                        attempts,
                        triggers = triggers.len(),
                        error = %err,
                        "Closure resolution failed, using conservative plan"
                    );
                }
            }
        }
        None
    }

    async fn apply(&self, plan: &InvalidationPlan, report: &mut ConsumeReport) {
        if self.config.enable_entity_cache {
            for entity_type in &plan.flush_entity_types {
                match self.evict_type_with_retry(*entity_type).await {
                    Ok(removed) => report.entity_keys_evicted += removed,
                    Err(err) => {
                        error!(
                            entity_type = %entity_type,
                            error = %err,
                            "Entity cache flush failed"
                        );
                        report.failed_evictions += 1;
                    }
                }
            }
            for entity in plan
                .evict_entities
                .iter()
                .filter(|entity| !plan.flush_entity_types.contains(&entity.entity_type))
            {
                match self.evict_with_retry(entity).await {
                    Ok(removed) => report.entity_keys_evicted += removed,
                    Err(err) => {
                        error!(entity = %entity, error = %err, "Entity cache eviction failed");
                        report.failed_evictions += 1;
                    }
                }
            }
        }

        if self.config.enable_page_cache {
            let mut removed = plan
                .evict_pages
                .iter()
                .filter(|key| self.pages.invalidate(key))
                .count();
            for page in &plan.flush_page_types {
                removed += self.pages.invalidate_page_type(*page);
            }
            counter!(METRIC_PAGES_INVALIDATED).increment(removed as u64);
            report.pages_evicted = removed;
        }
    }

    async fn evict_with_retry(&self, entity: &EntityRef) -> Result<usize, CacheError> {
        let attempts = self.config.attempts();
        let mut attempt = 1;
        loop {
            match self.entities.evict(entity).await {
                Err(err) if attempt < attempts => {
                    warn!(
                        entity = %entity,
                        attempt,
                        attempts,
                        error = %err,
                        "Entity cache eviction failed, retrying"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn evict_type_with_retry(&self, entity_type: EntityType) -> Result<usize, CacheError> {
        let attempts = self.config.attempts();
        let mut attempt = 1;
        loop {
            match self.entities.evict_type(entity_type).await {
                Err(err) if attempt < attempts => {
                    warn!(
                        entity_type = %entity_type,
                        attempt,
                        attempts,
                        error = %err,
                        "Entity cache flush failed, retrying"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    /// Run [`Self::consume`] on a fixed interval until the handle is aborted.
    /// Returns `None` when caching is disabled.
    pub fn spawn_auto_consume(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.config.is_enabled() {
            return None;
        }
        let coordinator = Arc::clone(self);
        let period = self.config.auto_consume_interval();
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if !coordinator.queue.is_empty() {
                    coordinator.consume().await;
                }
            }
        }))
    }
}
