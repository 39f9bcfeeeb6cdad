//! Change dependency tracker.
//!
//! Resolves the set of entities whose cached form may be stale after one or
//! more entities changed. Traversal is breadth-first over the relation graph
//! with live store lookups at every step:
//!
//! - a soft-deleted trigger contributes only itself unless deleted entities
//!   were requested;
//! - intermediate entities are expanded whatever their delete state, but
//!   deleted ones are dropped from the result unless requested or triggered;
//! - one visited set spans the whole batch, so every entity is expanded once.
//!
//! The visited set is owned by the driving task. Store lookups of one layer run
//! concurrently and only hand their results back; the driver decides which
//! discoveries are new.

mod closure;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt, TryStreamExt};
use metrics::histogram;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::application::repos::{EntityRow, RelationalStore, RepoError};
use crate::domain::entities::EntityRef;
use crate::graph::{Direction, RelationGraph};

pub use closure::DependencyClosure;
use closure::Candidates;

const DEFAULT_LAYER_CONCURRENCY: usize = 16;
const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

const METRIC_RESOLVE_MS: &str = "tripwire_tracker_resolve_ms";
const METRIC_CLOSURE_SIZE: &str = "tripwire_tracker_closure_size";

#[derive(Debug, Clone)]
pub struct TrackerOptions {
    /// Store lookups in flight per traversal layer.
    pub layer_concurrency: usize,
    /// Upper bound for one resolution. `None` disables the bound.
    pub deadline: Option<Duration>,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            layer_concurrency: DEFAULT_LAYER_CONCURRENCY,
            deadline: Some(DEFAULT_DEADLINE),
        }
    }
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("store lookup failed for {entity}: {source}")]
    Store {
        entity: EntityRef,
        #[source]
        source: RepoError,
    },
    #[error("closure resolution exceeded {limit:?} after visiting {visited} entities")]
    DeadlineExceeded { limit: Duration, visited: usize },
}

pub struct ChangeTracker {
    graph: Arc<RelationGraph>,
    store: Arc<dyn RelationalStore>,
    options: TrackerOptions,
}

impl ChangeTracker {
    pub fn new(
        graph: Arc<RelationGraph>,
        store: Arc<dyn RelationalStore>,
        options: TrackerOptions,
    ) -> Self {
        Self {
            graph,
            store,
            options,
        }
    }

    pub fn graph(&self) -> &Arc<RelationGraph> {
        &self.graph
    }

    /// Resolve the dependency closure of `triggers`, bounded by the configured
    /// deadline.
    ///
    /// Errors are never partial successes: on a store failure or an expired
    /// deadline the caller gets no closure and must retry or widen its
    /// invalidation.
    #[instrument(skip(self, triggers), fields(triggers = triggers.len()))]
    pub async fn changed_entity_chain(
        &self,
        triggers: &[EntityRef],
        include_deleted: bool,
    ) -> Result<DependencyClosure, TrackerError> {
        match self.options.deadline {
            Some(limit) => {
                self.changed_entity_chain_within(triggers, include_deleted, limit)
                    .await
            }
            None => {
                let progress = AtomicUsize::new(0);
                self.resolve(triggers, include_deleted, &progress).await
            }
        }
    }

    /// Same as [`Self::changed_entity_chain`] with a caller-supplied deadline.
    pub async fn changed_entity_chain_within(
        &self,
        triggers: &[EntityRef],
        include_deleted: bool,
        limit: Duration,
    ) -> Result<DependencyClosure, TrackerError> {
        let progress = AtomicUsize::new(0);
        match tokio::time::timeout(limit, self.resolve(triggers, include_deleted, &progress)).await
        {
            Ok(result) => result,
            Err(_) => {
                let visited = progress.load(Ordering::Relaxed);
                warn!(?limit, visited, "Closure resolution aborted at deadline");
                Err(TrackerError::DeadlineExceeded { limit, visited })
            }
        }
    }

    async fn resolve(
        &self,
        triggers: &[EntityRef],
        include_deleted: bool,
        progress: &AtomicUsize,
    ) -> Result<DependencyClosure, TrackerError> {
        let started_at = Instant::now();
        let trigger_set: HashSet<&EntityRef> = triggers.iter().collect();
        let mut candidates = Candidates::default();
        let mut expanded: HashSet<EntityRef> = HashSet::new();

        let mut unique = HashSet::new();
        let trigger_refs: Vec<EntityRef> = triggers
            .iter()
            .filter(|trigger| unique.insert(*trigger))
            .cloned()
            .collect();

        let mut frontier = Vec::new();
        for (trigger, row) in self.fetch_rows(trigger_refs).await? {
            progress.fetch_add(1, Ordering::Relaxed);
            let Some(row) = row else {
                debug!(entity = %trigger, "Trigger not found in store, treating as deleted");
                candidates.record(trigger, true);
                continue;
            };

            candidates.record(trigger.clone(), row.is_deleted);
            if row.is_deleted && !include_deleted {
                debug!(entity = %trigger, "Trigger is soft-deleted, not traversing");
                continue;
            }
            expanded.insert(trigger.clone());
            frontier.push((trigger, row));
        }

        let mut depth = 0usize;
        while !frontier.is_empty() {
            let lookups: Vec<_> = frontier
                .iter()
                .map(|(entity, row)| self.neighbors(entity, row))
                .collect();
            let discovered: Vec<Vec<EntityRef>> = stream::iter(lookups)
            .buffered(self.layer_concurrency())
            .try_collect()
            .await?;

            let next: Vec<EntityRef> = discovered
                .into_iter()
                .flatten()
                .filter(|entity| expanded.insert(entity.clone()))
                .collect();

            frontier = Vec::with_capacity(next.len());
            for (entity, row) in self.fetch_rows(next).await? {
                progress.fetch_add(1, Ordering::Relaxed);
                let Some(row) = row else {
                    debug!(entity = %entity, "Relation target does not exist, branch ends");
                    continue;
                };
                candidates.record(entity.clone(), row.is_deleted);
                frontier.push((entity, row));
            }
            depth += 1;
        }

        let visited = candidates.len();
        let closure = candidates.into_closure(|entry| {
            include_deleted || !entry.is_deleted || trigger_set.contains(&entry.entity)
        });

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_RESOLVE_MS).record(elapsed_ms);
        histogram!(METRIC_CLOSURE_SIZE).record(closure.len() as f64);
        info!(
            triggers = triggers.len(),
            include_deleted,
            depth,
            visited,
            closure = closure.len(),
            elapsed_ms,
            "Dependency closure resolved"
        );

        Ok(closure)
    }

    /// Point lookups for one layer, in input order.
    async fn fetch_rows(
        &self,
        entities: Vec<EntityRef>,
    ) -> Result<Vec<(EntityRef, Option<EntityRow>)>, TrackerError> {
        stream::iter(entities.into_iter().map(|entity| async move {
            let row = self
                .store
                .find_by_id(entity.entity_type, &entity.id)
                .await
                .map_err(|source| TrackerError::Store {
                    entity: entity.clone(),
                    source,
                })?;
            Ok::<_, TrackerError>((entity, row))
        }))
        .buffered(self.layer_concurrency())
        .try_collect()
        .await
    }

    /// Entities adjacent to `entity` over every traversable edge.
    async fn neighbors(
        &self,
        entity: &EntityRef,
        row: &EntityRow,
    ) -> Result<Vec<EntityRef>, TrackerError> {
        let mut found = Vec::new();
        for edge in self.graph.edges_from(entity.entity_type) {
            if !edge.is_traversable() {
                continue;
            }
            match edge.direction {
                Direction::Owning => {
                    if let Some(target) = row.foreign_key(edge.via_field) {
                        found.push(EntityRef::new(edge.to, target));
                    }
                }
                Direction::Referencing => {
                    let related = self
                        .store
                        .find_many_by_relation(edge.to, edge.via_field, &entity.id)
                        .await
                        .map_err(|source| TrackerError::Store {
                            entity: entity.clone(),
                            source,
                        })?;
                    found.extend(
                        related
                            .into_iter()
                            .map(|related| EntityRef::new(edge.to, related.id)),
                    );
                }
            }
        }
        Ok(found)
    }

    fn layer_concurrency(&self) -> usize {
        self.options.layer_concurrency.max(1)
    }
}
