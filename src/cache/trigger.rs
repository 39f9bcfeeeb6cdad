//! Entry point for write paths and editors.

use std::sync::Arc;

use tracing::debug;

use crate::domain::entities::{EntityId, EntityRef};
use crate::domain::pages::PageType;

use super::config::CacheConfig;
use super::consumer::{ConsumeReport, InvalidationCoordinator};
use super::events::{InvalidationQueue, RequestKind};

/// Publishes invalidation requests and optionally applies them right away.
///
/// ```ignore
/// // After a hotel row was updated:
/// trigger
///     .entities_changed(vec![EntityRef::new(EntityType::Hotel, "h1")], true)
///     .await;
/// ```
pub struct InvalidationTrigger {
    config: CacheConfig,
    queue: Arc<InvalidationQueue>,
    coordinator: Arc<InvalidationCoordinator>,
}

impl InvalidationTrigger {
    pub fn new(
        config: CacheConfig,
        queue: Arc<InvalidationQueue>,
        coordinator: Arc<InvalidationCoordinator>,
    ) -> Self {
        Self {
            config,
            queue,
            coordinator,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    pub fn coordinator(&self) -> &Arc<InvalidationCoordinator> {
        &self.coordinator
    }

    /// Publish `kind`. With `immediate`, consume before returning and hand back
    /// the report; otherwise the background loop picks it up.
    pub async fn trigger(&self, kind: RequestKind, immediate: bool) -> Option<ConsumeReport> {
        if !self.config.is_enabled() {
            debug!(kind = kind.label(), "Invalidation skipped: caches disabled");
            return None;
        }

        self.queue.publish(kind);

        if immediate {
            Some(self.coordinator.consume().await)
        } else {
            None
        }
    }

    pub async fn entities_changed(
        &self,
        triggers: Vec<EntityRef>,
        immediate: bool,
    ) -> Option<ConsumeReport> {
        if triggers.is_empty() {
            return None;
        }
        self.trigger(RequestKind::EntitiesChanged { triggers }, immediate)
            .await
    }

    /// Editor page actions are always applied immediately.
    pub async fn page_action(
        &self,
        page: PageType,
        entity_id: Option<EntityId>,
    ) -> Option<ConsumeReport> {
        self.trigger(RequestKind::PageAction { page, entity_id }, true)
            .await
    }
}
