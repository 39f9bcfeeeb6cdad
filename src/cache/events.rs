//! Pending invalidation requests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::gauge;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::domain::entities::{EntityId, EntityRef};
use crate::domain::pages::PageType;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";
const METRIC_QUEUE_LEN: &str = "tripwire_invalidation_queue_len";

/// Process-local publication order.
pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct InvalidationRequest {
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: RequestKind,
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Entities were written; their dependency closure must be evicted.
    EntitiesChanged { triggers: Vec<EntityRef> },
    /// An editor asked for a page to be re-rendered.
    PageAction {
        page: PageType,
        entity_id: Option<EntityId>,
    },
}

impl RequestKind {
    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::EntitiesChanged { .. } => "entities_changed",
            RequestKind::PageAction { .. } => "page_action",
        }
    }
}

/// FIFO of requests waiting for the coordinator.
pub struct InvalidationQueue {
    pending: Mutex<VecDeque<InvalidationRequest>>,
    next_epoch: AtomicU64,
}

impl InvalidationQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            next_epoch: AtomicU64::new(0),
        }
    }

    /// Enqueue `kind` and return the assigned request id.
    pub fn publish(&self, kind: RequestKind) -> Uuid {
        let request = InvalidationRequest {
            id: Uuid::new_v4(),
            epoch: self.next_epoch.fetch_add(1, Ordering::SeqCst),
            kind,
            timestamp: OffsetDateTime::now_utc(),
        };
        let id = request.id;

        info!(
            request_id = %request.id,
            epoch = request.epoch,
            kind = request.kind.label(),
            "Invalidation request enqueued"
        );

        let mut pending = mutex_lock(&self.pending, SOURCE, "publish");
        pending.push_back(request);
        gauge!(METRIC_QUEUE_LEN).set(pending.len() as f64);
        id
    }

    /// Take up to `limit` requests, oldest first.
    pub fn drain(&self, limit: usize) -> Vec<InvalidationRequest> {
        let mut pending = mutex_lock(&self.pending, SOURCE, "drain");
        let count = limit.min(pending.len());
        let drained = pending.drain(..count).collect();
        gauge!(METRIC_QUEUE_LEN).set(pending.len() as f64);
        drained
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.pending, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.pending, SOURCE, "clear").clear();
        gauge!(METRIC_QUEUE_LEN).set(0.0);
    }
}

impl Default for InvalidationQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::EntityType;

    fn changed(id: &str) -> RequestKind {
        RequestKind::EntitiesChanged {
            triggers: vec![EntityRef::new(EntityType::Hotel, id)],
        }
    }

    #[test]
    fn epochs_increase_in_publication_order() {
        let queue = InvalidationQueue::new();
        queue.publish(changed("h1"));
        queue.publish(changed("h2"));
        queue.publish(RequestKind::PageAction {
            page: PageType::CityLanding,
            entity_id: None,
        });

        let drained = queue.drain(10);
        let epochs: Vec<Epoch> = drained.iter().map(|request| request.epoch).collect();
        assert_eq!(epochs, vec![0, 1, 2]);
        assert_eq!(drained[0].kind, changed("h1"));
    }

    #[test]
    fn drain_respects_limit() {
        let queue = InvalidationQueue::new();
        for i in 0..5 {
            queue.publish(changed(&format!("h{i}")));
        }

        assert_eq!(queue.drain(3).len(), 3);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain(10).len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn publish_returns_unique_ids() {
        let queue = InvalidationQueue::new();
        let first = queue.publish(changed("h1"));
        let second = queue.publish(changed("h1"));
        assert_ne!(first, second);

        queue.clear();
        assert!(queue.is_empty());
    }
}
