//! Entity cache, rendered page cache and the invalidation pipeline.
//!
//! Write paths publish [`RequestKind`]s through the [`InvalidationTrigger`];
//! the [`InvalidationCoordinator`] resolves dependency closures and evicts the
//! affected entries from both caches.

mod clock;
mod config;
mod consumer;
mod entity;
mod events;
mod keys;
pub(crate) mod lock;
mod origin;
mod pages;
mod planner;
mod storage;
mod trigger;

pub use clock::{Clock, SystemClock};
pub use config::CacheConfig;
pub use consumer::{ConsumeReport, InvalidationCoordinator};
pub use entity::{CacheError, CacheItem, EntityCache, FetchOnMiss};
pub use events::{Epoch, InvalidationQueue, InvalidationRequest, RequestKind};
pub use keys::{CacheKey, PageKey};
pub use origin::{OriginError, OriginRequest, RemoteOrigin};
pub use pages::{PageCache, RenderedPage};
pub use planner::InvalidationPlan;
pub use storage::{KeyValueStorage, MemoryStorage, StorageError};
pub use trigger::InvalidationTrigger;
