//! Cache key definitions.

use std::fmt;

use crate::domain::entities::{EntityId, EntityRef, EntityType};
use crate::domain::pages::PageType;

const ENTITY_CACHE_PREFIX: &str = "EntityCache";

/// Entity-cache key: `EntityCache-{entityType}-{idOrSlug}`.
///
/// The textual form is what the storage backend sees, so it stays stable
/// across restarts for persistent backends.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    entity_type: EntityType,
    id_or_slug: String,
}

impl CacheKey {
    pub fn new(entity_type: EntityType, id_or_slug: impl Into<String>) -> Self {
        Self {
            entity_type,
            id_or_slug: id_or_slug.into(),
        }
    }

    pub fn for_entity(entity: &EntityRef) -> Self {
        Self::new(entity.entity_type, entity.id.as_str())
    }

    /// Prefix shared by every key of `entity_type`.
    pub fn type_prefix(entity_type: EntityType) -> String {
        format!("{ENTITY_CACHE_PREFIX}-{entity_type}-")
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn id_or_slug(&self) -> &str {
        &self.id_or_slug
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{ENTITY_CACHE_PREFIX}-{}-{}",
            self.entity_type, self.id_or_slug
        )
    }
}

/// Rendered-page key. Pages without an entity id are listing-style renders of
/// the page type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey {
    pub page: PageType,
    pub entity_id: Option<EntityId>,
}

impl PageKey {
    pub fn new(page: PageType, entity_id: Option<EntityId>) -> Self {
        Self { page, entity_id }
    }

    pub fn entity(page: PageType, entity_id: impl Into<EntityId>) -> Self {
        Self::new(page, Some(entity_id.into()))
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity_id {
            Some(id) => write!(f, "{}/{id}", self.page),
            None => write!(f, "{}", self.page),
        }
    }
}
