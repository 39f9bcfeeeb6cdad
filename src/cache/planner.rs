//! Invalidation plans.
//!
//! A plan names what to drop and nothing else. It is built from a resolved
//! dependency closure, from an editor page action, or conservatively from
//! type-level reachability when no closure could be computed.

use std::collections::BTreeSet;
use std::fmt;

use crate::domain::entities::{EntityId, EntityRef, EntityType};
use crate::domain::pages::PageType;
use crate::graph::RelationGraph;
use crate::tracker::DependencyClosure;

use super::keys::PageKey;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// Entity-cache entries to evict (id and slug keys).
    pub evict_entities: BTreeSet<EntityRef>,
    /// Entity types whose every entity-cache entry is dropped.
    pub flush_entity_types: BTreeSet<EntityType>,
    /// Individual rendered pages to evict.
    pub evict_pages: BTreeSet<PageKey>,
    /// Page types whose every render is dropped.
    pub flush_page_types: BTreeSet<PageType>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ entities: {}, entity_types: {:?}, pages: {}, flush: {:?} }}",
            self.evict_entities.len(),
            self.flush_entity_types
                .iter()
                .map(|entity_type| entity_type.as_str())
                .collect::<Vec<_>>(),
            self.evict_pages.len(),
            self.flush_page_types
                .iter()
                .map(|page| page.as_str())
                .collect::<Vec<_>>(),
        )
    }
}

impl InvalidationPlan {
    /// Evict every closure member and the pages rendered from it, including
    /// the listing render of each affected page type.
    pub fn from_closure(closure: &DependencyClosure) -> Self {
        let mut plan = Self::default();
        for entry in closure {
            let entity = &entry.entity;
            plan.evict_entities.insert(entity.clone());
            for page in PageType::for_entity(entity.entity_type) {
                plan.evict_pages
                    .insert(PageKey::new(page, Some(entity.id.clone())));
                plan.evict_pages.insert(PageKey::new(page, None));
            }
        }
        plan
    }

    /// With an id, drop that page and the entity it renders; without one,
    /// flush the page type.
    pub fn from_page_action(page: PageType, entity_id: Option<&EntityId>) -> Self {
        let mut plan = Self::default();
        match entity_id {
            Some(id) => {
                plan.evict_entities
                    .insert(EntityRef::new(page.entity_type(), id.clone()));
                plan.evict_pages.insert(PageKey::new(page, Some(id.clone())));
            }
            None => {
                plan.flush_page_types.insert(page);
            }
        }
        plan
    }

    /// Coarse plan for when the closure is unavailable: the triggers' own
    /// entries plus every entity-cache entry and page type of the types
    /// reachable from the trigger types.
    pub fn conservative(graph: &RelationGraph, triggers: &[EntityRef]) -> Self {
        let mut plan = Self::default();
        plan.evict_entities.extend(triggers.iter().cloned());
        let reachable = graph.reachable_types(triggers.iter().map(|t| t.entity_type));
        plan.flush_page_types.extend(
            reachable
                .iter()
                .copied()
                .flat_map(PageType::for_entity),
        );
        plan.flush_entity_types = reachable;
        plan
    }

    pub fn merge(&mut self, other: InvalidationPlan) {
        self.evict_entities.extend(other.evict_entities);
        self.flush_entity_types.extend(other.flush_entity_types);
        self.evict_pages.extend(other.evict_pages);
        self.flush_page_types.extend(other.flush_page_types);
    }

    pub fn is_empty(&self) -> bool {
        self.evict_entities.is_empty()
            && self.flush_entity_types.is_empty()
            && self.evict_pages.is_empty()
            && self.flush_page_types.is_empty()
    }
}
