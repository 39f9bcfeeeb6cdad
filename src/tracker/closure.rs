use std::collections::HashMap;

use serde::Serialize;

use crate::domain::entities::{ChangeEvent, EntityRef, EntityType};

/// Entities whose cached representation may be stale after a set of changes.
///
/// Ordered by discovery (triggers first, then breadth-first), each entity once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DependencyClosure {
    entries: Vec<ChangeEvent>,
}

impl DependencyClosure {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeEvent> {
        self.entries.iter()
    }

    pub fn get(&self, entity: &EntityRef) -> Option<&ChangeEvent> {
        self.entries.iter().find(|entry| &entry.entity == entity)
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.get(entity).is_some()
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityRef> {
        self.entries.iter().map(|entry| &entry.entity)
    }

    pub fn of_type(&self, entity_type: EntityType) -> impl Iterator<Item = &ChangeEvent> {
        self.entries
            .iter()
            .filter(move |entry| entry.entity.entity_type == entity_type)
    }
}

/// Collects events as given; callers are responsible for uniqueness.
impl FromIterator<ChangeEvent> for DependencyClosure {
    fn from_iter<I: IntoIterator<Item = ChangeEvent>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for DependencyClosure {
    type Item = ChangeEvent;
    type IntoIter = std::vec::IntoIter<ChangeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a DependencyClosure {
    type Item = &'a ChangeEvent;
    type IntoIter = std::slice::Iter<'a, ChangeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Every entity touched during a traversal, in first-seen order.
#[derive(Debug, Default)]
pub(crate) struct Candidates {
    entries: Vec<ChangeEvent>,
    index: HashMap<EntityRef, usize>,
}

impl Candidates {
    /// Record an entity with the delete flag just read from the store.
    pub(crate) fn record(&mut self, entity: EntityRef, is_deleted: bool) {
        match self.index.get(&entity) {
            Some(&position) => self.entries[position].is_deleted = is_deleted,
            None => {
                self.index.insert(entity.clone(), self.entries.len());
                self.entries.push(ChangeEvent { entity, is_deleted });
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn into_closure(self, keep: impl Fn(&ChangeEvent) -> bool) -> DependencyClosure {
        DependencyClosure {
            entries: self.entries.into_iter().filter(|entry| keep(entry)).collect(),
        }
    }
}
