//! Repository traits describing the relational store collaborator.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{EntityId, EntityType};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Current state of a single record.
///
/// `fields` holds the scalar columns in text form; foreign keys are read from
/// here when following owning relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRow {
    pub id: EntityId,
    pub is_deleted: bool,
    pub fields: HashMap<String, String>,
}

impl EntityRow {
    pub fn new(id: impl Into<EntityId>, is_deleted: bool) -> Self {
        Self {
            id: id.into(),
            is_deleted,
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Value of a foreign-key column, `None` when the column is null or absent.
    pub fn foreign_key(&self, field: &str) -> Option<EntityId> {
        self.fields
            .get(field)
            .filter(|value| !value.is_empty())
            .map(|value| EntityId::new(value.clone()))
    }
}

/// A row returned by a relation lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedRow {
    pub id: EntityId,
    pub is_deleted: bool,
}

/// Point and relation queries against the relational store.
///
/// Implementations must reflect the most recently committed write.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Load a record by id. `Ok(None)` when it does not exist.
    async fn find_by_id(
        &self,
        entity_type: EntityType,
        id: &EntityId,
    ) -> Result<Option<EntityRow>, RepoError>;

    /// All rows of `entity_type` whose `field` points at `value`.
    async fn find_many_by_relation(
        &self,
        entity_type: EntityType,
        field: &str,
        value: &EntityId,
    ) -> Result<Vec<RelatedRow>, RepoError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    /// Model referenced by this field when it is a foreign key.
    pub references: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl ModelDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Schema introspection, used once at startup to validate the relation table.
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, RepoError>;
}

/// Liveness probe for the store, served by the admin health endpoint.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn check_health(&self) -> Result<(), RepoError>;
}
