//! Schema relation graph.
//!
//! Nodes are entity types, edges are the curated relations from
//! [`relations::TRAVEL_RELATIONS`]. Every relation contributes two edges: an
//! owning edge on the entity holding the foreign key and a referencing edge on
//! the entity it points at. The graph is built once and never mutated.

pub mod relations;

use std::collections::{BTreeSet, HashMap, VecDeque};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use crate::application::repos::{ModelDescriptor, RepoError, SchemaIntrospector};
use crate::domain::entities::EntityType;

pub use relations::{EXCLUDED_RELATIONS, ExcludedRelation, Relation, TRAVEL_RELATIONS};

/// Which side of the foreign key an edge starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// `from` holds `via_field`, pointing at `to`.
    Owning,
    /// `to` holds `via_field`, pointing at `from`.
    Referencing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationEdge {
    pub from: EntityType,
    pub to: EntityType,
    pub via_field: &'static str,
    pub direction: Direction,
    pub traverse_reverse: bool,
}

impl RelationEdge {
    /// Owning edges are always followed; referencing edges only when the
    /// relation allows reverse traversal.
    pub fn is_traversable(&self) -> bool {
        match self.direction {
            Direction::Owning => true,
            Direction::Referencing => self.traverse_reverse,
        }
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("schema introspection failed: {0}")]
    Introspection(#[source] RepoError),
    #[error("schema has no model `{model}`")]
    MissingModel { model: &'static str },
    #[error("model `{model}` has no field `{field}`")]
    MissingField {
        model: &'static str,
        field: &'static str,
    },
    #[error("`{model}.{field}` references {found:?}, expected `{expected}`")]
    WrongTarget {
        model: &'static str,
        field: &'static str,
        expected: &'static str,
        found: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct RelationGraph {
    edges: HashMap<EntityType, Vec<RelationEdge>>,
    relations: Vec<Relation>,
}

impl RelationGraph {
    /// Build the graph from a relation table without consulting the schema.
    pub fn from_relations(relations: &[Relation]) -> Self {
        let mut edges: HashMap<EntityType, Vec<RelationEdge>> = HashMap::new();
        for relation in relations {
            edges.entry(relation.owner).or_default().push(RelationEdge {
                from: relation.owner,
                to: relation.target,
                via_field: relation.field,
                direction: Direction::Owning,
                traverse_reverse: relation.traverse_reverse,
            });
            edges.entry(relation.target).or_default().push(RelationEdge {
                from: relation.target,
                to: relation.owner,
                via_field: relation.field,
                direction: Direction::Referencing,
                traverse_reverse: relation.traverse_reverse,
            });
        }

        Self {
            edges,
            relations: relations.to_vec(),
        }
    }

    /// Introspect the schema and build the graph, checking every curated
    /// relation against the declared foreign keys.
    ///
    /// Any failure here is fatal: the process must not serve with an incomplete
    /// relation graph.
    #[instrument(skip_all, fields(relations = relations.len()))]
    pub async fn introspect(
        introspector: &dyn SchemaIntrospector,
        relations: &[Relation],
    ) -> Result<Self, GraphError> {
        let models = introspector
            .list_models()
            .await
            .map_err(GraphError::Introspection)?;
        let models: HashMap<&str, &ModelDescriptor> = models
            .iter()
            .map(|model| (model.name.as_str(), model))
            .collect();

        for relation in relations {
            validate_relation(&models, relation)?;
        }

        let graph = Self::from_relations(relations);
        info!(
            models = models.len(),
            relations = relations.len(),
            "Relation graph built"
        );
        Ok(graph)
    }

    /// All edges touching `entity_type`, owning and referencing.
    pub fn edges_from(&self, entity_type: EntityType) -> &[RelationEdge] {
        self.edges
            .get(&entity_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Entity types reachable from `start` over traversable edges, `start`
    /// included. Used when a precise closure cannot be computed.
    pub fn reachable_types(
        &self,
        start: impl IntoIterator<Item = EntityType>,
    ) -> BTreeSet<EntityType> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        for entity_type in start {
            if seen.insert(entity_type) {
                queue.push_back(entity_type);
            }
        }

        while let Some(current) = queue.pop_front() {
            for edge in self.edges_from(current) {
                if edge.is_traversable() && seen.insert(edge.to) {
                    queue.push_back(edge.to);
                }
            }
        }

        seen
    }
}

fn validate_relation(
    models: &HashMap<&str, &ModelDescriptor>,
    relation: &Relation,
) -> Result<(), GraphError> {
    let owner = relation.owner.as_str();
    let target = relation.target.as_str();

    let model = models
        .get(owner)
        .ok_or(GraphError::MissingModel { model: owner })?;
    if !models.contains_key(target) {
        return Err(GraphError::MissingModel { model: target });
    }

    let field = model.field(relation.field).ok_or(GraphError::MissingField {
        model: owner,
        field: relation.field,
    })?;

    if field.references.as_deref() != Some(target) {
        return Err(GraphError::WrongTarget {
            model: owner,
            field: relation.field,
            expected: target,
            found: field.references.clone(),
        });
    }

    Ok(())
}
