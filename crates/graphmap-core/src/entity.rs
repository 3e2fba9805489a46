//! Transfer structures exchanged between mappers and the persistence walk.

use serde::{Deserialize, Serialize};

use crate::types::{Properties, Value};

// ── Relationship policy ──────────────────────────────────────────

/// Edge direction relative to the owning entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Outgoing,
    Incoming,
    Undirected,
    Both,
}

/// Whether a relationship field is read, written, both, or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipMode {
    FetchOnly,
    PersistOnly,
    #[default]
    FetchAndPersist,
    DesignOnly,
}

impl RelationshipMode {
    pub fn fetches(self) -> bool {
        matches!(self, Self::FetchOnly | Self::FetchAndPersist)
    }

    pub fn persists(self) -> bool {
        matches!(self, Self::PersistOnly | Self::FetchAndPersist)
    }
}

/// Per-field max depth meaning "no field-level ceiling".
pub const UNBOUNDED_DEPTH: i32 = -1;

/// Field-level ceiling used when a descriptor does not set one.
pub const DEFAULT_FIELD_MAX_DEPTH: i32 = 3;

/// Static description of one relationship field of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    /// Field name on the owning entity, passed back to `set_relation`.
    pub field: String,
    /// Edge label.
    pub rel_type: String,
    pub direction: Direction,
    pub mode: RelationshipMode,
    /// Label of the related entity type.
    pub target_label: String,
    /// -1 = unbounded, 0 = never descend; `None` uses the visitor default.
    pub max_depth: Option<i32>,
}

impl RelationshipDescriptor {
    pub fn new(field: &str, rel_type: &str, direction: Direction, target_label: &str) -> Self {
        Self {
            field: field.to_string(),
            rel_type: rel_type.to_string(),
            direction,
            mode: RelationshipMode::default(),
            target_label: target_label.to_string(),
            max_depth: None,
        }
    }

    pub fn mode(mut self, mode: RelationshipMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn max_depth(mut self, max_depth: i32) -> Self {
        self.max_depth = Some(max_depth);
        self
    }
}

// ── Write-side transfer structures ───────────────────────────────

/// One outgoing edge of an entity being written.
///
/// `target_id` starts as whatever the mapper knew and is filled in once
/// the target node has been resolved during the persistence walk.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipData {
    pub rel_type: String,
    pub direction: Direction,
    pub mode: RelationshipMode,
    pub target_label: String,
    /// Identifier property of the target label.
    pub target_id_property: String,
    pub target_id: Option<Value>,
    /// Nested subgraph to cascade into; absent for link-only edges.
    pub target: Option<Box<EntityWithRelations>>,
}

impl RelationshipData {
    /// Edge to an entity that is persisted as part of the same write.
    pub fn cascade(
        rel_type: &str,
        direction: Direction,
        mode: RelationshipMode,
        target: EntityWithRelations,
    ) -> Self {
        Self {
            rel_type: rel_type.to_string(),
            direction,
            mode,
            target_label: target.entity_type.clone(),
            target_id_property: target.id_property.clone(),
            target_id: target.id().cloned(),
            target: Some(Box::new(target)),
        }
    }

    /// Edge to an already-persisted node known only by id.
    pub fn link(
        rel_type: &str,
        direction: Direction,
        mode: RelationshipMode,
        target_label: &str,
        target_id: impl Into<Value>,
    ) -> Self {
        Self {
            rel_type: rel_type.to_string(),
            direction,
            mode,
            target_label: target_label.to_string(),
            target_id_property: "id".to_string(),
            target_id: Some(target_id.into()),
            target: None,
        }
    }

    /// Override the target's identifier property for link-only edges.
    pub fn with_target_id_property(mut self, id_property: &str) -> Self {
        self.target_id_property = id_property.to_string();
        self
    }
}

/// An entity's persisted properties and its outgoing relationship edges.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityWithRelations {
    /// Node label.
    pub entity_type: String,
    /// Name of the identifier property inside `properties`.
    pub id_property: String,
    pub properties: Properties,
    pub relationships: Vec<RelationshipData>,
}

impl EntityWithRelations {
    pub fn new(entity_type: &str, id_property: &str, properties: Properties) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            id_property: id_property.to_string(),
            properties,
            relationships: Vec::new(),
        }
    }

    pub fn with_relationship(mut self, relationship: RelationshipData) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// The identifier, if set and non-null.
    pub fn id(&self) -> Option<&Value> {
        self.properties
            .get(&self.id_property)
            .filter(|v| !v.is_null())
    }

    pub fn set_id(&mut self, id: Value) {
        self.properties.insert(self.id_property.clone(), id);
    }

    /// Relationships whose mode includes writing.
    pub fn persisted_relationships(&self) -> impl Iterator<Item = &RelationshipData> {
        self.relationships.iter().filter(|r| r.mode.persists())
    }
}
