//! The per-type mapping contract and its type-erased form.
//!
//! Mapper implementations are normally generated per entity type. The
//! engine talks to the root type through [`EntityMapper`] and to related
//! types, whose Rust type it cannot name, through [`AnyMapper`] looked up
//! by label in a [`MapperRegistry`].

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityWithRelations, RelationshipDescriptor};
use crate::error::MappingError;
use crate::types::{Row, Value};

/// A related entity whose concrete type is only known to the mapper.
pub type AnyEntity = Box<dyn Any + Send + Sync>;

/// Row ↔ entity conversion plus relationship metadata for one entity type.
pub trait EntityMapper: Send + Sync + 'static {
    type Entity: Send + Sync + 'static;

    /// Node label.
    fn label(&self) -> &str;

    /// Name of the identifier property.
    fn node_id_property_name(&self) -> &str {
        "id"
    }

    /// Relationship fields of this type.
    fn relationships(&self) -> &[RelationshipDescriptor] {
        &[]
    }

    /// Build an entity from the node bound to `alias` in `row`.
    ///
    /// Any raw value needed later by a post-load converter must be captured
    /// on the returned entity itself, never in mapper-level state.
    fn map(&self, row: &Row, alias: &str) -> Result<Self::Entity, MappingError>;

    fn to_db(&self, entity: &Self::Entity) -> EntityWithRelations;

    fn node_id(&self, entity: &Self::Entity) -> Option<Value>;

    /// Attach freshly loaded related entities to `field`.
    fn set_relation(
        &self,
        _entity: &mut Self::Entity,
        field: &str,
        _related: RelatedEntities,
    ) -> Result<(), MappingError> {
        Err(MappingError::UnknownField(field.to_string()))
    }

    /// Runs once all relationships of a loaded entity are attached.
    fn apply_post_load_converters(&self, _entity: &mut Self::Entity) -> Result<(), MappingError> {
        Ok(())
    }
}

// ── Related entities ─────────────────────────────────────────────

/// Entities loaded for one relationship field, handed to `set_relation`.
#[derive(Default)]
pub struct RelatedEntities {
    items: Vec<AnyEntity>,
}

impl RelatedEntities {
    pub fn new(items: Vec<AnyEntity>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Downcast every item to `R`.
    pub fn into_vec<R: Any>(self, field: &str) -> Result<Vec<R>, MappingError> {
        self.items
            .into_iter()
            .map(|item| {
                item.downcast::<R>()
                    .map(|boxed| *boxed)
                    .map_err(|_| MappingError::RelatedType {
                        field: field.to_string(),
                    })
            })
            .collect()
    }

    /// Downcast for a single-valued field; extra items are ignored.
    pub fn into_single<R: Any>(self, field: &str) -> Result<Option<R>, MappingError> {
        Ok(self.into_vec(field)?.into_iter().next())
    }
}

// ── Type erasure ─────────────────────────────────────────────────

/// Object-safe view of an [`EntityMapper`].
pub trait AnyMapper: Send + Sync {
    fn entity_label(&self) -> &str;
    fn id_property_name(&self) -> &str;
    fn descriptors(&self) -> &[RelationshipDescriptor];
    fn map_any(&self, row: &Row, alias: &str) -> Result<AnyEntity, MappingError>;
    fn node_id_any(&self, entity: &(dyn Any + Send + Sync)) -> Option<Value>;
    fn set_relation_any(
        &self,
        entity: &mut (dyn Any + Send + Sync),
        field: &str,
        related: RelatedEntities,
    ) -> Result<(), MappingError>;
    fn post_load_any(&self, entity: &mut (dyn Any + Send + Sync)) -> Result<(), MappingError>;
}

impl<M: EntityMapper> AnyMapper for M {
    fn entity_label(&self) -> &str {
        self.label()
    }

    fn id_property_name(&self) -> &str {
        self.node_id_property_name()
    }

    fn descriptors(&self) -> &[RelationshipDescriptor] {
        self.relationships()
    }

    fn map_any(&self, row: &Row, alias: &str) -> Result<AnyEntity, MappingError> {
        Ok(Box::new(self.map(row, alias)?))
    }

    fn node_id_any(&self, entity: &(dyn Any + Send + Sync)) -> Option<Value> {
        entity
            .downcast_ref::<M::Entity>()
            .and_then(|e| self.node_id(e))
    }

    fn set_relation_any(
        &self,
        entity: &mut (dyn Any + Send + Sync),
        field: &str,
        related: RelatedEntities,
    ) -> Result<(), MappingError> {
        let label = self.label().to_string();
        let entity = entity
            .downcast_mut::<M::Entity>()
            .ok_or_else(|| MappingError::Invalid(format!("entity is not a {label}")))?;
        self.set_relation(entity, field, related)
    }

    fn post_load_any(&self, entity: &mut (dyn Any + Send + Sync)) -> Result<(), MappingError> {
        let label = self.label().to_string();
        let entity = entity
            .downcast_mut::<M::Entity>()
            .ok_or_else(|| MappingError::Invalid(format!("entity is not a {label}")))?;
        self.apply_post_load_converters(entity)
    }
}

/// Label → mapper lookup used when cascading into related types.
#[derive(Default, Clone)]
pub struct MapperRegistry {
    mappers: HashMap<String, Arc<dyn AnyMapper>>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: EntityMapper>(&mut self, mapper: Arc<M>) {
        let label = mapper.label().to_string();
        if self.mappers.insert(label.clone(), mapper).is_some() {
            tracing::warn!(label = %label, "Replaced previously registered mapper");
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<M: EntityMapper>(mut self, mapper: Arc<M>) -> Self {
        self.register(mapper);
        self
    }

    pub fn get(&self, label: &str) -> Result<Arc<dyn AnyMapper>, MappingError> {
        self.mappers
            .get(label)
            .cloned()
            .ok_or_else(|| MappingError::UnknownLabel(label.to_string()))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.mappers.contains_key(label)
    }
}

// ── Generic node records ─────────────────────────────────────────

/// A schemaless node: label, identifier and all properties as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: Option<String>,
    pub label: String,
    pub properties: serde_json::Value,
}

/// Maps any node of one label to a [`NodeRecord`]. Has no relationships.
#[derive(Debug, Clone)]
pub struct NodeRecordMapper {
    label: String,
    id_property: String,
}

impl NodeRecordMapper {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            id_property: "id".to_string(),
        }
    }

    pub fn with_id_property(mut self, id_property: &str) -> Self {
        self.id_property = id_property.to_string();
        self
    }
}

impl EntityMapper for NodeRecordMapper {
    type Entity = NodeRecord;

    fn label(&self) -> &str {
        &self.label
    }

    fn node_id_property_name(&self) -> &str {
        &self.id_property
    }

    fn map(&self, row: &Row, alias: &str) -> Result<NodeRecord, MappingError> {
        let node = row.node(alias)?;
        let id = node.property(&self.id_property).map(Value::key_string);
        let properties = serde_json::Value::Object(
            node.properties
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        );
        Ok(NodeRecord {
            id,
            label: self.label.clone(),
            properties,
        })
    }

    fn to_db(&self, record: &NodeRecord) -> EntityWithRelations {
        let mut properties = match Value::from(record.properties.clone()) {
            Value::Map(map) => map,
            _ => Default::default(),
        };
        if let Some(id) = &record.id {
            properties.insert(self.id_property.clone(), Value::from(id.as_str()));
        }
        EntityWithRelations::new(&self.label, &self.id_property, properties)
    }

    fn node_id(&self, record: &NodeRecord) -> Option<Value> {
        record.id.as_deref().map(Value::from)
    }
}
