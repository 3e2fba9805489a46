//! Read cascade over a type's relationship descriptors.
//!
//! For each loaded entity: check the visit guard, mark it visited, then issue
//! one follow-up read per fetchable relationship field the field-depth policy
//! allows, map the related rows through the target label's mapper, recurse one
//! level deeper, and attach the results. Post-load converters run last, once
//! every field of the entity is attached. An entity rejected by the guard is
//! still returned, without relationships.

use std::any::Any;

use futures_util::future::{BoxFuture, FutureExt};

use graphmap_core::entity::RelationshipDescriptor;
use graphmap_core::error::{DriverError, RepositoryError, Result};
use graphmap_core::guard::TraversalGuard;
use graphmap_core::mapper::{AnyEntity, AnyMapper, MapperRegistry, RelatedEntities};
use graphmap_core::statement::{self, NodeSpec, Statement, RELATED_ALIAS};
use graphmap_core::traversal::Identity;
use graphmap_core::translate::translate;
use graphmap_core::types::{Row, Value};
use graphmap_core::visitor::{RelationVisitor, VisitDecision};

use crate::backend::GraphBackend;
use crate::transaction::TxHandle;

/// What the guard allows for one entity.
enum Visit {
    /// Skip relationships; only run post-load converters.
    Shallow,
    /// Load these fields from the node identified by `owner`/`id`.
    Fields {
        owner: NodeSpec,
        id: Value,
        fields: Vec<RelationshipDescriptor>,
    },
}

fn plan_visit<G: TraversalGuard>(
    guard: &mut G,
    mapper: &dyn AnyMapper,
    entity: &(dyn Any + Send + Sync),
    depth: u32,
) -> Result<Visit> {
    let label = mapper.entity_label();
    let identity = RelationVisitor::identity_of(mapper, entity);
    let decision = guard.decide(&identity, depth)?;
    if decision != VisitDecision::Proceed {
        tracing::debug!(entity = %label, depth, ?decision, "Not descending into entity");
        guard.record_skip(decision)?;
        return Ok(Visit::Shallow);
    }
    guard.mark_visited(&identity, label, depth)?;

    let id = match identity {
        Identity::Key(_) => mapper.node_id_any(entity),
        Identity::Reference(_) => None,
    };
    let Some(id) = id else {
        return Ok(Visit::Shallow);
    };

    let descriptors = mapper.descriptors();
    let mut fields = Vec::new();
    for descriptor in descriptors.iter().filter(|d| d.mode.fetches()) {
        if guard.should_load_relationship(label, descriptors, &descriptor.field, depth) {
            fields.push(descriptor.clone());
        } else {
            tracing::debug!(entity = %label, field = %descriptor.field, depth, "Field depth limit reached");
            guard.record_skip(VisitDecision::DepthExceeded)?;
        }
    }
    Ok(Visit::Fields {
        owner: NodeSpec::new(label, mapper.id_property_name()),
        id,
        fields,
    })
}

fn field_context(mapper: &dyn AnyMapper, descriptor: &RelationshipDescriptor) -> String {
    format!("load {}.{}", mapper.entity_label(), descriptor.field)
}

fn map_rows(target: &dyn AnyMapper, rows: &[Row], context: &str) -> Result<Vec<AnyEntity>> {
    rows.iter()
        .map(|row| {
            target
                .map_any(row, RELATED_ALIAS)
                .map_err(|e| RepositoryError::mapping(context, e))
        })
        .collect()
}

fn attach(
    mapper: &dyn AnyMapper,
    entity: &mut (dyn Any + Send + Sync),
    descriptor: &RelationshipDescriptor,
    children: Vec<AnyEntity>,
    context: &str,
) -> Result<()> {
    mapper
        .set_relation_any(entity, &descriptor.field, RelatedEntities::new(children))
        .map_err(|e| RepositoryError::mapping(context, e))
}

fn post_load(mapper: &dyn AnyMapper, entity: &mut (dyn Any + Send + Sync)) -> Result<()> {
    mapper
        .post_load_any(entity)
        .map_err(|e| RepositoryError::mapping(format!("post-load {}", mapper.entity_label()), e))
}

// ── Async ────────────────────────────────────────────────────────

/// Load `entity`'s relationships inside `tx`, starting at `depth`.
pub(crate) fn load_relations<'a, B, G>(
    tx: &'a TxHandle<B>,
    registry: &'a MapperRegistry,
    guard: &'a mut G,
    mapper: &'a dyn AnyMapper,
    entity: &'a mut (dyn Any + Send + Sync),
    depth: u32,
) -> BoxFuture<'a, Result<()>>
where
    B: GraphBackend,
    G: TraversalGuard + Send,
{
    async move {
        if let Visit::Fields { owner, id, fields } = plan_visit(guard, mapper, entity, depth)? {
            for descriptor in &fields {
                let context = field_context(mapper, descriptor);
                let target = registry
                    .get(&descriptor.target_label)
                    .map_err(|e| RepositoryError::mapping(&context, e))?;
                let rows = tx
                    .execute(&statement::related(&owner, &id, descriptor))
                    .await
                    .map_err(|e| translate(&context, e))?;

                let mut children = map_rows(target.as_ref(), &rows, &context)?;
                for child in children.iter_mut() {
                    load_relations(tx, registry, &mut *guard, target.as_ref(), child.as_mut(), depth + 1)
                        .await?;
                }
                guard.record_relationships_loaded(children.len())?;
                attach(mapper, entity, descriptor, children, &context)?;
            }
        }
        post_load(mapper, entity)
    }
    .boxed()
}

// ── Blocking ─────────────────────────────────────────────────────

/// Blocking form of [`load_relations`]; `execute` runs one statement in the
/// operation's transaction.
pub(crate) fn load_relations_blocking<G, E>(
    execute: &mut E,
    registry: &MapperRegistry,
    guard: &mut G,
    mapper: &dyn AnyMapper,
    entity: &mut (dyn Any + Send + Sync),
    depth: u32,
) -> Result<()>
where
    G: TraversalGuard,
    E: FnMut(&Statement) -> std::result::Result<Vec<Row>, DriverError>,
{
    if let Visit::Fields { owner, id, fields } = plan_visit(guard, mapper, entity, depth)? {
        for descriptor in &fields {
            let context = field_context(mapper, descriptor);
            let target = registry
                .get(&descriptor.target_label)
                .map_err(|e| RepositoryError::mapping(&context, e))?;
            let rows = execute(&statement::related(&owner, &id, descriptor))
                .map_err(|e| translate(&context, e))?;

            let mut children = map_rows(target.as_ref(), &rows, &context)?;
            for child in children.iter_mut() {
                load_relations_blocking(execute, registry, guard, target.as_ref(), child.as_mut(), depth + 1)?;
            }
            guard.record_relationships_loaded(children.len())?;
            attach(mapper, entity, descriptor, children, &context)?;
        }
    }
    post_load(mapper, entity)
}
