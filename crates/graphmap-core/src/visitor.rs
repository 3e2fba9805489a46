//! Relation visitor: the visit / load / persist decisions for one traversal.
//!
//! All decision logic lives here and takes the [`TraversalContext`]
//! explicitly. The thread-bound form in [`crate::thread_visitor`] only
//! locates the context and delegates to this type.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::entity::{RelationshipDescriptor, DEFAULT_FIELD_MAX_DEPTH, UNBOUNDED_DEPTH};
use crate::mapper::AnyMapper;
use crate::traversal::{persisted_key, Identity, TraversalContext};
use crate::types::Value;

/// Outcome of a visit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitDecision {
    Proceed,
    AlreadyVisited,
    DepthExceeded,
}

/// Stateless decision maker; clones share the per-type field-depth cache.
#[derive(Debug, Clone)]
pub struct RelationVisitor {
    default_field_depth: i32,
    field_depths: Arc<DashMap<String, Arc<HashMap<String, i32>>>>,
}

impl Default for RelationVisitor {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationVisitor {
    pub fn new() -> Self {
        Self::with_default_field_depth(DEFAULT_FIELD_MAX_DEPTH)
    }

    /// Ceiling for fields whose descriptor leaves `max_depth` unset.
    pub fn with_default_field_depth(default_field_depth: i32) -> Self {
        Self {
            default_field_depth,
            field_depths: Arc::new(DashMap::new()),
        }
    }

    /// Identity of an erased entity via its mapper.
    pub fn identity_of(mapper: &dyn AnyMapper, entity: &(dyn Any + Send + Sync)) -> Identity {
        let id = mapper.node_id_any(entity);
        Identity::resolve(mapper.entity_label(), id.as_ref(), entity)
    }

    /// Side-effect-free visit check.
    pub fn decide(&self, identity: &Identity, depth: u32, ctx: &TraversalContext) -> VisitDecision {
        if ctx.exceeds_max_depth(depth) {
            VisitDecision::DepthExceeded
        } else if ctx.is_visited(identity) {
            VisitDecision::AlreadyVisited
        } else {
            VisitDecision::Proceed
        }
    }

    pub fn should_visit(&self, identity: &Identity, depth: u32, ctx: &TraversalContext) -> bool {
        self.decide(identity, depth, ctx) == VisitDecision::Proceed
    }

    /// Record a visit. Must precede recursion into the entity's relationships.
    pub fn mark_visited(
        &self,
        identity: &Identity,
        entity_type: &str,
        depth: u32,
        ctx: &mut TraversalContext,
    ) {
        ctx.record_visit(identity, entity_type, depth);
    }

    /// Count a negative decision in the context's stats.
    pub fn record_skip(&self, decision: VisitDecision, ctx: &mut TraversalContext) {
        match decision {
            VisitDecision::AlreadyVisited => ctx.stats.circular_references_prevented += 1,
            VisitDecision::DepthExceeded => ctx.stats.depth_limit_hits += 1,
            VisitDecision::Proceed => {}
        }
    }

    /// Whether `field` of `entity_type` may be loaded from `depth`.
    ///
    /// Fields not described for the type are allowed.
    pub fn should_load_relationship(
        &self,
        entity_type: &str,
        descriptors: &[RelationshipDescriptor],
        field: &str,
        depth: u32,
    ) -> bool {
        let depths = self.field_depths_for(entity_type, descriptors);
        match depths.get(field) {
            None => true,
            Some(&UNBOUNDED_DEPTH) => true,
            Some(&max) => i64::from(depth) < i64::from(max),
        }
    }

    /// Add `label:id` to the persisted set; false if it was already there.
    pub fn mark_persisted(&self, label: &str, id: &Value, ctx: &mut TraversalContext) -> bool {
        ctx.insert_persisted(persisted_key(label, id))
    }

    pub fn was_persisted(&self, label: &str, id: &Value, ctx: &TraversalContext) -> bool {
        ctx.contains_persisted(&persisted_key(label, id))
    }

    fn field_depths_for(
        &self,
        entity_type: &str,
        descriptors: &[RelationshipDescriptor],
    ) -> Arc<HashMap<String, i32>> {
        if let Some(cached) = self.field_depths.get(entity_type) {
            return cached.clone();
        }
        let depths: HashMap<String, i32> = descriptors
            .iter()
            .map(|d| {
                (
                    d.field.clone(),
                    d.max_depth.unwrap_or(self.default_field_depth),
                )
            })
            .collect();
        self.field_depths
            .entry(entity_type.to_string())
            .or_insert_with(|| Arc::new(depths))
            .clone()
    }
}
