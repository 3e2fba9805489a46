//! One interface over both visitor forms, used by the read cascade and the
//! write planner so the walk itself is written once.

use crate::entity::RelationshipDescriptor;
use crate::error::Result;
use crate::thread_visitor::{with_current, ThreadBoundVisitor};
use crate::traversal::{Identity, TraversalContext};
use crate::types::Value;
use crate::visitor::{RelationVisitor, VisitDecision};

/// Visit, load and persist decisions for the operation in progress.
pub trait TraversalGuard {
    fn decide(&self, identity: &Identity, depth: u32) -> Result<VisitDecision>;

    fn mark_visited(&mut self, identity: &Identity, entity_type: &str, depth: u32) -> Result<()>;

    fn record_skip(&mut self, decision: VisitDecision) -> Result<()>;

    fn should_load_relationship(
        &self,
        entity_type: &str,
        descriptors: &[RelationshipDescriptor],
        field: &str,
        depth: u32,
    ) -> bool;

    fn record_relationships_loaded(&mut self, count: usize) -> Result<()>;

    fn mark_persisted(&mut self, label: &str, id: &Value) -> Result<bool>;

    fn was_persisted(&self, label: &str, id: &Value) -> Result<bool>;

    fn record_edges_merged(&mut self, count: usize) -> Result<()>;
}

// ── Explicit context ─────────────────────────────────────────────

/// A visitor paired with the context it was handed for this operation.
pub struct ContextGuard<'a> {
    visitor: &'a RelationVisitor,
    ctx: &'a mut TraversalContext,
}

impl<'a> ContextGuard<'a> {
    pub fn new(visitor: &'a RelationVisitor, ctx: &'a mut TraversalContext) -> Self {
        Self { visitor, ctx }
    }

    pub fn context(&self) -> &TraversalContext {
        self.ctx
    }
}

impl TraversalGuard for ContextGuard<'_> {
    fn decide(&self, identity: &Identity, depth: u32) -> Result<VisitDecision> {
        Ok(self.visitor.decide(identity, depth, self.ctx))
    }

    fn mark_visited(&mut self, identity: &Identity, entity_type: &str, depth: u32) -> Result<()> {
        self.visitor.mark_visited(identity, entity_type, depth, self.ctx);
        Ok(())
    }

    fn record_skip(&mut self, decision: VisitDecision) -> Result<()> {
        self.visitor.record_skip(decision, self.ctx);
        Ok(())
    }

    fn should_load_relationship(
        &self,
        entity_type: &str,
        descriptors: &[RelationshipDescriptor],
        field: &str,
        depth: u32,
    ) -> bool {
        self.visitor
            .should_load_relationship(entity_type, descriptors, field, depth)
    }

    fn record_relationships_loaded(&mut self, count: usize) -> Result<()> {
        self.ctx.stats.relationships_loaded += count as u64;
        Ok(())
    }

    fn mark_persisted(&mut self, label: &str, id: &Value) -> Result<bool> {
        Ok(self.visitor.mark_persisted(label, id, self.ctx))
    }

    fn was_persisted(&self, label: &str, id: &Value) -> Result<bool> {
        Ok(self.visitor.was_persisted(label, id, self.ctx))
    }

    fn record_edges_merged(&mut self, count: usize) -> Result<()> {
        self.ctx.stats.edges_merged += count as u64;
        Ok(())
    }
}

// ── Thread-bound context ─────────────────────────────────────────

impl TraversalGuard for ThreadBoundVisitor {
    fn decide(&self, identity: &Identity, depth: u32) -> Result<VisitDecision> {
        ThreadBoundVisitor::decide(self, identity, depth)
    }

    fn mark_visited(&mut self, identity: &Identity, entity_type: &str, depth: u32) -> Result<()> {
        ThreadBoundVisitor::mark_visited(self, identity, entity_type, depth)
    }

    fn record_skip(&mut self, decision: VisitDecision) -> Result<()> {
        ThreadBoundVisitor::record_skip(self, decision)
    }

    fn should_load_relationship(
        &self,
        entity_type: &str,
        descriptors: &[RelationshipDescriptor],
        field: &str,
        depth: u32,
    ) -> bool {
        ThreadBoundVisitor::should_load_relationship(self, entity_type, descriptors, field, depth)
    }

    fn record_relationships_loaded(&mut self, count: usize) -> Result<()> {
        with_current(|ctx| ctx.stats.relationships_loaded += count as u64)
            .ok_or_else(crate::thread_visitor::detached)
    }

    fn mark_persisted(&mut self, label: &str, id: &Value) -> Result<bool> {
        ThreadBoundVisitor::mark_persisted(self, label, id)
    }

    fn was_persisted(&self, label: &str, id: &Value) -> Result<bool> {
        ThreadBoundVisitor::was_persisted(self, label, id)
    }

    fn record_edges_merged(&mut self, count: usize) -> Result<()> {
        with_current(|ctx| ctx.stats.edges_merged += count as u64)
            .ok_or_else(crate::thread_visitor::detached)
    }
}
