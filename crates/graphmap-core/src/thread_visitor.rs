//! Thread-bound form of the relation visitor for the blocking repository.
//!
//! A [`ContextScope`] attaches one [`TraversalContext`] to the calling
//! thread for the duration of a public blocking operation and detaches it
//! on drop, so nothing survives into the next call on a reused worker
//! thread. Nested scopes on the same thread join the outer context.

use std::cell::RefCell;
use std::marker::PhantomData;

use crate::entity::RelationshipDescriptor;
use crate::error::RepositoryError;
use crate::traversal::{Identity, TraversalContext, TraversalStats};
use crate::types::Value;
use crate::visitor::{RelationVisitor, VisitDecision};

thread_local! {
    static CURRENT: RefCell<Option<TraversalContext>> = const { RefCell::new(None) };
}

/// Guard owning the thread's traversal context for one operation.
pub struct ContextScope {
    owner: bool,
    // Scopes are tied to the thread that created them.
    _not_send: PhantomData<*const ()>,
}

impl ContextScope {
    /// Attach a fresh context, or join the one already attached.
    pub fn enter(max_depth: i32) -> Self {
        let owner = CURRENT.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                false
            } else {
                *slot = Some(TraversalContext::new(max_depth));
                true
            }
        });
        Self {
            owner,
            _not_send: PhantomData,
        }
    }

    /// Whether this scope created (and will detach) the context.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Stats of the attached context.
    pub fn stats(&self) -> TraversalStats {
        with_current(|ctx| ctx.stats.clone()).unwrap_or_default()
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        if self.owner {
            let detached = CURRENT.with(|slot| slot.borrow_mut().take());
            if let Some(ctx) = detached {
                tracing::trace!(
                    operation_id = %ctx.operation_id(),
                    visited = ctx.visited_count(),
                    persisted = ctx.persisted_count(),
                    "Detached traversal context"
                );
            }
        }
    }
}

/// Run `f` against the attached context, if any.
///
/// The borrow is released before `f`'s result is returned, so callers may
/// recurse between calls but must not re-enter from inside `f`.
pub fn with_current<R>(f: impl FnOnce(&mut TraversalContext) -> R) -> Option<R> {
    CURRENT.with(|slot| slot.borrow_mut().as_mut().map(f))
}

pub fn is_attached() -> bool {
    CURRENT.with(|slot| slot.borrow().is_some())
}

pub(crate) fn detached() -> RepositoryError {
    RepositoryError::repository(
        "relation visitor",
        "no traversal context attached to the current thread",
    )
}

/// Relation visitor that reads its context from the current thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadBoundVisitor {
    inner: RelationVisitor,
}

impl ThreadBoundVisitor {
    pub fn new(inner: RelationVisitor) -> Self {
        Self { inner }
    }

    pub fn decide(&self, identity: &Identity, depth: u32) -> Result<VisitDecision, RepositoryError> {
        with_current(|ctx| self.inner.decide(identity, depth, ctx)).ok_or_else(detached)
    }

    pub fn should_visit(&self, identity: &Identity, depth: u32) -> Result<bool, RepositoryError> {
        Ok(self.decide(identity, depth)? == VisitDecision::Proceed)
    }

    pub fn mark_visited(
        &self,
        identity: &Identity,
        entity_type: &str,
        depth: u32,
    ) -> Result<(), RepositoryError> {
        with_current(|ctx| self.inner.mark_visited(identity, entity_type, depth, ctx))
            .ok_or_else(detached)
    }

    pub fn record_skip(&self, decision: VisitDecision) -> Result<(), RepositoryError> {
        with_current(|ctx| self.inner.record_skip(decision, ctx)).ok_or_else(detached)
    }

    pub fn should_load_relationship(
        &self,
        entity_type: &str,
        descriptors: &[RelationshipDescriptor],
        field: &str,
        depth: u32,
    ) -> bool {
        self.inner
            .should_load_relationship(entity_type, descriptors, field, depth)
    }

    pub fn mark_persisted(&self, label: &str, id: &Value) -> Result<bool, RepositoryError> {
        with_current(|ctx| self.inner.mark_persisted(label, id, ctx)).ok_or_else(detached)
    }

    pub fn was_persisted(&self, label: &str, id: &Value) -> Result<bool, RepositoryError> {
        with_current(|ctx| self.inner.was_persisted(label, id, ctx)).ok_or_else(detached)
    }
}
