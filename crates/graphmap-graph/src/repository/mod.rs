//! Async repository for one entity type.
//!
//! Every public operation creates its own [`TraversalContext`], acquires a
//! transaction from the coordinator (joining one opened by
//! `run_in_transaction`), and finishes it before returning. The context is
//! passed explicitly through the whole cascade; nothing is kept on the task
//! or thread between calls.

mod mutations;
mod queries;

use std::sync::Arc;

use graphmap_core::config::MappingSettings;
use graphmap_core::error::{RepositoryError, Result};
use graphmap_core::guard::ContextGuard;
use graphmap_core::mapper::{EntityMapper, MapperRegistry};
use graphmap_core::statement::NODE_ALIAS;
use graphmap_core::traversal::TraversalContext;
use graphmap_core::types::Row;
use graphmap_core::visitor::RelationVisitor;

use crate::backend::GraphBackend;
use crate::loader::load_relations;
use crate::transaction::{TransactionCoordinator, TxHandle};

pub struct AsyncRepository<B: GraphBackend, M: EntityMapper> {
    coordinator: TransactionCoordinator<B>,
    registry: Arc<MapperRegistry>,
    mapper: Arc<M>,
    visitor: RelationVisitor,
    settings: MappingSettings,
}

impl<B: GraphBackend, M: EntityMapper> Clone for AsyncRepository<B, M> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            registry: self.registry.clone(),
            mapper: self.mapper.clone(),
            visitor: self.visitor.clone(),
            settings: self.settings,
        }
    }
}

impl<B: GraphBackend, M: EntityMapper> AsyncRepository<B, M> {
    /// `registry` must hold a mapper for every label reachable through
    /// `mapper`'s relationship fields.
    pub fn new(
        coordinator: TransactionCoordinator<B>,
        registry: Arc<MapperRegistry>,
        mapper: Arc<M>,
        settings: MappingSettings,
    ) -> Self {
        Self {
            coordinator,
            registry,
            mapper,
            visitor: RelationVisitor::with_default_field_depth(settings.default_field_max_depth),
            settings,
        }
    }

    /// Share one visitor (and its field-depth cache) across repositories.
    pub fn with_visitor(mut self, visitor: RelationVisitor) -> Self {
        self.visitor = visitor;
        self
    }

    pub fn coordinator(&self) -> &TransactionCoordinator<B> {
        &self.coordinator
    }

    pub fn mapper(&self) -> &Arc<M> {
        &self.mapper
    }

    /// A fresh context for one logical operation.
    pub fn new_context(&self) -> TraversalContext {
        TraversalContext::new(self.settings.max_depth)
    }

    fn label(&self) -> &str {
        self.mapper.label()
    }

    fn context(&self, operation: &str) -> String {
        format!("{operation} {}", self.label())
    }

    /// Map `row` and run its read cascade from depth 0 in `ctx`.
    async fn hydrate_in(
        &self,
        handle: &TxHandle<B>,
        row: &Row,
        ctx: &mut TraversalContext,
        operation: &str,
    ) -> Result<M::Entity> {
        let mut entity = self
            .mapper
            .map(row, NODE_ALIAS)
            .map_err(|e| RepositoryError::mapping(self.context(operation), e))?;
        let mut guard = ContextGuard::new(&self.visitor, ctx);
        load_relations(
            handle,
            &self.registry,
            &mut guard,
            &*self.mapper,
            &mut entity,
            0,
        )
        .await?;
        Ok(entity)
    }

    /// Each result row is the root of its own traversal.
    async fn hydrate(&self, handle: &TxHandle<B>, row: &Row, operation: &str) -> Result<M::Entity> {
        let mut ctx = self.new_context();
        let entity = self.hydrate_in(handle, row, &mut ctx, operation).await?;
        self.log_finished(operation, &ctx);
        Ok(entity)
    }

    async fn hydrate_all(
        &self,
        handle: &TxHandle<B>,
        rows: &[Row],
        operation: &str,
    ) -> Result<Vec<M::Entity>> {
        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            entities.push(self.hydrate(handle, row, operation).await?);
        }
        Ok(entities)
    }

    /// Load `entity`'s relationships from `depth` inside a context handed over
    /// by the caller, so a sibling repository's cascade shares cycle state.
    pub async fn load_relations_with(
        &self,
        entity: &mut M::Entity,
        depth: u32,
        ctx: &mut TraversalContext,
    ) -> Result<()> {
        let handle = self.coordinator.acquire().await?;
        let result = {
            let mut guard = ContextGuard::new(&self.visitor, ctx);
            load_relations(
                &handle,
                &self.registry,
                &mut guard,
                &*self.mapper,
                entity,
                depth,
            )
            .await
        };
        self.coordinator.finish(handle, result).await
    }

    fn log_finished(&self, operation: &str, ctx: &TraversalContext) {
        tracing::debug!(
            operation,
            entity = %self.label(),
            operation_id = %ctx.operation_id(),
            visited = ctx.stats.entities_visited,
            cycles = ctx.stats.circular_references_prevented,
            depth_limits = ctx.stats.depth_limit_hits,
            persisted = ctx.stats.entities_persisted,
            "Repository operation finished"
        );
    }
}
