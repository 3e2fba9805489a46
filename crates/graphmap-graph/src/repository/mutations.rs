//! Write operations.
//!
//! `create`, `update` and `merge` lay out the full statement sequence with
//! [`plan_write`] and run it step by step in one transaction; any failed or
//! unsatisfied step rolls the whole write back.

use graphmap_core::error::{RepositoryError, Result};
use graphmap_core::guard::{ContextGuard, TraversalGuard};
use graphmap_core::mapper::EntityMapper;
use graphmap_core::plan::{plan_write, WriteMode, WritePlan};
use graphmap_core::statement::{self, NODE_ALIAS};
use graphmap_core::types::{Row, Value};

use super::AsyncRepository;
use crate::backend::GraphBackend;
use crate::transaction::{driver_failure, TxHandle};

impl<B: GraphBackend, M: EntityMapper> AsyncRepository<B, M> {
    /// Create `entity` and everything reachable through its persisting
    /// relationships. Nodes without an identifier get a fresh one.
    pub async fn create(&self, entity: &M::Entity) -> Result<M::Entity> {
        self.write(WriteMode::Create, entity).await
    }

    /// Update an existing node; its persisting relationship fields are
    /// replaced by the edges `entity` carries now.
    pub async fn update(&self, entity: &M::Entity) -> Result<M::Entity> {
        self.write(WriteMode::Update, entity).await
    }

    /// Create or update by identifier, replacing relationship fields as
    /// [`update`](Self::update) does.
    pub async fn merge(&self, entity: &M::Entity) -> Result<M::Entity> {
        self.write(WriteMode::Merge, entity).await
    }

    async fn write(&self, mode: WriteMode, entity: &M::Entity) -> Result<M::Entity> {
        let operation = mode.as_str();
        let context = self.context(operation);
        let mut ctx = self.new_context();
        let plan = {
            let mut guard = ContextGuard::new(&self.visitor, &mut ctx);
            let plan = plan_write(mode, self.mapper.to_db(entity), self.mapper.relationships(), &mut guard)?;
            guard.record_edges_merged(plan.edge_merges)?;
            plan
        };
        tracing::debug!(
            entity = %self.label(),
            operation,
            steps = plan.steps.len(),
            nodes = plan.node_writes,
            edges = plan.edge_merges,
            "Planned write"
        );

        let handle = self.coordinator.acquire().await?;
        let result = self.apply(&handle, &plan, &context).await;
        let result = self.coordinator.finish(handle, result).await;
        self.log_finished(operation, &ctx);
        result
    }

    async fn apply(&self, handle: &TxHandle<B>, plan: &WritePlan, context: &str) -> Result<M::Entity> {
        let mut root: Option<Row> = None;
        for step in &plan.steps {
            let rows = handle
                .execute(&step.statement)
                .await
                .map_err(driver_failure(context))?;
            step.check(&rows, context)?;
            if root.is_none() {
                root = rows.into_iter().next();
            }
        }
        let row = root.ok_or_else(|| RepositoryError::not_found(context))?;
        let mut saved = self
            .mapper
            .map(&row, NODE_ALIAS)
            .map_err(|e| RepositoryError::mapping(context, e))?;
        self.mapper
            .apply_post_load_converters(&mut saved)
            .map_err(|e| RepositoryError::mapping(context, e))?;
        Ok(saved)
    }

    /// Delete `entity`'s node and its edges. An entity without an
    /// identifier was never stored and is an error.
    pub async fn delete(&self, entity: &M::Entity) -> Result<bool> {
        match self.mapper.node_id(entity) {
            Some(id) => self.delete_by_id(id).await,
            None => Err(RepositoryError::repository(
                self.context("delete"),
                format!(
                    "identifier property '{}' is not set",
                    self.mapper.node_id_property_name()
                ),
            )),
        }
    }

    /// Whether a node was deleted.
    pub async fn delete_by_id(&self, id: impl Into<Value>) -> Result<bool> {
        let id = id.into();
        let context = self.context("deleteById");
        let handle = self.coordinator.acquire().await?;
        let stmt = statement::delete_by_id(self.label(), self.mapper.node_id_property_name(), &id);
        let result = match handle.execute(&stmt).await {
            Ok(rows) => Ok(rows
                .first()
                .and_then(|row| row.get("deleted"))
                .and_then(Value::as_i64)
                .unwrap_or(0)
                > 0),
            Err(e) => Err(driver_failure(&context)(e)),
        };
        if let Ok(deleted) = &result {
            tracing::debug!(entity = %self.label(), id = %id.key_string(), deleted, "Deleted node");
        }
        self.coordinator.finish(handle, result).await
    }
}
