//! Blocking repository for one entity type.
//!
//! Same operations as [`crate::AsyncRepository`] (minus streaming). Each
//! public call attaches a traversal context to the calling thread with a
//! [`ContextScope`] and the relation visitor reads it from there; the scope
//! detaches it before the call returns, panics included.

use std::sync::Arc;

use graphmap_core::config::MappingSettings;
use graphmap_core::error::{RepositoryError, Result};
use graphmap_core::filter::Filter;
use graphmap_core::guard::TraversalGuard;
use graphmap_core::mapper::{EntityMapper, MapperRegistry};
use graphmap_core::paging::FindOptions;
use graphmap_core::plan::{plan_write, WriteMode};
use graphmap_core::statement::{self, Statement, NODE_ALIAS};
use graphmap_core::thread_visitor::{ContextScope, ThreadBoundVisitor};
use graphmap_core::translate::translate;
use graphmap_core::types::{FromValue, Params, Row, Value};
use graphmap_core::visitor::RelationVisitor;

use super::transaction::{BlockingTransactionCoordinator, BlockingTxHandle};
use crate::backend::BlockingBackend;
use crate::loader::load_relations_blocking;

pub struct BlockingRepository<B: BlockingBackend, M: EntityMapper> {
    coordinator: BlockingTransactionCoordinator<B>,
    registry: Arc<MapperRegistry>,
    mapper: Arc<M>,
    visitor: ThreadBoundVisitor,
    settings: MappingSettings,
}

impl<B: BlockingBackend, M: EntityMapper> BlockingRepository<B, M> {
    pub fn new(
        coordinator: BlockingTransactionCoordinator<B>,
        registry: Arc<MapperRegistry>,
        mapper: Arc<M>,
        settings: MappingSettings,
    ) -> Self {
        let visitor = RelationVisitor::with_default_field_depth(settings.default_field_max_depth);
        Self {
            coordinator,
            registry,
            mapper,
            visitor: ThreadBoundVisitor::new(visitor),
            settings,
        }
    }

    pub fn with_visitor(mut self, visitor: RelationVisitor) -> Self {
        self.visitor = ThreadBoundVisitor::new(visitor);
        self
    }

    pub fn coordinator(&self) -> &BlockingTransactionCoordinator<B> {
        &self.coordinator
    }

    fn label(&self) -> &str {
        self.mapper.label()
    }

    fn context(&self, operation: &str) -> String {
        format!("{operation} {}", self.label())
    }

    fn run<T>(&self, f: impl FnOnce(&BlockingTxHandle<B>) -> Result<T>) -> Result<T> {
        let handle = self.coordinator.acquire()?;
        let result = f(&handle);
        self.coordinator.finish(handle, result)
    }

    fn execute(&self, handle: &BlockingTxHandle<B>, stmt: &Statement, context: &str) -> Result<Vec<Row>> {
        handle.execute(stmt).map_err(|e| translate(context, e))
    }

    /// Map `row` and load its relationships. The row is the root of its own
    /// traversal unless a scope is already attached to this thread.
    fn hydrate(&self, handle: &BlockingTxHandle<B>, row: &Row, operation: &str) -> Result<M::Entity> {
        let scope = ContextScope::enter(self.settings.max_depth);
        let mut entity = self
            .mapper
            .map(row, NODE_ALIAS)
            .map_err(|e| RepositoryError::mapping(self.context(operation), e))?;
        let mut guard = self.visitor.clone();
        let mut execute = |stmt: &Statement| handle.execute(stmt);
        load_relations_blocking(
            &mut execute,
            &self.registry,
            &mut guard,
            &*self.mapper,
            &mut entity,
            0,
        )?;
        if scope.is_owner() {
            let stats = scope.stats();
            tracing::debug!(
                operation,
                entity = %self.label(),
                visited = stats.entities_visited,
                cycles = stats.circular_references_prevented,
                depth_limits = stats.depth_limit_hits,
                "Repository operation finished"
            );
        }
        Ok(entity)
    }

    fn hydrate_all(&self, handle: &BlockingTxHandle<B>, rows: &[Row], operation: &str) -> Result<Vec<M::Entity>> {
        rows.iter()
            .map(|row| self.hydrate(handle, row, operation))
            .collect()
    }

    /// Load `entity`'s relationships from `depth` in the context attached to
    /// this thread, or a fresh one.
    pub fn load_relations(&self, entity: &mut M::Entity, depth: u32) -> Result<()> {
        let _scope = ContextScope::enter(self.settings.max_depth);
        self.run(|handle| {
            let mut guard = self.visitor.clone();
            let mut execute = |stmt: &Statement| handle.execute(stmt);
            load_relations_blocking(
                &mut execute,
                &self.registry,
                &mut guard,
                &*self.mapper,
                entity,
                depth,
            )
        })
    }

    // ── Reads ────────────────────────────────────────────────────

    pub fn find_by_id(&self, id: impl Into<Value>) -> Result<Option<M::Entity>> {
        let id = id.into();
        let context = self.context("findById");
        self.run(|handle| {
            let stmt = statement::find_by_id(self.label(), self.mapper.node_id_property_name(), &id);
            let rows = self.execute(handle, &stmt, &context)?;
            rows.first()
                .map(|row| self.hydrate(handle, row, "findById"))
                .transpose()
        })
    }

    pub fn get_by_id(&self, id: impl Into<Value>) -> Result<M::Entity> {
        let id = id.into();
        self.find_by_id(id.clone())?.ok_or_else(|| {
            RepositoryError::not_found(format!("findById {} {}", self.label(), id.key_string()))
        })
    }

    /// Each row gets its own traversal scope unless the caller already holds
    /// one on this thread.
    pub fn find_all(&self, options: FindOptions) -> Result<Vec<M::Entity>> {
        let context = self.context("findAll");
        self.run(|handle| {
            let rows = self.execute(handle, &options.statement(self.label()), &context)?;
            self.hydrate_all(handle, &rows, "findAll")
        })
    }

    pub fn count(&self, filter: Option<&Filter>) -> Result<i64> {
        let context = self.context("count");
        self.run(|handle| {
            let rows = self.execute(handle, &statement::count(self.label(), filter), &context)?;
            match rows.first() {
                Some(row) => row
                    .get_as::<i64>("count")
                    .map_err(|e| RepositoryError::mapping(&context, e)),
                None => Ok(0),
            }
        })
    }

    pub fn exists_by_id(&self, id: impl Into<Value>) -> Result<bool> {
        let id = id.into();
        let context = self.context("existsById");
        self.run(|handle| {
            let stmt = statement::exists(self.label(), self.mapper.node_id_property_name(), &id);
            let rows = self.execute(handle, &stmt, &context)?;
            Ok(matches!(
                rows.first().and_then(|row| row.get("exists")),
                Some(Value::Bool(true))
            ))
        })
    }

    pub fn exists(&self, entity: &M::Entity) -> Result<bool> {
        match self.mapper.node_id(entity) {
            Some(id) => self.exists_by_id(id),
            None => Ok(false),
        }
    }

    // ── Free-form queries ────────────────────────────────────────

    pub fn query_rows(&self, cypher: &str, params: Params) -> Result<Vec<Row>> {
        let context = self.context("query");
        self.run(|handle| self.execute(handle, &Statement::raw(cypher, params), &context))
    }

    /// Entities bound to column `n`; per-row traversal as in
    /// [`find_all`](Self::find_all).
    pub fn query(&self, cypher: &str, params: Params) -> Result<Vec<M::Entity>> {
        let context = self.context("query");
        self.run(|handle| {
            let rows = self.execute(handle, &Statement::raw(cypher, params), &context)?;
            self.hydrate_all(handle, &rows, "query")
        })
    }

    pub fn query_single(&self, cypher: &str, params: Params) -> Result<Option<M::Entity>> {
        let context = self.context("querySingle");
        self.run(|handle| {
            let rows = self.execute(handle, &Statement::raw(cypher, params), &context)?;
            if rows.len() > 1 {
                return Err(RepositoryError::repository(
                    &context,
                    format!("expected at most one row, got {}", rows.len()),
                ));
            }
            rows.first()
                .map(|row| self.hydrate(handle, row, "querySingle"))
                .transpose()
        })
    }

    pub fn execute_returning(&self, cypher: &str, params: Params) -> Result<M::Entity> {
        let context = self.context("executeReturning");
        self.run(|handle| {
            let rows = self.execute(handle, &Statement::raw(cypher, params), &context)?;
            match rows.as_slice() {
                [row] => self.hydrate(handle, row, "executeReturning"),
                [] => Err(RepositoryError::not_found(&context)),
                more => Err(RepositoryError::repository(
                    &context,
                    format!("expected at most one row, got {}", more.len()),
                )),
            }
        })
    }

    pub fn execute_query(&self, cypher: &str, params: Params) -> Result<()> {
        let context = self.context("executeQuery");
        self.run(|handle| self.execute(handle, &Statement::raw(cypher, params), &context).map(|_| ()))
    }

    pub fn query_scalar<T: FromValue>(&self, cypher: &str, params: Params) -> Result<Option<T>> {
        let context = self.context("queryScalar");
        self.run(|handle| {
            let rows = self.execute(handle, &Statement::raw(cypher, params), &context)?;
            match rows.first().and_then(Row::first) {
                None | Some(Value::Null) => Ok(None),
                Some(value) => T::from_value(value)
                    .map(Some)
                    .map_err(|e| RepositoryError::mapping(&context, e)),
            }
        })
    }

    // ── Writes ───────────────────────────────────────────────────

    pub fn create(&self, entity: &M::Entity) -> Result<M::Entity> {
        self.write(WriteMode::Create, entity)
    }

    pub fn update(&self, entity: &M::Entity) -> Result<M::Entity> {
        self.write(WriteMode::Update, entity)
    }

    pub fn merge(&self, entity: &M::Entity) -> Result<M::Entity> {
        self.write(WriteMode::Merge, entity)
    }

    fn write(&self, mode: WriteMode, entity: &M::Entity) -> Result<M::Entity> {
        let context = self.context(mode.as_str());
        let scope = ContextScope::enter(self.settings.max_depth);
        let mut guard = self.visitor.clone();
        let plan = plan_write(mode, self.mapper.to_db(entity), self.mapper.relationships(), &mut guard)?;
        guard.record_edges_merged(plan.edge_merges)?;

        let saved = self.run(|handle| {
            let mut root: Option<Row> = None;
            for step in &plan.steps {
                let rows = self.execute(handle, &step.statement, &context)?;
                step.check(&rows, &context)?;
                if root.is_none() {
                    root = rows.into_iter().next();
                }
            }
            let row = root.ok_or_else(|| RepositoryError::not_found(&context))?;
            let mut saved = self
                .mapper
                .map(&row, NODE_ALIAS)
                .map_err(|e| RepositoryError::mapping(&context, e))?;
            self.mapper
                .apply_post_load_converters(&mut saved)
                .map_err(|e| RepositoryError::mapping(&context, e))?;
            Ok(saved)
        });
        if scope.is_owner() {
            let stats = scope.stats();
            tracing::debug!(
                operation = mode.as_str(),
                entity = %self.label(),
                persisted = stats.entities_persisted,
                edges = stats.edges_merged,
                "Repository operation finished"
            );
        }
        saved
    }

    pub fn delete(&self, entity: &M::Entity) -> Result<bool> {
        match self.mapper.node_id(entity) {
            Some(id) => self.delete_by_id(id),
            None => Err(RepositoryError::repository(
                self.context("delete"),
                format!(
                    "identifier property '{}' is not set",
                    self.mapper.node_id_property_name()
                ),
            )),
        }
    }

    pub fn delete_by_id(&self, id: impl Into<Value>) -> Result<bool> {
        let id = id.into();
        let context = self.context("deleteById");
        self.run(|handle| {
            let stmt = statement::delete_by_id(self.label(), self.mapper.node_id_property_name(), &id);
            let rows = self.execute(handle, &stmt, &context)?;
            Ok(rows
                .first()
                .and_then(|row| row.get("deleted"))
                .and_then(Value::as_i64)
                .unwrap_or(0)
                > 0)
        })
    }
}
