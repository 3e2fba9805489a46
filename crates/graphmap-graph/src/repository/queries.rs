//! Read operations and the free-form query surface.

use std::collections::VecDeque;

use futures_util::stream::{self, BoxStream, StreamExt};

use graphmap_core::error::{RepositoryError, Result};
use graphmap_core::filter::Filter;
use graphmap_core::mapper::EntityMapper;
use graphmap_core::paging::FindOptions;
use graphmap_core::statement::{self, Statement};
use graphmap_core::traversal::TraversalContext;
use graphmap_core::types::{FromValue, Params, Row, Value};

use super::AsyncRepository;
use crate::backend::GraphBackend;
use crate::transaction::{driver_failure, TxHandle};

/// State carried between polls of [`AsyncRepository::stream_all`].
struct StreamState<B: GraphBackend, M: EntityMapper> {
    repo: AsyncRepository<B, M>,
    handle: Option<TxHandle<B>>,
    rows: VecDeque<Row>,
}

impl<B: GraphBackend, M: EntityMapper> AsyncRepository<B, M> {
    // ── By id ────────────────────────────────────────────────────

    pub async fn find_by_id(&self, id: impl Into<Value>) -> Result<Option<M::Entity>> {
        let id = id.into();
        let handle = self.coordinator.acquire().await?;
        let result = self.find_by_id_in(&handle, &id, None).await;
        self.coordinator.finish(handle, result).await
    }

    /// [`find_by_id`](Self::find_by_id) continuing a traversal the caller
    /// already started, e.g. from another repository's cascade.
    pub async fn find_by_id_with_context(
        &self,
        id: impl Into<Value>,
        ctx: &mut TraversalContext,
    ) -> Result<Option<M::Entity>> {
        let id = id.into();
        let handle = self.coordinator.acquire().await?;
        let result = self.find_by_id_in(&handle, &id, Some(ctx)).await;
        self.coordinator.finish(handle, result).await
    }

    /// Like [`find_by_id`](Self::find_by_id) but a missing node is an error.
    pub async fn get_by_id(&self, id: impl Into<Value>) -> Result<M::Entity> {
        let id = id.into();
        match self.find_by_id(id.clone()).await? {
            Some(entity) => Ok(entity),
            None => Err(RepositoryError::not_found(format!(
                "findById {} {}",
                self.label(),
                id.key_string()
            ))),
        }
    }

    async fn find_by_id_in(
        &self,
        handle: &TxHandle<B>,
        id: &Value,
        ctx: Option<&mut TraversalContext>,
    ) -> Result<Option<M::Entity>> {
        let context = self.context("findById");
        let stmt = statement::find_by_id(self.label(), self.mapper.node_id_property_name(), id);
        let rows = handle.execute(&stmt).await.map_err(driver_failure(&context))?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let entity = match ctx {
            Some(ctx) => self.hydrate_in(handle, row, ctx, "findById").await?,
            None => self.hydrate(handle, row, "findById").await?,
        };
        Ok(Some(entity))
    }

    pub async fn exists_by_id(&self, id: impl Into<Value>) -> Result<bool> {
        let id = id.into();
        let context = self.context("existsById");
        let handle = self.coordinator.acquire().await?;
        let stmt = statement::exists(self.label(), self.mapper.node_id_property_name(), &id);
        let result = match handle.execute(&stmt).await {
            Ok(rows) => Ok(rows
                .first()
                .and_then(|row| row.get("exists"))
                .map(|v| matches!(v, Value::Bool(true)))
                .unwrap_or(false)),
            Err(e) => Err(driver_failure(&context)(e)),
        };
        self.coordinator.finish(handle, result).await
    }

    /// Whether `entity` has an identifier that names a stored node.
    pub async fn exists(&self, entity: &M::Entity) -> Result<bool> {
        match self.mapper.node_id(entity) {
            Some(id) => self.exists_by_id(id).await,
            None => Ok(false),
        }
    }

    // ── Collections ──────────────────────────────────────────────

    /// Each row is the root of its own traversal: a related entity reachable
    /// from several rows is loaded in full under each of them.
    pub async fn find_all(&self, options: FindOptions) -> Result<Vec<M::Entity>> {
        let context = self.context("findAll");
        let handle = self.coordinator.acquire().await?;
        let result = match handle.execute(&options.statement(self.label())).await {
            Ok(rows) => self.hydrate_all(&handle, &rows, "findAll").await,
            Err(e) => Err(driver_failure(&context)(e)),
        };
        self.coordinator.finish(handle, result).await
    }

    /// Rows are fetched up front; each entity is mapped and its relationships
    /// loaded, under a traversal of its own, when the stream is polled. The
    /// transaction commits once the stream is exhausted and is rolled back if
    /// it is dropped early. After the first error the stream ends.
    pub async fn stream_all(&self, options: FindOptions) -> Result<BoxStream<'static, Result<M::Entity>>> {
        let context = self.context("streamAll");
        let handle = self.coordinator.acquire().await?;
        let rows = match handle.execute(&options.statement(self.label())).await {
            Ok(rows) => rows,
            Err(e) => return self.coordinator.finish(handle, Err(driver_failure(&context)(e))).await,
        };
        tracing::debug!(entity = %self.label(), rows = rows.len(), "Streaming entities");

        let state = StreamState {
            repo: self.clone(),
            handle: Some(handle),
            rows: rows.into(),
        };
        Ok(stream::unfold(state, |mut state| async move {
            let handle = state.handle.take()?;
            let coordinator = state.repo.coordinator.clone();
            match state.rows.pop_front() {
                Some(row) => match state.repo.hydrate(&handle, &row, "streamAll").await {
                    Ok(entity) => {
                        state.handle = Some(handle);
                        Some((Ok(entity), state))
                    }
                    Err(err) => {
                        let failed: Result<()> = Err(err);
                        match coordinator.finish(handle, failed).await {
                            Err(err) => Some((Err(err), state)),
                            Ok(()) => None,
                        }
                    }
                },
                None => match coordinator.finish(handle, Ok(())).await {
                    Ok(()) => None,
                    Err(err) => Some((Err(err), state)),
                },
            }
        })
        .boxed())
    }

    pub async fn count(&self, filter: Option<&Filter>) -> Result<i64> {
        let context = self.context("count");
        let handle = self.coordinator.acquire().await?;
        let result = match handle.execute(&statement::count(self.label(), filter)).await {
            Ok(rows) => rows
                .first()
                .map(|row| row.get_as::<i64>("count"))
                .transpose()
                .map(|count| count.unwrap_or(0))
                .map_err(|e| RepositoryError::mapping(&context, e)),
            Err(e) => Err(driver_failure(&context)(e)),
        };
        self.coordinator.finish(handle, result).await
    }

    // ── Free-form queries ────────────────────────────────────────

    async fn run_raw(&self, cypher: &str, params: Params, operation: &str) -> Result<(TxHandle<B>, Result<Vec<Row>>)> {
        let handle = self.coordinator.acquire().await?;
        let rows = handle
            .execute(&Statement::raw(cypher, params))
            .await
            .map_err(driver_failure(&self.context(operation)));
        Ok((handle, rows))
    }

    /// Raw result rows.
    pub async fn query_rows(&self, cypher: &str, params: Params) -> Result<Vec<Row>> {
        let (handle, rows) = self.run_raw(cypher, params, "query").await?;
        self.coordinator.finish(handle, rows).await
    }

    /// Entities bound to column `n`, each with its relationships loaded under
    /// a traversal of its own.
    pub async fn query(&self, cypher: &str, params: Params) -> Result<Vec<M::Entity>> {
        let (handle, rows) = self.run_raw(cypher, params, "query").await?;
        let result = match rows {
            Ok(rows) => self.hydrate_all(&handle, &rows, "query").await,
            Err(e) => Err(e),
        };
        self.coordinator.finish(handle, result).await
    }

    /// Zero or one entity; more than one row is an error.
    pub async fn query_single(&self, cypher: &str, params: Params) -> Result<Option<M::Entity>> {
        let (handle, rows) = self.run_raw(cypher, params, "querySingle").await?;
        let result = match rows {
            Ok(rows) if rows.len() > 1 => Err(self.too_many("querySingle", rows.len())),
            Ok(rows) => match rows.first() {
                Some(row) => self.hydrate(&handle, row, "querySingle").await.map(Some),
                None => Ok(None),
            },
            Err(e) => Err(e),
        };
        self.coordinator.finish(handle, result).await
    }

    /// A write that must return exactly one entity.
    pub async fn execute_returning(&self, cypher: &str, params: Params) -> Result<M::Entity> {
        let (handle, rows) = self.run_raw(cypher, params, "executeReturning").await?;
        let result = match rows {
            Ok(rows) if rows.len() > 1 => Err(self.too_many("executeReturning", rows.len())),
            Ok(rows) => match rows.first() {
                Some(row) => self.hydrate(&handle, row, "executeReturning").await,
                None => Err(RepositoryError::not_found(self.context("executeReturning"))),
            },
            Err(e) => Err(e),
        };
        self.coordinator.finish(handle, result).await
    }

    /// A write whose result is discarded.
    pub async fn execute_query(&self, cypher: &str, params: Params) -> Result<()> {
        let (handle, rows) = self.run_raw(cypher, params, "executeQuery").await?;
        self.coordinator.finish(handle, rows.map(|_| ())).await
    }

    /// First column of the first row; `None` when there is no row or it is null.
    pub async fn query_scalar<T: FromValue>(&self, cypher: &str, params: Params) -> Result<Option<T>> {
        let context = self.context("queryScalar");
        let (handle, rows) = self.run_raw(cypher, params, "queryScalar").await?;
        let result = rows.and_then(|rows| match rows.first().and_then(Row::first) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(value)
                .map(Some)
                .map_err(|e| RepositoryError::mapping(&context, e)),
        });
        self.coordinator.finish(handle, result).await
    }

    fn too_many(&self, operation: &str, rows: usize) -> RepositoryError {
        RepositoryError::repository(
            self.context(operation),
            format!("expected at most one row, got {rows}"),
        )
    }
}
