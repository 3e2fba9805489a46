//! Blocking Neo4j backend: the async client driven by a private runtime.
//!
//! Must not be used from inside an async context; `block_on` panics when
//! called on a runtime worker thread.

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use graphmap_core::error::DriverError;
use graphmap_core::statement::Statement;
use graphmap_core::types::Row;

use crate::backend::{BlockingBackend, BlockingTransaction, GraphBackend, GraphTransaction};
use crate::client::{GraphClient, GraphConfig, GraphError, Neo4jTransaction};

/// Neo4j client for synchronous callers.
#[derive(Clone)]
pub struct BlockingGraphClient {
    runtime: Arc<Runtime>,
    client: GraphClient,
}

impl BlockingGraphClient {
    /// Start a small runtime and connect on it.
    pub fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("graphmap-blocking")
            .enable_all()
            .build()
            .map_err(|e| GraphError::Connection(format!("failed to start runtime: {e}")))?;
        let client = runtime.block_on(GraphClient::connect(config))?;
        Ok(Self {
            runtime: Arc::new(runtime),
            client,
        })
    }

    /// The async client sharing this connection pool.
    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    /// Execute a statement outside any transaction and collect all rows.
    pub fn query_rows(&self, statement: &Statement) -> Result<Vec<Row>, GraphError> {
        self.runtime.block_on(self.client.query_rows(statement))
    }
}

impl BlockingBackend for BlockingGraphClient {
    type Tx = BlockingNeo4jTransaction;

    fn begin(&self) -> Result<BlockingNeo4jTransaction, DriverError> {
        let inner = self.runtime.block_on(self.client.begin())?;
        Ok(BlockingNeo4jTransaction {
            runtime: self.runtime.clone(),
            inner,
        })
    }
}

/// A [`Neo4jTransaction`] driven to completion on the client's runtime.
pub struct BlockingNeo4jTransaction {
    runtime: Arc<Runtime>,
    inner: Neo4jTransaction,
}

impl BlockingTransaction for BlockingNeo4jTransaction {
    fn execute(&mut self, statement: &Statement) -> Result<Vec<Row>, DriverError> {
        self.runtime.block_on(self.inner.execute(statement))
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.runtime.block_on(self.inner.commit())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.runtime.block_on(self.inner.rollback())
    }
}
