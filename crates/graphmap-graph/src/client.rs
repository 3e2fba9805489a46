//! Neo4j connection management and the neo4rs-backed transaction.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use neo4rs::{
    BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNode, BoltNull, BoltString,
    BoltType, ConfigBuilder, Graph, Query, Txn,
};

use graphmap_core::config::Neo4jSettings;
use graphmap_core::error::DriverError;
use graphmap_core::statement::Statement;
use graphmap_core::types::{NodeValue, Row, Value};

use crate::backend::{GraphBackend, GraphTransaction};

/// Errors from direct client use (outside the repositories).
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Neo4j row decode error: {0}")]
    Decode(String),
}

impl From<GraphError> for DriverError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Query(e) => driver_error(e),
            GraphError::Connection(message) => {
                DriverError::with_code("Neo.TransientError.General.DatabaseUnavailable", message)
            }
            GraphError::Decode(message) => DriverError::new(message),
        }
    }
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::from(&Neo4jSettings::default())
    }
}

impl From<&Neo4jSettings> for GraphConfig {
    fn from(settings: &Neo4jSettings) -> Self {
        Self {
            uri: settings.uri.clone(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            max_connections: settings.max_connections,
            fetch_size: settings.fetch_size,
        }
    }
}

/// Thread-safe Neo4j client with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Execute a statement outside any transaction, discarding results.
    pub async fn run(&self, statement: &Statement) -> Result<(), GraphError> {
        self.graph.run(to_query(statement)).await?;
        Ok(())
    }

    /// Execute a statement outside any transaction and collect all rows.
    pub async fn query_rows(&self, statement: &Statement) -> Result<Vec<Row>, GraphError> {
        let mut stream = self.graph.execute(to_query(statement)).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(from_row(&row)?);
        }
        Ok(rows)
    }

    /// Begin a transaction.
    pub async fn start_txn(&self) -> Result<Neo4jTransaction, GraphError> {
        let txn = self.graph.start_txn().await?;
        Ok(Neo4jTransaction { txn: Some(txn) })
    }
}

#[async_trait]
impl GraphBackend for GraphClient {
    type Tx = Neo4jTransaction;

    async fn begin(&self) -> Result<Neo4jTransaction, DriverError> {
        Ok(self.start_txn().await?)
    }
}

// ── Transaction ──────────────────────────────────────────────────

/// An explicit Neo4j transaction. Commit and rollback consume the driver
/// handle; later calls are no-ops or errors.
pub struct Neo4jTransaction {
    txn: Option<Txn>,
}

fn finished() -> DriverError {
    DriverError::new("transaction already finished")
}

#[async_trait]
impl GraphTransaction for Neo4jTransaction {
    async fn execute(&mut self, statement: &Statement) -> Result<Vec<Row>, DriverError> {
        let txn = self.txn.as_mut().ok_or_else(finished)?;
        tracing::debug!(kind = statement.kind(), cypher = %statement.cypher, "Executing statement");

        let mut stream = txn.execute(to_query(statement)).await.map_err(driver_error)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next(txn.handle()).await.map_err(driver_error)? {
            rows.push(from_row(&row)?);
        }
        Ok(rows)
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        let txn = self.txn.take().ok_or_else(finished)?;
        txn.commit().await.map_err(driver_error)
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        match self.txn.take() {
            Some(txn) => txn.rollback().await.map_err(driver_error),
            None => Ok(()),
        }
    }
}

// ── Conversion ───────────────────────────────────────────────────

/// Wrap a driver failure, keeping the server status code when present.
pub(crate) fn driver_error(err: neo4rs::Error) -> DriverError {
    match &err {
        neo4rs::Error::Neo4j(server) => {
            let code = server.code().to_string();
            let message = server.message().to_string();
            DriverError::with_code(code, message).with_source(err)
        }
        _ => DriverError::new(err.to_string()).with_source(err),
    }
}

pub(crate) fn to_query(statement: &Statement) -> Query {
    statement
        .params
        .iter()
        .fold(neo4rs::query(&statement.cypher), |q, (name, value)| {
            q.param(name, to_bolt(value))
        })
}

pub(crate) fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Int(i) => BoltType::Integer(BoltInteger::new(*i)),
        Value::Float(f) => BoltType::Float(BoltFloat::new(*f)),
        Value::String(s) => BoltType::String(BoltString::new(s)),
        Value::List(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Map(map) => BoltType::Map(to_bolt_map(map)),
        // Nodes travel as their property maps.
        Value::Node(node) => BoltType::Map(to_bolt_map(&node.properties)),
    }
}

fn to_bolt_map(map: &BTreeMap<String, Value>) -> BoltMap {
    let mut out = BoltMap::new();
    for (k, v) in map {
        out.put(BoltString::new(k), to_bolt(v));
    }
    out
}

pub(crate) fn from_bolt(value: BoltType) -> Value {
    match value {
        BoltType::Null(_) => Value::Null,
        BoltType::Boolean(b) => Value::Bool(b.value),
        BoltType::Integer(i) => Value::Int(i.value),
        BoltType::Float(f) => Value::Float(f.value),
        BoltType::String(s) => Value::String(s.value),
        BoltType::List(list) => Value::List(list.value.into_iter().map(from_bolt).collect()),
        BoltType::Map(map) => Value::Map(from_bolt_map(map)),
        BoltType::Node(node) => Value::Node(from_bolt_node(node)),
        other => {
            tracing::debug!(value = ?other, "Unsupported Bolt value read as null");
            Value::Null
        }
    }
}

fn from_bolt_map(map: BoltMap) -> BTreeMap<String, Value> {
    map.value
        .into_iter()
        .map(|(k, v)| (k.value, from_bolt(v)))
        .collect()
}

fn from_bolt_node(node: BoltNode) -> NodeValue {
    let labels = node
        .labels
        .value
        .into_iter()
        .filter_map(|label| match label {
            BoltType::String(s) => Some(s.value),
            _ => None,
        })
        .collect();
    NodeValue {
        element_id: Some(node.id.value),
        labels,
        properties: from_bolt_map(node.properties),
    }
}

/// Decode every column of a driver row.
pub(crate) fn from_row(row: &neo4rs::Row) -> Result<Row, GraphError> {
    let columns: HashMap<String, BoltType> = row
        .to()
        .map_err(|e| GraphError::Decode(e.to_string()))?;
    let mut out = Row::new();
    for (key, value) in columns {
        out.insert(&key, from_bolt(value));
    }
    Ok(out)
}
