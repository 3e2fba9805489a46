//! In-process property graph that executes the statement templates.
//!
//! `MemoryGraph` interprets each statement's [`Operation`] instead of its
//! Cypher text. Transactions read a snapshot plus their own writes and keep a
//! journal of write statements; commit replays the journal against the
//! current shared graph, so concurrent transactions never overwrite each
//! other's work. Rollback or drop discards the journal.
//!
//! Every executed statement is logged, failures or stalls can be injected per
//! statement kind, and free-form statements go to an optional handler.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use graphmap_core::entity::Direction;
use graphmap_core::error::DriverError;
use graphmap_core::paging::compare_properties;
use graphmap_core::statement::{NodeSpec, Operation, Statement, NODE_ALIAS, RELATED_ALIAS};
use graphmap_core::types::{NodeValue, Properties, Row, Value};

use crate::backend::{BlockingBackend, BlockingTransaction, GraphBackend, GraphTransaction};

/// Handler for statements built with [`Statement::raw`].
pub type RawHandler = Arc<dyn Fn(&Statement) -> Result<Vec<Row>, DriverError> + Send + Sync>;

/// Shared in-memory graph. Clone is cheap (inner Arc).
#[derive(Clone, Default)]
pub struct MemoryGraph {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<GraphState>,
    log: Mutex<Vec<Statement>>,
    failures: Mutex<Vec<Failure>>,
    stalls: Mutex<Vec<String>>,
    raw_handler: Mutex<Option<RawHandler>>,
    counters: Mutex<TxCounters>,
}

#[derive(Debug, Clone)]
struct Failure {
    kind: String,
    code: Option<String>,
    message: String,
}

impl Failure {
    fn to_error(&self) -> DriverError {
        match &self.code {
            Some(code) => DriverError::with_code(code.clone(), self.message.clone()),
            None => DriverError::new(self.message.clone()),
        }
    }
}

/// Transaction outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxCounters {
    pub begun: usize,
    pub committed: usize,
    pub rolled_back: usize,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Inspection ───────────────────────────────────────────────

    /// Every statement executed so far, in order, including rolled-back ones.
    pub fn executed(&self) -> Vec<Statement> {
        self.shared.log.lock().clone()
    }

    /// Template kinds of [`executed`](Self::executed).
    pub fn executed_kinds(&self) -> Vec<&'static str> {
        self.shared.log.lock().iter().map(Statement::kind).collect()
    }

    pub fn clear_log(&self) {
        self.shared.log.lock().clear();
    }

    pub fn counters(&self) -> TxCounters {
        *self.shared.counters.lock()
    }

    /// Committed nodes carrying `label`, in creation order.
    pub fn nodes(&self, label: &str) -> Vec<NodeValue> {
        let state = self.shared.state.lock();
        state
            .nodes
            .keys()
            .filter(|id| state.has_label(**id, label))
            .filter_map(|id| state.node_value(*id))
            .collect()
    }

    pub fn node_count(&self, label: &str) -> usize {
        self.nodes(label).len()
    }

    /// Committed edges of `rel_type`.
    pub fn edge_count(&self, rel_type: &str) -> usize {
        let state = self.shared.state.lock();
        state.edges.iter().filter(|e| e.rel_type == rel_type).count()
    }

    /// Whether a committed `from -[rel_type]-> to` edge exists.
    pub fn has_edge(&self, from: (&str, &Value), rel_type: &str, to: (&str, &Value)) -> bool {
        let state = self.shared.state.lock();
        let sources = state.matching(from.0, "id", from.1);
        let targets = state.matching(to.0, "id", to.1);
        state.edges.iter().any(|e| {
            e.rel_type == rel_type && sources.contains(&e.from) && targets.contains(&e.to)
        })
    }

    // ── Arrangement ──────────────────────────────────────────────

    /// Insert a committed node directly.
    pub fn add_node(&self, label: &str, properties: Properties) -> i64 {
        self.shared.state.lock().create(label, &properties)
    }

    /// Insert a committed edge between nodes matched by their `id` property.
    pub fn add_edge(&self, from: (&str, &Value), rel_type: &str, to: (&str, &Value)) {
        let mut state = self.shared.state.lock();
        let sources = state.matching(from.0, "id", from.1);
        let targets = state.matching(to.0, "id", to.1);
        for &a in &sources {
            for &b in &targets {
                state.edges.push(StoredEdge {
                    from: a,
                    rel_type: rel_type.to_string(),
                    to: b,
                });
            }
        }
    }

    // ── Failure injection ────────────────────────────────────────

    /// Fail every statement of `kind` (see [`Statement::kind`]); `"begin"`
    /// and `"commit"` target the transaction calls themselves.
    pub fn fail_on(&self, kind: &str, code: Option<&str>, message: &str) {
        self.shared.failures.lock().push(Failure {
            kind: kind.to_string(),
            code: code.map(str::to_string),
            message: message.to_string(),
        });
    }

    pub fn clear_failures(&self) {
        self.shared.failures.lock().clear();
        self.shared.stalls.lock().clear();
    }

    /// Never complete async statements of `kind`, so callers can exercise
    /// timeouts and cancellation. Blocking transactions ignore stalls.
    pub fn stall_on(&self, kind: &str) {
        self.shared.stalls.lock().push(kind.to_string());
    }

    fn stalled(&self, kind: &str) -> bool {
        self.shared.stalls.lock().iter().any(|k| k == kind)
    }

    pub fn set_raw_handler(&self, handler: RawHandler) {
        *self.shared.raw_handler.lock() = Some(handler);
    }

    fn injected(&self, kind: &str) -> Option<DriverError> {
        self.shared
            .failures
            .lock()
            .iter()
            .find(|f| f.kind == kind)
            .map(Failure::to_error)
    }

    fn open(&self) -> Result<MemoryTransaction, DriverError> {
        if let Some(err) = self.injected("begin") {
            return Err(err);
        }
        self.shared.counters.lock().begun += 1;
        let snapshot = self.shared.state.lock().clone();
        Ok(MemoryTransaction {
            graph: self.clone(),
            working: snapshot,
            journal: Vec::new(),
            finished: false,
        })
    }
}

#[async_trait]
impl GraphBackend for MemoryGraph {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, DriverError> {
        self.open()
    }
}

impl BlockingBackend for MemoryGraph {
    type Tx = MemoryTransaction;

    fn begin(&self) -> Result<MemoryTransaction, DriverError> {
        self.open()
    }
}

// ── Transaction ──────────────────────────────────────────────────

/// Snapshot transaction over a [`MemoryGraph`].
pub struct MemoryTransaction {
    graph: MemoryGraph,
    working: GraphState,
    journal: Vec<Statement>,
    finished: bool,
}

impl MemoryTransaction {
    fn run(&mut self, statement: &Statement) -> Result<Vec<Row>, DriverError> {
        if self.finished {
            return Err(DriverError::new("transaction already finished"));
        }
        self.graph.shared.log.lock().push(statement.clone());
        tracing::debug!(kind = statement.kind(), "Executing statement in memory");

        if let Some(err) = self.graph.injected(statement.kind()) {
            return Err(err);
        }
        if matches!(statement.operation, Operation::Raw) {
            let handler = self.graph.shared.raw_handler.lock().clone();
            return match handler {
                Some(handler) => handler(statement),
                None => Err(DriverError::with_code(
                    "Neo.ClientError.Statement.SyntaxError",
                    "free-form statements need a raw handler on the memory graph",
                )),
            };
        }

        let rows = self.working.apply(statement)?;
        if is_write(&statement.operation) {
            self.journal.push(statement.clone());
        }
        Ok(rows)
    }

    fn finish_commit(&mut self) -> Result<(), DriverError> {
        if self.finished {
            return Err(DriverError::new("transaction already finished"));
        }
        if let Some(err) = self.graph.injected("commit") {
            return Err(err);
        }
        let mut state = self.graph.shared.state.lock();
        let mut next = state.clone();
        for statement in &self.journal {
            next.apply(statement)?;
        }
        *state = next;
        drop(state);
        self.finished = true;
        self.journal.clear();
        self.graph.shared.counters.lock().committed += 1;
        Ok(())
    }

    fn finish_rollback(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.journal.clear();
        self.graph.shared.counters.lock().rolled_back += 1;
    }
}

#[async_trait]
impl GraphTransaction for MemoryTransaction {
    async fn execute(&mut self, statement: &Statement) -> Result<Vec<Row>, DriverError> {
        if self.graph.stalled(statement.kind()) {
            self.graph.shared.log.lock().push(statement.clone());
            tracing::debug!(kind = statement.kind(), "Stalling statement in memory");
            std::future::pending::<()>().await;
        }
        self.run(statement)
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.finish_commit()
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.finish_rollback();
        Ok(())
    }
}

impl BlockingTransaction for MemoryTransaction {
    fn execute(&mut self, statement: &Statement) -> Result<Vec<Row>, DriverError> {
        self.run(statement)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.finish_commit()
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.finish_rollback();
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::trace!(writes = self.journal.len(), "Discarding unfinished memory transaction");
            self.finish_rollback();
        }
    }
}

fn is_write(operation: &Operation) -> bool {
    matches!(
        operation,
        Operation::CreateNode { .. }
            | Operation::UpdateNode { .. }
            | Operation::MergeNode { .. }
            | Operation::DeleteNode { .. }
            | Operation::MergeEdge { .. }
            | Operation::ClearEdges { .. }
    )
}

// ── Graph state ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct GraphState {
    next_id: i64,
    nodes: BTreeMap<i64, StoredNode>,
    edges: Vec<StoredEdge>,
}

#[derive(Debug, Clone)]
struct StoredNode {
    labels: Vec<String>,
    properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredEdge {
    from: i64,
    rel_type: String,
    to: i64,
}

fn param<'a>(statement: &'a Statement, name: &str) -> Result<&'a Value, DriverError> {
    statement.params.get(name).ok_or_else(|| {
        DriverError::with_code(
            "Neo.ClientError.Statement.ParameterMissing",
            format!("Expected parameter(s): {name}"),
        )
    })
}

fn map_param(statement: &Statement, name: &str) -> Result<Properties, DriverError> {
    match param(statement, name)? {
        Value::Map(map) => Ok(map.clone()),
        Value::Null => Ok(Properties::new()),
        other => Err(DriverError::with_code(
            "Neo.ClientError.Statement.TypeError",
            format!("Expected ${name} to be a map, got {}", other.type_name()),
        )),
    }
}

/// `SET n += props`: null removes the property.
fn set_properties(target: &mut Properties, properties: &Properties) {
    for (key, value) in properties {
        if value.is_null() {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

impl GraphState {
    fn has_label(&self, id: i64, label: &str) -> bool {
        self.nodes
            .get(&id)
            .map(|n| n.labels.iter().any(|l| l == label))
            .unwrap_or(false)
    }

    fn matching(&self, label: &str, id_property: &str, id: &Value) -> Vec<i64> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.labels.iter().any(|l| l == label))
            .filter(|(_, n)| n.properties.get(id_property) == Some(id))
            .map(|(k, _)| *k)
            .collect()
    }

    fn matching_spec(&self, spec: &NodeSpec, id: &Value) -> Vec<i64> {
        self.matching(&spec.label, &spec.id_property, id)
    }

    fn node_value(&self, id: i64) -> Option<NodeValue> {
        self.nodes.get(&id).map(|n| NodeValue {
            element_id: Some(id),
            labels: n.labels.clone(),
            properties: n.properties.clone(),
        })
    }

    fn node_rows(&self, alias: &str, ids: &[i64]) -> Vec<Row> {
        ids.iter()
            .filter_map(|id| self.node_value(*id))
            .map(|node| Row::new().with(alias, node))
            .collect()
    }

    fn create(&mut self, label: &str, properties: &Properties) -> i64 {
        self.next_id += 1;
        let mut stored = Properties::new();
        set_properties(&mut stored, properties);
        self.nodes.insert(
            self.next_id,
            StoredNode {
                labels: vec![label.to_string()],
                properties: stored,
            },
        );
        self.next_id
    }

    fn edge_exists(&self, from: i64, rel_type: &str, to: i64) -> bool {
        self.edges
            .iter()
            .any(|e| e.from == from && e.to == to && e.rel_type == rel_type)
    }

    fn ensure_edge(&mut self, from: i64, rel_type: &str, to: i64) {
        if !self.edge_exists(from, rel_type, to) {
            self.edges.push(StoredEdge {
                from,
                rel_type: rel_type.to_string(),
                to,
            });
        }
    }

    /// Node on the far side of `edge` from `owner`, honouring `direction`.
    fn far_end(edge: &StoredEdge, owner: i64, direction: Direction) -> Option<i64> {
        match direction {
            Direction::Outgoing => (edge.from == owner).then_some(edge.to),
            Direction::Incoming => (edge.to == owner).then_some(edge.from),
            Direction::Undirected | Direction::Both => {
                if edge.from == owner {
                    Some(edge.to)
                } else if edge.to == owner {
                    Some(edge.from)
                } else {
                    None
                }
            }
        }
    }

    fn apply(&mut self, statement: &Statement) -> Result<Vec<Row>, DriverError> {
        match &statement.operation {
            Operation::CreateNode { label } => {
                let properties = map_param(statement, "props")?;
                let id = self.create(label, &properties);
                Ok(self.node_rows(NODE_ALIAS, &[id]))
            }
            Operation::UpdateNode { label, id_property } => {
                let properties = map_param(statement, "props")?;
                let ids = self.matching(label, id_property, param(statement, "id")?);
                for id in &ids {
                    if let Some(node) = self.nodes.get_mut(id) {
                        set_properties(&mut node.properties, &properties);
                    }
                }
                Ok(self.node_rows(NODE_ALIAS, &ids))
            }
            Operation::MergeNode { label, id_property } => {
                let key = param(statement, "id")?.clone();
                let properties = map_param(statement, "props")?;
                let mut ids = self.matching(label, id_property, &key);
                if ids.is_empty() {
                    let mut identity = Properties::new();
                    identity.insert(id_property.clone(), key);
                    ids.push(self.create(label, &identity));
                }
                for id in &ids {
                    if let Some(node) = self.nodes.get_mut(id) {
                        set_properties(&mut node.properties, &properties);
                    }
                }
                Ok(self.node_rows(NODE_ALIAS, &ids))
            }
            Operation::FindById { label, id_property } => {
                let ids = self.matching(label, id_property, param(statement, "id")?);
                Ok(self.node_rows(NODE_ALIAS, &ids))
            }
            Operation::FindAll {
                label,
                filter,
                sort,
                page,
            } => {
                let mut ids: Vec<i64> = self
                    .nodes
                    .iter()
                    .filter(|(_, n)| n.labels.iter().any(|l| l == label))
                    .filter(|(_, n)| filter.as_ref().map_or(true, |f| f.matches(&n.properties)))
                    .map(|(k, _)| *k)
                    .collect();
                if !sort.is_empty() {
                    ids.sort_by(|a, b| {
                        compare_properties(sort, &self.nodes[a].properties, &self.nodes[b].properties)
                    });
                }
                let (skip, limit) = match page {
                    Some(page) => (page.skip() as usize, page.limit() as usize),
                    None => (0, usize::MAX),
                };
                let window: Vec<i64> = ids.into_iter().skip(skip).take(limit).collect();
                Ok(self.node_rows(NODE_ALIAS, &window))
            }
            Operation::Count { label, filter } => {
                let count = self
                    .nodes
                    .values()
                    .filter(|n| n.labels.iter().any(|l| l == label))
                    .filter(|n| filter.as_ref().map_or(true, |f| f.matches(&n.properties)))
                    .count();
                Ok(vec![Row::new().with("count", Value::Int(count as i64))])
            }
            Operation::Exists { label, id_property } => {
                let found = !self.matching(label, id_property, param(statement, "id")?).is_empty();
                Ok(vec![Row::new().with("exists", found)])
            }
            Operation::DeleteNode { label, id_property } => {
                let ids = self.matching(label, id_property, param(statement, "id")?);
                for id in &ids {
                    self.nodes.remove(id);
                }
                self.edges
                    .retain(|e| !ids.contains(&e.from) && !ids.contains(&e.to));
                Ok(vec![Row::new().with("deleted", Value::Int(ids.len() as i64))])
            }
            Operation::MergeEdge {
                from,
                rel_type,
                direction,
                to,
            } => {
                let sources = self.matching_spec(from, param(statement, "from")?);
                let targets = self.matching_spec(to, param(statement, "to")?);
                let mut merged = 0i64;
                for &a in &sources {
                    for &b in &targets {
                        match direction {
                            Direction::Outgoing => self.ensure_edge(a, rel_type, b),
                            Direction::Incoming => self.ensure_edge(b, rel_type, a),
                            Direction::Undirected | Direction::Both => {
                                if !self.edge_exists(a, rel_type, b) && !self.edge_exists(b, rel_type, a) {
                                    self.ensure_edge(a, rel_type, b);
                                }
                            }
                        }
                        merged += 1;
                    }
                }
                Ok(vec![Row::new().with("merged", Value::Int(merged))])
            }
            Operation::ClearEdges {
                owner,
                rel_type,
                direction,
                target_label,
            } => {
                let owners = self.matching_spec(owner, param(statement, "id")?);
                let nodes = &self.nodes;
                let labelled = |id: i64| {
                    nodes
                        .get(&id)
                        .map(|n| n.labels.iter().any(|l| l == target_label))
                        .unwrap_or(false)
                };
                self.edges.retain(|e| {
                    if &e.rel_type != rel_type {
                        return true;
                    }
                    !owners.iter().any(|&o| {
                        GraphState::far_end(e, o, *direction).map_or(false, |far| labelled(far))
                    })
                });
                Ok(Vec::new())
            }
            Operation::Related {
                owner,
                rel_type,
                direction,
                target_label,
            } => {
                let owners = self.matching_spec(owner, param(statement, "id")?);
                let mut related: Vec<i64> = Vec::new();
                for edge in self.edges.iter().filter(|e| &e.rel_type == rel_type) {
                    for &o in &owners {
                        if let Some(far) = GraphState::far_end(edge, o, *direction) {
                            if self.has_label(far, target_label) && !related.contains(&far) {
                                related.push(far);
                            }
                        }
                    }
                }
                Ok(self.node_rows(RELATED_ALIAS, &related))
            }
            Operation::Raw => Err(DriverError::new("free-form statement reached the graph state")),
        }
    }
}
