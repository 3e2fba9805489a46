//! Parameterized Cypher templates used by the repositories.
//!
//! Every template returns a [`Statement`] carrying the Cypher text, its
//! parameters, and an [`Operation`] describing the template. Network
//! backends run the text; the in-memory backend interprets the operation.
//! Labels, relationship types and property names are backtick-quoted;
//! all values travel as parameters.

use crate::entity::{Direction, RelationshipDescriptor};
use crate::filter::Filter;
use crate::paging::{order_by_clause, Page, Sort};
use crate::types::{Params, Properties, Value};

/// Alias of the primary node in every node template.
pub const NODE_ALIAS: &str = "n";
/// Alias of the related node in relationship reads.
pub const RELATED_ALIAS: &str = "related";

/// Which template a statement was built from.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    CreateNode {
        label: String,
    },
    UpdateNode {
        label: String,
        id_property: String,
    },
    MergeNode {
        label: String,
        id_property: String,
    },
    FindById {
        label: String,
        id_property: String,
    },
    FindAll {
        label: String,
        filter: Option<Filter>,
        sort: Vec<Sort>,
        page: Option<Page>,
    },
    Count {
        label: String,
        filter: Option<Filter>,
    },
    Exists {
        label: String,
        id_property: String,
    },
    DeleteNode {
        label: String,
        id_property: String,
    },
    /// Never carries [`Direction::Both`]; that is split into two statements.
    MergeEdge {
        from: NodeSpec,
        rel_type: String,
        direction: Direction,
        to: NodeSpec,
    },
    ClearEdges {
        owner: NodeSpec,
        rel_type: String,
        direction: Direction,
        target_label: String,
    },
    Related {
        owner: NodeSpec,
        rel_type: String,
        direction: Direction,
        target_label: String,
    },
    /// Caller-supplied text.
    Raw,
}

/// Label and identifier property of a node matched by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub label: String,
    pub id_property: String,
}

impl NodeSpec {
    pub fn new(label: &str, id_property: &str) -> Self {
        Self {
            label: label.to_string(),
            id_property: id_property.to_string(),
        }
    }

    fn pattern(&self, alias: &str, param: &str) -> String {
        format!(
            "({alias}:{} {{{}: ${param}}})",
            quote_ident(&self.label),
            quote_ident(&self.id_property)
        )
    }
}

/// A statement ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub cypher: String,
    pub params: Params,
    pub operation: Operation,
}

impl Statement {
    /// Free-form statement.
    pub fn raw(cypher: impl Into<String>, params: Params) -> Self {
        Self {
            cypher: cypher.into(),
            params,
            operation: Operation::Raw,
        }
    }

    fn new(cypher: String, operation: Operation) -> Self {
        Self {
            cypher,
            params: Params::new(),
            operation,
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    /// Short name of the template, for logs.
    pub fn kind(&self) -> &'static str {
        match self.operation {
            Operation::CreateNode { .. } => "create_node",
            Operation::UpdateNode { .. } => "update_node",
            Operation::MergeNode { .. } => "merge_node",
            Operation::FindById { .. } => "find_by_id",
            Operation::FindAll { .. } => "find_all",
            Operation::Count { .. } => "count",
            Operation::Exists { .. } => "exists",
            Operation::DeleteNode { .. } => "delete_node",
            Operation::MergeEdge { .. } => "merge_edge",
            Operation::ClearEdges { .. } => "clear_edges",
            Operation::Related { .. } => "related",
            Operation::Raw => "raw",
        }
    }
}

/// Backtick-quote an identifier, escaping embedded backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn edge_pattern(direction: Direction, rel: &str) -> (&'static str, String, &'static str) {
    match direction {
        Direction::Outgoing => ("-", format!("[{rel}]"), "->"),
        Direction::Incoming => ("<-", format!("[{rel}]"), "-"),
        Direction::Undirected | Direction::Both => ("-", format!("[{rel}]"), "-"),
    }
}

// ── Node templates ───────────────────────────────────────────────

pub fn create_node(label: &str, properties: Properties) -> Statement {
    Statement::new(
        format!("CREATE (n:{}) SET n = $props RETURN n", quote_ident(label)),
        Operation::CreateNode {
            label: label.to_string(),
        },
    )
    .param("props", Value::Map(properties))
}

pub fn update_node(label: &str, id_property: &str, id: &Value, properties: Properties) -> Statement {
    let spec = NodeSpec::new(label, id_property);
    Statement::new(
        format!("MATCH {} SET n += $props RETURN n", spec.pattern("n", "id")),
        Operation::UpdateNode {
            label: label.to_string(),
            id_property: id_property.to_string(),
        },
    )
    .param("id", id.clone())
    .param("props", Value::Map(properties))
}

pub fn merge_node(label: &str, id_property: &str, id: &Value, properties: Properties) -> Statement {
    let spec = NodeSpec::new(label, id_property);
    Statement::new(
        format!("MERGE {} SET n += $props RETURN n", spec.pattern("n", "id")),
        Operation::MergeNode {
            label: label.to_string(),
            id_property: id_property.to_string(),
        },
    )
    .param("id", id.clone())
    .param("props", Value::Map(properties))
}

pub fn find_by_id(label: &str, id_property: &str, id: &Value) -> Statement {
    let spec = NodeSpec::new(label, id_property);
    Statement::new(
        format!("MATCH {} RETURN n", spec.pattern("n", "id")),
        Operation::FindById {
            label: label.to_string(),
            id_property: id_property.to_string(),
        },
    )
    .param("id", id.clone())
}

pub fn find_all(
    label: &str,
    filter: Option<&Filter>,
    sort: &[Sort],
    page: Option<Page>,
) -> Statement {
    let mut cypher = format!("MATCH (n:{})", quote_ident(label));
    let mut params = Params::new();
    if let Some(filter) = filter {
        let clause = filter.to_cypher(NODE_ALIAS);
        cypher.push_str(&format!(" WHERE {}", clause.clause));
        params.extend(clause.params);
    }
    cypher.push_str(" RETURN n");
    cypher.push_str(&order_by_clause(NODE_ALIAS, sort));
    if let Some(page) = page {
        cypher.push_str(" SKIP $skip LIMIT $limit");
        params.insert("skip".into(), Value::Int(page.skip()));
        params.insert("limit".into(), Value::Int(page.limit()));
    }
    Statement {
        cypher,
        params,
        operation: Operation::FindAll {
            label: label.to_string(),
            filter: filter.cloned(),
            sort: sort.to_vec(),
            page,
        },
    }
}

pub fn count(label: &str, filter: Option<&Filter>) -> Statement {
    let mut cypher = format!("MATCH (n:{})", quote_ident(label));
    let mut params = Params::new();
    if let Some(filter) = filter {
        let clause = filter.to_cypher(NODE_ALIAS);
        cypher.push_str(&format!(" WHERE {}", clause.clause));
        params.extend(clause.params);
    }
    cypher.push_str(" RETURN count(n) AS count");
    Statement {
        cypher,
        params,
        operation: Operation::Count {
            label: label.to_string(),
            filter: filter.cloned(),
        },
    }
}

pub fn exists(label: &str, id_property: &str, id: &Value) -> Statement {
    let spec = NodeSpec::new(label, id_property);
    Statement::new(
        format!("MATCH {} RETURN count(n) > 0 AS exists", spec.pattern("n", "id")),
        Operation::Exists {
            label: label.to_string(),
            id_property: id_property.to_string(),
        },
    )
    .param("id", id.clone())
}

pub fn delete_by_id(label: &str, id_property: &str, id: &Value) -> Statement {
    let spec = NodeSpec::new(label, id_property);
    Statement::new(
        format!(
            "MATCH {} DETACH DELETE n RETURN count(n) AS deleted",
            spec.pattern("n", "id")
        ),
        Operation::DeleteNode {
            label: label.to_string(),
            id_property: id_property.to_string(),
        },
    )
    .param("id", id.clone())
}

// ── Edge templates ───────────────────────────────────────────────

/// MERGE statements linking `from` → `to`; two for [`Direction::Both`].
pub fn merge_edges(
    from: &NodeSpec,
    from_id: &Value,
    rel_type: &str,
    direction: Direction,
    to: &NodeSpec,
    to_id: &Value,
) -> Vec<Statement> {
    let directions: &[Direction] = match direction {
        Direction::Both => &[Direction::Outgoing, Direction::Incoming],
        Direction::Outgoing => &[Direction::Outgoing],
        Direction::Incoming => &[Direction::Incoming],
        Direction::Undirected => &[Direction::Undirected],
    };
    directions
        .iter()
        .map(|&dir| {
            let (left, rel, right) = edge_pattern(dir, &format!("r:{}", quote_ident(rel_type)));
            Statement::new(
                format!(
                    "MATCH {} MATCH {} MERGE (a){left}{rel}{right}(b) RETURN count(r) AS merged",
                    from.pattern("a", "from"),
                    to.pattern("b", "to"),
                ),
                Operation::MergeEdge {
                    from: from.clone(),
                    rel_type: rel_type.to_string(),
                    direction: dir,
                    to: to.clone(),
                },
            )
            .param("from", from_id.clone())
            .param("to", to_id.clone())
        })
        .collect()
}

/// Remove the owner's existing edges for one relationship field.
pub fn clear_edges(owner: &NodeSpec, owner_id: &Value, descriptor: &RelationshipDescriptor) -> Statement {
    let (left, rel, right) = edge_pattern(
        descriptor.direction,
        &format!("r:{}", quote_ident(&descriptor.rel_type)),
    );
    Statement::new(
        format!(
            "MATCH {}{left}{rel}{right}(:{}) DELETE r",
            owner.pattern("a", "id"),
            quote_ident(&descriptor.target_label)
        ),
        Operation::ClearEdges {
            owner: owner.clone(),
            rel_type: descriptor.rel_type.clone(),
            direction: descriptor.direction,
            target_label: descriptor.target_label.clone(),
        },
    )
    .param("id", owner_id.clone())
}

/// Read the nodes related to the owner through one relationship field.
pub fn related(owner: &NodeSpec, owner_id: &Value, descriptor: &RelationshipDescriptor) -> Statement {
    let (left, rel, right) =
        edge_pattern(descriptor.direction, &format!(":{}", quote_ident(&descriptor.rel_type)));
    Statement::new(
        format!(
            "MATCH {}{left}{rel}{right}({RELATED_ALIAS}:{}) RETURN DISTINCT {RELATED_ALIAS}",
            owner.pattern("a", "id"),
            quote_ident(&descriptor.target_label)
        ),
        Operation::Related {
            owner: owner.clone(),
            rel_type: descriptor.rel_type.clone(),
            direction: descriptor.direction,
            target_label: descriptor.target_label.clone(),
        },
    )
    .param("id", owner_id.clone())
}
