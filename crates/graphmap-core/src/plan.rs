//! Two-phase write planning.
//!
//! Identifiers are resolved on the client (pre-assigned, or a fresh UUID v4),
//! so the whole statement sequence of one write can be laid out before any of
//! it runs: the root write, stale-edge clears for `update`/`merge`, one node
//! write per distinct nested target, and finally every edge merge. No edge
//! merge is ever ordered before a node write.

use uuid::Uuid;

use crate::entity::{EntityWithRelations, RelationshipDescriptor};
use crate::error::{RepositoryError, Result};
use crate::guard::TraversalGuard;
use crate::statement::{self, NodeSpec, Statement};
use crate::types::{Row, Value};

/// Which root write a plan starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
    Merge,
}

impl WriteMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteMode::Create => "create",
            WriteMode::Update => "update",
            WriteMode::Merge => "merge",
        }
    }
}

/// What a planned statement must return for the write to go on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// Any result.
    Nothing,
    /// At least one row, else the node was not found.
    Row,
    /// A positive `merged` count, else an endpoint is missing.
    Merged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStatement {
    pub statement: Statement,
    pub expect: Expectation,
}

impl PlannedStatement {
    fn new(statement: Statement, expect: Expectation) -> Self {
        Self { statement, expect }
    }

    /// Check the rows this step returned against its expectation.
    pub fn check(&self, rows: &[Row], context: &str) -> Result<()> {
        match self.expect {
            Expectation::Nothing => Ok(()),
            Expectation::Row if rows.is_empty() => Err(RepositoryError::not_found(context)),
            Expectation::Row => Ok(()),
            Expectation::Merged => {
                let merged = rows
                    .first()
                    .and_then(|row| row.get("merged"))
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                if merged > 0 {
                    Ok(())
                } else {
                    Err(RepositoryError::repository(
                        context,
                        "relationship endpoint does not exist",
                    ))
                }
            }
        }
    }
}

/// Ordered statements for one write. The first step is the root write.
#[derive(Debug, Clone, PartialEq)]
pub struct WritePlan {
    pub root_id: Value,
    pub steps: Vec<PlannedStatement>,
    pub node_writes: usize,
    pub edge_merges: usize,
}

/// Fresh identifier for a node written without one.
pub fn new_identifier() -> Value {
    Value::from(Uuid::new_v4())
}

/// Lay out the statements that persist `root` and its relationship graph.
///
/// `descriptors` are the root type's relationship fields; on `update` and
/// `merge` each persisting one has its existing edges cleared first.
pub fn plan_write<G: TraversalGuard>(
    mode: WriteMode,
    mut root: EntityWithRelations,
    descriptors: &[RelationshipDescriptor],
    guard: &mut G,
) -> Result<WritePlan> {
    let context = format!("{} {}", mode.as_str(), root.entity_type);
    let root_id = match (root.id().cloned(), mode) {
        (Some(id), _) => id,
        (None, WriteMode::Create) => {
            let id = new_identifier();
            root.set_id(id.clone());
            id
        }
        (None, _) => {
            return Err(RepositoryError::repository(
                context,
                format!("identifier property '{}' is not set", root.id_property),
            ))
        }
    };

    let label = root.entity_type.clone();
    let id_property = root.id_property.clone();
    let properties = root.properties.clone();
    let root_statement = match mode {
        WriteMode::Create => statement::create_node(&label, properties),
        WriteMode::Update => statement::update_node(&label, &id_property, &root_id, properties),
        WriteMode::Merge => statement::merge_node(&label, &id_property, &root_id, properties),
    };
    let mut steps = vec![PlannedStatement::new(root_statement, Expectation::Row)];

    if mode != WriteMode::Create {
        let owner = NodeSpec::new(&label, &id_property);
        for descriptor in descriptors.iter().filter(|d| d.mode.persists()) {
            steps.push(PlannedStatement::new(
                statement::clear_edges(&owner, &root_id, descriptor),
                Expectation::Nothing,
            ));
        }
    }

    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    walk(&mut root, guard, &mut nodes, &mut edges)?;

    let node_writes = nodes.len() + 1;
    let edge_merges = edges.len();
    steps.extend(nodes);
    steps.extend(edges);

    Ok(WritePlan {
        root_id,
        steps,
        node_writes,
        edge_merges,
    })
}

/// Resolve every persisting relationship target of `entity`, then queue its
/// edges. `entity` must already carry an identifier.
fn walk<G: TraversalGuard>(
    entity: &mut EntityWithRelations,
    guard: &mut G,
    nodes: &mut Vec<PlannedStatement>,
    edges: &mut Vec<PlannedStatement>,
) -> Result<()> {
    let Some(id) = entity.id().cloned() else {
        return Ok(());
    };
    if !guard.mark_persisted(&entity.entity_type, &id)? {
        return Ok(());
    }
    let owner = NodeSpec::new(&entity.entity_type, &entity.id_property);

    for rel in entity.relationships.iter_mut().filter(|r| r.mode.persists()) {
        if let Some(target) = rel.target.as_deref_mut() {
            let target_id = match target.id().cloned() {
                Some(known) if guard.was_persisted(&target.entity_type, &known)? => known,
                Some(known) => {
                    nodes.push(PlannedStatement::new(
                        statement::merge_node(
                            &target.entity_type,
                            &target.id_property,
                            &known,
                            target.properties.clone(),
                        ),
                        Expectation::Row,
                    ));
                    walk(target, guard, nodes, edges)?;
                    known
                }
                None => {
                    let fresh = new_identifier();
                    target.set_id(fresh.clone());
                    nodes.push(PlannedStatement::new(
                        statement::create_node(&target.entity_type, target.properties.clone()),
                        Expectation::Row,
                    ));
                    walk(target, guard, nodes, edges)?;
                    fresh
                }
            };
            rel.target_id_property = target.id_property.clone();
            rel.target_id = Some(target_id);
        }
    }

    // Second phase for this entity: every target above now has an id.
    for rel in entity.persisted_relationships() {
        let Some(target_id) = &rel.target_id else {
            tracing::debug!(
                entity = %entity.entity_type,
                rel_type = %rel.rel_type,
                "Skipping relationship without a resolvable target"
            );
            continue;
        };
        let target = NodeSpec::new(&rel.target_label, &rel.target_id_property);
        for stmt in statement::merge_edges(&owner, &id, &rel.rel_type, rel.direction, &target, target_id) {
            edges.push(PlannedStatement::new(stmt, Expectation::Merged));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Direction, RelationshipData, RelationshipMode};
    use crate::guard::ContextGuard;
    use crate::traversal::TraversalContext;
    use crate::types::Properties;
    use crate::visitor::RelationVisitor;

    fn person(id: Option<&str>, name: &str) -> EntityWithRelations {
        let mut props = Properties::new();
        props.insert("name".into(), Value::from(name));
        if let Some(id) = id {
            props.insert("id".into(), Value::from(id));
        }
        EntityWithRelations::new("Person", "id", props)
    }

    fn knows(target: EntityWithRelations) -> RelationshipData {
        RelationshipData::cascade("KNOWS", Direction::Outgoing, RelationshipMode::FetchAndPersist, target)
    }

    fn kinds(plan: &WritePlan) -> Vec<&'static str> {
        plan.steps.iter().map(|s| s.statement.kind()).collect()
    }

    #[test]
    fn test_create_assigns_identifier() {
        let visitor = RelationVisitor::new();
        let mut ctx = TraversalContext::default();
        let mut guard = ContextGuard::new(&visitor, &mut ctx);
        let plan = plan_write(WriteMode::Create, person(None, "Tester"), &[], &mut guard).unwrap();

        assert!(plan.root_id.as_str().is_some());
        let props = &plan.steps[0].statement.params["props"];
        match props {
            Value::Map(map) => assert_eq!(map.get("id"), Some(&plan.root_id)),
            other => panic!("unexpected props {other:?}"),
        }
    }

    #[test]
    fn test_update_requires_identifier() {
        let visitor = RelationVisitor::new();
        let mut ctx = TraversalContext::default();
        let mut guard = ContextGuard::new(&visitor, &mut ctx);
        let err = plan_write(WriteMode::Update, person(None, "x"), &[], &mut guard).unwrap_err();
        assert!(err.to_string().contains("identifier"));
    }

    #[test]
    fn test_nodes_precede_edges() {
        let visitor = RelationVisitor::new();
        let mut ctx = TraversalContext::default();
        let mut guard = ContextGuard::new(&visitor, &mut ctx);
        let root = person(Some("a"), "A")
            .with_relationship(knows(person(Some("b"), "B").with_relationship(knows(person(None, "C")))));
        let plan = plan_write(WriteMode::Create, root, &[], &mut guard).unwrap();

        assert_eq!(
            kinds(&plan),
            vec!["create_node", "merge_node", "create_node", "merge_edge", "merge_edge"]
        );
        assert_eq!(plan.node_writes, 3);
        assert_eq!(plan.edge_merges, 2);
    }

    #[test]
    fn test_shared_target_written_once() {
        let visitor = RelationVisitor::new();
        let mut ctx = TraversalContext::default();
        let root = person(Some("r"), "R")
            .with_relationship(knows(person(Some("a"), "A").with_relationship(knows(person(Some("c"), "C")))))
            .with_relationship(knows(person(Some("b"), "B").with_relationship(knows(person(Some("c"), "C")))));
        let plan = {
            let mut guard = ContextGuard::new(&visitor, &mut ctx);
            plan_write(WriteMode::Create, root, &[], &mut guard).unwrap()
        };

        let c_writes = plan
            .steps
            .iter()
            .filter(|s| s.statement.kind() == "merge_node" && s.statement.params["id"] == Value::from("c"))
            .count();
        assert_eq!(c_writes, 1);
        assert_eq!(plan.edge_merges, 4);
        assert_eq!(ctx.stats.entities_persisted, 4);
    }

    #[test]
    fn test_mutual_reference_terminates() {
        let visitor = RelationVisitor::new();
        let mut ctx = TraversalContext::default();
        let mut guard = ContextGuard::new(&visitor, &mut ctx);
        let back = person(Some("a"), "A");
        let root = person(Some("a"), "A").with_relationship(knows(person(Some("b"), "B").with_relationship(knows(back))));
        let plan = plan_write(WriteMode::Create, root, &[], &mut guard).unwrap();

        assert_eq!(kinds(&plan), vec!["create_node", "merge_node", "merge_edge", "merge_edge"]);
    }

    #[test]
    fn test_fetch_only_never_written() {
        let visitor = RelationVisitor::new();
        let mut ctx = TraversalContext::default();
        let mut guard = ContextGuard::new(&visitor, &mut ctx);
        let root = person(Some("a"), "A").with_relationship(RelationshipData::link(
            "FOLLOWS",
            Direction::Outgoing,
            RelationshipMode::FetchOnly,
            "Person",
            "b",
        ));
        let plan = plan_write(WriteMode::Create, root, &[], &mut guard).unwrap();
        assert_eq!(kinds(&plan), vec!["create_node"]);
    }

    #[test]
    fn test_update_clears_persisting_fields() {
        let visitor = RelationVisitor::new();
        let mut ctx = TraversalContext::default();
        let mut guard = ContextGuard::new(&visitor, &mut ctx);
        let descriptors = vec![
            RelationshipDescriptor::new("friends", "KNOWS", Direction::Outgoing, "Person"),
            RelationshipDescriptor::new("followers", "FOLLOWS", Direction::Incoming, "Person")
                .mode(RelationshipMode::FetchOnly),
        ];
        let root = person(Some("a"), "A").with_relationship(RelationshipData::link(
            "KNOWS",
            Direction::Outgoing,
            RelationshipMode::FetchAndPersist,
            "Person",
            "b",
        ));
        let plan = plan_write(WriteMode::Update, root, &descriptors, &mut guard).unwrap();
        assert_eq!(kinds(&plan), vec!["update_node", "clear_edges", "merge_edge"]);
    }

    #[test]
    fn test_step_checks() {
        let visitor = RelationVisitor::new();
        let mut ctx = TraversalContext::default();
        let mut guard = ContextGuard::new(&visitor, &mut ctx);
        let root = person(Some("a"), "A").with_relationship(RelationshipData::link(
            "KNOWS",
            Direction::Outgoing,
            RelationshipMode::FetchAndPersist,
            "Person",
            "b",
        ));
        let plan = plan_write(WriteMode::Update, root, &[], &mut guard).unwrap();

        let update = &plan.steps[0];
        assert!(update.check(&[], "update Person").unwrap_err().is_not_found());
        assert!(update.check(&[Row::new().with("n", 1i64)], "update Person").is_ok());

        let edge = &plan.steps[1];
        assert!(edge.check(&[Row::new().with("merged", 0i64)], "merge_edge").is_err());
        assert!(edge.check(&[Row::new().with("merged", 1i64)], "merge_edge").is_ok());
    }

    #[test]
    fn test_both_direction_merges_twice() {
        let visitor = RelationVisitor::new();
        let mut ctx = TraversalContext::default();
        let mut guard = ContextGuard::new(&visitor, &mut ctx);
        let root = person(Some("a"), "A").with_relationship(RelationshipData::link(
            "KNOWS",
            Direction::Both,
            RelationshipMode::PersistOnly,
            "Person",
            "b",
        ));
        let plan = plan_write(WriteMode::Merge, root, &[], &mut guard).unwrap();
        assert_eq!(kinds(&plan), vec!["merge_node", "merge_edge", "merge_edge"]);
    }
}
