//! AsyncRepository against the in-memory backend.

mod support;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;

use graphmap_core::config::MappingSettings;
use graphmap_core::error::{DriverError, RepositoryError};
use graphmap_core::filter::Filter;
use graphmap_core::paging::{FindOptions, Page, Sort};
use graphmap_core::statement::Statement;
use graphmap_core::types::{NodeValue, Params, Row, Value};
use graphmap_graph::{AsyncRepository, MemoryGraph, TransactionCoordinator};

use support::{person_node, props, registry, Company, Person, PersonMapper};

type Repo = AsyncRepository<MemoryGraph, PersonMapper>;

fn repo_with(graph: &MemoryGraph, settings: MappingSettings) -> Repo {
    AsyncRepository::new(
        TransactionCoordinator::new(Arc::new(graph.clone())),
        registry(),
        Arc::new(PersonMapper::new()),
        settings,
    )
}

fn repo(graph: &MemoryGraph) -> Repo {
    repo_with(graph, MappingSettings::default())
}

fn id(value: &str) -> Value {
    Value::from(value)
}

/// p0 -KNOWS-> p1 -KNOWS-> ... -KNOWS-> p{len-1}
fn seed_chain(graph: &MemoryGraph, len: usize) {
    for i in 0..len {
        graph.add_node("Person", person_node(&format!("p{i}"), &format!("P{i}")));
    }
    for i in 1..len {
        graph.add_edge(
            ("Person", &id(&format!("p{}", i - 1))),
            "KNOWS",
            ("Person", &id(&format!("p{i}"))),
        );
    }
}

/// p{i} works at c{i} ("Company {i}") for three people.
fn seed_employers(graph: &MemoryGraph) {
    for i in 0..3 {
        let (pid, cid) = (format!("p{i}"), format!("c{i}"));
        graph.add_node("Person", person_node(&pid, &format!("P{i}")));
        graph.add_node(
            "Company",
            props(&[("id", id(&cid)), ("name", id(&format!("Company {i}")))]),
        );
        graph.add_edge(("Person", &id(&pid)), "WORKS_AT", ("Company", &id(&cid)));
    }
}

fn assert_own_employers(people: &[Person]) {
    assert_eq!(people.len(), 3);
    for person in people {
        let n = person.id.as_deref().unwrap().trim_start_matches('p');
        let expected = format!("Company {n}");
        assert_eq!(person.employer.as_ref().unwrap().name, expected);
        assert_eq!(person.employer_name.as_deref(), Some(expected.as_str()));
    }
}

fn seed_cycle(graph: &MemoryGraph) {
    graph.add_node("Person", person_node("a", "A"));
    graph.add_node("Person", person_node("b", "B"));
    graph.add_edge(("Person", &id("a")), "KNOWS", ("Person", &id("b")));
    graph.add_edge(("Person", &id("b")), "KNOWS", ("Person", &id("a")));
}

// ── Round trip ───────────────────────────────────────────────────

#[tokio::test]
async fn test_create_then_find_round_trip() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);

    let saved = repo.create(&Person::new("Tester")).await.unwrap();
    let new_id = saved.id.clone().expect("identifier assigned");
    assert_eq!(saved.name, "Tester");

    let found = repo.find_by_id(new_id.as_str()).await.unwrap().unwrap();
    assert_eq!(found.name, "Tester");
    assert_eq!(found.id.as_deref(), Some(new_id.as_str()));
    assert_eq!(graph.node_count("Person"), 1);
    assert_eq!(graph.counters().committed, 2);
}

#[tokio::test]
async fn test_post_load_converter_runs_on_every_path() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);

    let saved = repo
        .create(&Person::with_id("t", "Tagged").tagged("rust, graphs,"))
        .await
        .unwrap();
    assert_eq!(saved.tags, vec!["rust", "graphs"]);

    let found = repo.get_by_id("t").await.unwrap();
    assert_eq!(found.tags, vec!["rust", "graphs"]);
    assert_eq!(found.raw_tags.as_deref(), Some("rust, graphs,"));
}

#[tokio::test]
async fn test_missing_entity() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);

    assert!(repo.find_by_id("nope").await.unwrap().is_none());
    assert!(repo.get_by_id("nope").await.unwrap_err().is_not_found());

    let err = repo.update(&Person::with_id("nope", "Ghost")).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(graph.node_count("Person"), 0);
}

// ── Read cascade ─────────────────────────────────────────────────

#[tokio::test]
async fn test_cycle_terminates() {
    let graph = MemoryGraph::new();
    seed_cycle(&graph);
    let repo = repo(&graph);

    let mut ctx = repo.new_context();
    let a = repo.find_by_id_with_context("a", &mut ctx).await.unwrap().unwrap();

    assert_eq!(a.friends.len(), 1);
    let b = &a.friends[0];
    assert_eq!(b.name, "B");
    assert_eq!(b.friends.len(), 1);
    assert_eq!(b.friends[0].name, "A");
    assert!(b.friends[0].friends.is_empty());

    assert_eq!(ctx.stats.entities_visited, 2);
    assert_eq!(ctx.stats.circular_references_prevented, 1);
}

#[tokio::test]
async fn test_field_depth_bounds_cascade() {
    let graph = MemoryGraph::new();
    seed_chain(&graph, 6);
    let repo = repo(&graph);

    let p0 = repo.get_by_id("p0").await.unwrap();
    let p1 = &p0.friends[0];
    let p2 = &p1.friends[0];
    let p3 = &p2.friends[0];
    assert_eq!(p3.name, "P3");
    assert!(p3.friends.is_empty());
}

#[tokio::test]
async fn test_global_depth_bounds_cascade() {
    let graph = MemoryGraph::new();
    seed_chain(&graph, 4);
    let repo = repo_with(
        &graph,
        MappingSettings {
            max_depth: 1,
            default_field_max_depth: -1,
        },
    );

    let mut ctx = repo.new_context();
    let p0 = repo.find_by_id_with_context("p0", &mut ctx).await.unwrap().unwrap();
    let p2 = &p0.friends[0].friends[0];
    assert_eq!(p2.name, "P2");
    assert!(p2.friends.is_empty());
    assert!(ctx.stats.depth_limit_hits >= 1);
}

#[tokio::test]
async fn test_per_field_depth_limits_employer_to_root() {
    let graph = MemoryGraph::new();
    graph.add_node("Person", person_node("a", "A"));
    graph.add_node("Person", person_node("b", "B"));
    graph.add_node("Company", props(&[("id", id("acme")), ("name", id("Acme"))]));
    graph.add_edge(("Person", &id("a")), "KNOWS", ("Person", &id("b")));
    graph.add_edge(("Person", &id("a")), "WORKS_AT", ("Company", &id("acme")));
    graph.add_edge(("Person", &id("b")), "WORKS_AT", ("Company", &id("acme")));
    let repo = repo(&graph);

    let a = repo.get_by_id("a").await.unwrap();
    assert_eq!(a.employer, Some(Company::with_id("acme", "Acme")));
    assert_eq!(a.friends[0].name, "B");
    assert!(a.friends[0].employer.is_none());
}

#[tokio::test]
async fn test_context_hand_off_shares_visited_set() {
    let graph = MemoryGraph::new();
    seed_cycle(&graph);
    let repo = repo(&graph);

    let mut ctx = repo.new_context();
    repo.find_by_id_with_context("a", &mut ctx).await.unwrap();
    // b was reached through a's cascade, so it comes back shallow
    let b = repo.find_by_id_with_context("b", &mut ctx).await.unwrap().unwrap();
    assert!(b.friends.is_empty());

    let fresh = repo.get_by_id("b").await.unwrap();
    assert_eq!(fresh.friends.len(), 1);
}

#[tokio::test]
async fn test_fetch_only_field_is_read() {
    let graph = MemoryGraph::new();
    graph.add_node("Person", person_node("a", "A"));
    graph.add_node("Person", person_node("f", "F"));
    graph.add_edge(("Person", &id("f")), "FOLLOWS", ("Person", &id("a")));
    let repo = repo(&graph);

    let a = repo.get_by_id("a").await.unwrap();
    assert_eq!(a.followers.len(), 1);
    assert_eq!(a.followers[0].name, "F");
}

// ── Write cascade ────────────────────────────────────────────────

#[tokio::test]
async fn test_create_cascades_nested_targets() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);

    let root = Person::new("Root")
        .knows(Person::new("Friend"))
        .works_at(Company::with_id("acme", "Acme"));
    let saved = repo.create(&root).await.unwrap();
    let root_id = saved.id.unwrap();

    assert_eq!(graph.node_count("Person"), 2);
    assert_eq!(graph.node_count("Company"), 1);
    assert!(graph.has_edge(("Person", &id(&root_id)), "WORKS_AT", ("Company", &id("acme"))));

    let found = repo.get_by_id(root_id.as_str()).await.unwrap();
    assert_eq!(found.friend_names(), vec!["Friend"]);
    assert!(found.friends[0].id.is_some());
}

#[tokio::test]
async fn test_shared_target_written_once() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);

    let shared = Person::with_id("c", "C");
    let root = Person::with_id("r", "R")
        .knows(Person::with_id("a", "A").knows(shared.clone()))
        .knows(Person::with_id("b", "B").knows(shared));
    repo.create(&root).await.unwrap();

    let c_writes = graph
        .executed()
        .iter()
        .filter(|s| s.kind() == "merge_node" && s.params.get("id") == Some(&id("c")))
        .count();
    assert_eq!(c_writes, 1);
    assert_eq!(graph.node_count("Person"), 4);
    assert_eq!(graph.edge_count("KNOWS"), 4);
    assert!(graph.has_edge(("Person", &id("a")), "KNOWS", ("Person", &id("c"))));
    assert!(graph.has_edge(("Person", &id("b")), "KNOWS", ("Person", &id("c"))));
}

#[tokio::test]
async fn test_mutual_reference_persists_both_edges() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);

    let a = Person::with_id("a", "A").knows(Person::with_id("b", "B").knows(Person::with_id("a", "A")));
    repo.create(&a).await.unwrap();

    assert_eq!(graph.node_count("Person"), 2);
    assert_eq!(graph.edge_count("KNOWS"), 2);
    assert!(graph.has_edge(("Person", &id("a")), "KNOWS", ("Person", &id("b"))));
    assert!(graph.has_edge(("Person", &id("b")), "KNOWS", ("Person", &id("a"))));
}

#[tokio::test]
async fn test_edges_merge_after_all_nodes() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);

    let root = Person::with_id("a", "A").knows(Person::with_id("b", "B").knows(Person::new("C")));
    repo.create(&root).await.unwrap();

    let kinds = graph.executed_kinds();
    let first_edge = kinds.iter().position(|k| *k == "merge_edge").unwrap();
    let last_node = kinds
        .iter()
        .rposition(|k| matches!(*k, "create_node" | "merge_node"))
        .unwrap();
    assert!(last_node < first_edge);
}

#[tokio::test]
async fn test_fetch_only_field_never_written() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);

    let a = Person::with_id("a", "A").followed_by(Person::with_id("f", "F"));
    repo.create(&a).await.unwrap();

    assert!(!graph.executed_kinds().contains(&"merge_edge"));
    assert_eq!(graph.edge_count("FOLLOWS"), 0);
    assert_eq!(graph.node_count("Person"), 1);
}

#[tokio::test]
async fn test_update_replaces_relationship_set() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);

    let b = Person::with_id("b", "B");
    let c = Person::with_id("c", "C");
    repo.create(&Person::with_id("a", "A").knows(b.clone()).knows(c))
        .await
        .unwrap();
    assert_eq!(graph.edge_count("KNOWS"), 2);

    repo.update(&Person::with_id("a", "A").knows(b)).await.unwrap();

    let a = repo.get_by_id("a").await.unwrap();
    assert_eq!(a.friend_names(), vec!["B"]);
    assert_eq!(graph.edge_count("KNOWS"), 1);
    assert_eq!(graph.node_count("Person"), 3);
}

#[tokio::test]
async fn test_merge_creates_then_updates() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);

    let mut p = Person::with_id("m", "First");
    p.age = Some(30);
    repo.merge(&p).await.unwrap();
    p.name = "Second".into();
    p.age = None;
    let merged = repo.merge(&p).await.unwrap();

    assert_eq!(merged.name, "Second");
    assert_eq!(merged.age, None);
    assert_eq!(graph.node_count("Person"), 1);
}

#[tokio::test]
async fn test_update_without_identifier_is_rejected() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);

    let err = repo.update(&Person::new("Anonymous")).await.unwrap_err();
    assert!(err.to_string().contains("identifier"));
    assert_eq!(graph.counters().begun, 0);
}

// ── Atomicity and translation ────────────────────────────────────

#[tokio::test]
async fn test_failed_edge_merge_rolls_back_whole_write() {
    let graph = MemoryGraph::new();
    graph.fail_on("merge_edge", None, "disk full");
    let repo = repo(&graph);

    let err = repo
        .create(&Person::with_id("a", "A").knows(Person::with_id("b", "B")))
        .await
        .unwrap_err();

    assert!(matches!(err, RepositoryError::Repository { .. }));
    assert!(err.to_string().contains("disk full"));
    assert_eq!(graph.node_count("Person"), 0);
    assert_eq!(graph.counters().rolled_back, 1);
    assert_eq!(graph.counters().committed, 0);
}

#[tokio::test]
async fn test_driver_failures_are_classified() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);

    graph.fail_on(
        "create_node",
        Some("Neo.ClientError.Schema.ConstraintValidationFailed"),
        "Node already exists",
    );
    let err = repo.create(&Person::new("Dup")).await.unwrap_err();
    assert!(matches!(err, RepositoryError::ConstraintViolation { .. }));
    assert_eq!(err.context(), "create Person");

    graph.clear_failures();
    graph.fail_on(
        "find_by_id",
        Some("Neo.TransientError.Transaction.DeadlockDetected"),
        "deadlock",
    );
    let err = repo.find_by_id("x").await.unwrap_err();
    assert!(err.is_retryable());

    graph.clear_failures();
    graph.fail_on("begin", None, "The client is unauthorized due to authentication failure.");
    let err = repo.count(None).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Unauthorized { .. }));
}

// ── Transactions ─────────────────────────────────────────────────

#[tokio::test]
async fn test_run_in_transaction_commits_together() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);
    let coordinator = repo.coordinator().clone();

    coordinator
        .run_in_transaction(|| async {
            repo.create(&Person::with_id("a", "A")).await?;
            repo.create(&Person::with_id("b", "B")).await?;
            // reads inside the scope see the scope's own writes
            assert_eq!(repo.count(None).await?, 2);
            Ok::<_, RepositoryError>(())
        })
        .await
        .unwrap();

    assert_eq!(graph.node_count("Person"), 2);
    assert_eq!(graph.counters().begun, 1);
    assert_eq!(graph.counters().committed, 1);
}

#[tokio::test]
async fn test_run_in_transaction_rolls_back_together() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);
    let coordinator = repo.coordinator().clone();

    let result = coordinator
        .run_in_transaction(|| async {
            repo.create(&Person::with_id("a", "A")).await?;
            repo.update(&Person::with_id("missing", "M")).await?;
            Ok::<_, RepositoryError>(())
        })
        .await;

    assert!(result.unwrap_err().is_not_found());
    assert_eq!(graph.node_count("Person"), 0);
    assert_eq!(graph.counters().rolled_back, 1);
}

#[tokio::test]
async fn test_swallowed_write_failure_rolls_back_scope() {
    let graph = MemoryGraph::new();
    graph.fail_on("merge_edge", None, "disk full");
    let repo = repo(&graph);
    let coordinator = repo.coordinator().clone();

    let result = coordinator
        .run_in_transaction(|| async {
            let failed = repo
                .create(&Person::with_id("a", "A").knows(Person::with_id("b", "B")))
                .await;
            assert!(failed.is_err());
            Ok::<_, RepositoryError>(())
        })
        .await;

    assert!(result.is_err());
    assert_eq!(graph.node_count("Person"), 0);
    assert_eq!(graph.counters().committed, 0);
    assert_eq!(graph.counters().rolled_back, 1);
}

#[tokio::test]
async fn test_timed_out_create_rolls_back() {
    let graph = MemoryGraph::new();
    graph.stall_on("merge_edge");
    let repo = repo(&graph);

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        repo.create(&Person::with_id("a", "A").knows(Person::with_id("b", "B"))),
    )
    .await;

    assert!(outcome.is_err());
    assert!(graph.executed_kinds().contains(&"merge_edge"));
    assert_eq!(graph.node_count("Person"), 0);
    assert_eq!(graph.counters().committed, 0);
    assert_eq!(graph.counters().rolled_back, 1);
}

// ── Concurrency ──────────────────────────────────────────────────

fn three_people(_: &Statement) -> Result<Vec<Row>, DriverError> {
    Ok((0..3)
        .map(|i| {
            let node = NodeValue::new("Person", person_node(&format!("p{i}"), &format!("P{i}")));
            Row::new().with("n", node)
        })
        .collect())
}

#[tokio::test]
async fn test_derived_fields_follow_their_own_relation() {
    let graph = MemoryGraph::new();
    seed_employers(&graph);
    graph.set_raw_handler(Arc::new(three_people));
    let repo = repo(&graph);

    let people = repo.find_all(FindOptions::new().sort(Sort::asc("name"))).await.unwrap();
    assert_own_employers(&people);

    let people = repo.query("MATCH (n:Person) RETURN n", Params::new()).await.unwrap();
    assert_own_employers(&people);

    let streamed: Vec<_> = repo
        .stream_all(FindOptions::new())
        .await
        .unwrap()
        .map(|p| p.unwrap())
        .collect()
        .await;
    assert_own_employers(&streamed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loads_derive_their_own_values() {
    let graph = MemoryGraph::new();
    seed_employers(&graph);
    let repo = repo(&graph);

    let mut tasks = Vec::new();
    for round in 0..12 {
        let repo = repo.clone();
        tasks.push(tokio::spawn(async move {
            repo.get_by_id(format!("p{}", round % 3)).await.unwrap()
        }));
    }
    let mut people = Vec::new();
    for task in tasks {
        people.push(task.await.unwrap());
    }
    for chunk in people.chunks(3) {
        assert_own_employers(chunk);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_keep_contexts_apart() {
    let graph = MemoryGraph::new();
    seed_cycle(&graph);
    let repo = repo(&graph);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let repo = repo.clone();
        let start = if i % 2 == 0 { "a" } else { "b" };
        tasks.push(tokio::spawn(async move { repo.get_by_id(start).await }));
    }
    for task in tasks {
        let root = task.await.unwrap().unwrap();
        // every traversal sees the full two-node cycle from its own root
        assert_eq!(root.friends.len(), 1);
        assert_eq!(root.friends[0].friends.len(), 1);
        assert_eq!(root.friends[0].friends[0].name, root.name);
        assert!(root.friends[0].friends[0].friends.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_share_a_target() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let repo = repo.clone();
        tasks.push(tokio::spawn(async move {
            repo.create(&Person::new(&format!("P{i}")).knows(Person::with_id("hub", "Hub")))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(graph.node_count("Person"), 9);
    assert_eq!(graph.edge_count("KNOWS"), 8);
}

// ── Collections and streams ──────────────────────────────────────

fn seed_ages(graph: &MemoryGraph) {
    for (i, age) in [25i64, 31, 47, 38, 19].iter().enumerate() {
        let mut node = person_node(&format!("p{i}"), &format!("P{i}"));
        node.insert("age".into(), Value::from(*age));
        graph.add_node("Person", node);
    }
}

#[tokio::test]
async fn test_find_all_filter_sort_page_and_count() {
    let graph = MemoryGraph::new();
    seed_ages(&graph);
    let repo = repo(&graph);

    let adults = Filter::ge("age", 30i64);
    let page = repo
        .find_all(
            FindOptions::new()
                .filter(adults.clone())
                .sort(Sort::desc("age"))
                .page(Page::new(0, 2)),
        )
        .await
        .unwrap();
    let ages: Vec<_> = page.iter().map(|p| p.age).collect();
    assert_eq!(ages, vec![Some(47), Some(38)]);

    assert_eq!(repo.count(Some(&adults)).await.unwrap(), 3);
    assert_eq!(repo.count(None).await.unwrap(), 5);
}

#[tokio::test]
async fn test_stream_all_yields_in_order_and_commits() {
    let graph = MemoryGraph::new();
    seed_ages(&graph);
    let repo = repo(&graph);

    let stream = repo
        .stream_all(FindOptions::new().sort(Sort::asc("age")))
        .await
        .unwrap();
    let people: Vec<_> = stream.collect().await;
    let names: Vec<_> = people.into_iter().map(|p| p.unwrap().name).collect();

    assert_eq!(names, vec!["P4", "P0", "P1", "P3", "P2"]);
    assert_eq!(graph.counters().committed, 1);
}

#[tokio::test]
async fn test_dropped_stream_rolls_back() {
    let graph = MemoryGraph::new();
    seed_ages(&graph);
    let repo = repo(&graph);

    let mut stream = repo.stream_all(FindOptions::new()).await.unwrap();
    assert!(stream.next().await.unwrap().is_ok());
    drop(stream);

    assert_eq!(graph.counters().committed, 0);
    assert_eq!(graph.counters().rolled_back, 1);
}

// ── Exists / delete ──────────────────────────────────────────────

#[tokio::test]
async fn test_exists_and_delete() {
    let graph = MemoryGraph::new();
    let repo = repo(&graph);

    let saved = repo
        .create(&Person::with_id("a", "A").knows(Person::with_id("b", "B")))
        .await
        .unwrap();
    assert!(repo.exists(&saved).await.unwrap());
    assert!(!repo.exists(&Person::new("Unsaved")).await.unwrap());

    assert!(repo.delete(&saved).await.unwrap());
    assert!(!repo.exists_by_id("a").await.unwrap());
    assert!(!repo.delete_by_id("a").await.unwrap());
    assert_eq!(graph.edge_count("KNOWS"), 0);
    assert_eq!(graph.node_count("Person"), 1);

    assert!(repo.delete(&Person::new("Unsaved")).await.is_err());
}

// ── Free-form queries ────────────────────────────────────────────

fn answer_people(stmt: &Statement) -> Result<Vec<Row>, DriverError> {
    let rows = match stmt.cypher.as_str() {
        "none" => Vec::new(),
        "one" => vec![Row::new().with("n", NodeValue::new("Person", person_node("q1", "Q1")))],
        "two" => vec![
            Row::new().with("n", NodeValue::new("Person", person_node("q1", "Q1"))),
            Row::new().with("n", NodeValue::new("Person", person_node("q2", "Q2"))),
        ],
        "scalar" => vec![Row::new().with("total", 42i64)],
        "null" => vec![Row::new().with("total", Value::Null)],
        other => return Err(DriverError::with_code("Neo.ClientError.Statement.SyntaxError", other)),
    };
    Ok(rows)
}

#[tokio::test]
async fn test_free_form_query_surface() {
    let graph = MemoryGraph::new();
    graph.set_raw_handler(Arc::new(answer_people));
    let repo = repo(&graph);

    let people = repo.query("two", Params::new()).await.unwrap();
    assert_eq!(people.len(), 2);

    assert!(repo.query_single("none", Params::new()).await.unwrap().is_none());
    assert_eq!(
        repo.query_single("one", Params::new()).await.unwrap().unwrap().name,
        "Q1"
    );
    assert!(repo.query_single("two", Params::new()).await.is_err());

    assert_eq!(repo.execute_returning("one", Params::new()).await.unwrap().name, "Q1");
    assert!(repo
        .execute_returning("none", Params::new())
        .await
        .unwrap_err()
        .is_not_found());

    assert_eq!(
        repo.query_scalar::<i64>("scalar", Params::new()).await.unwrap(),
        Some(42)
    );
    assert_eq!(repo.query_scalar::<i64>("null", Params::new()).await.unwrap(), None);
    assert!(repo.query_scalar::<String>("scalar", Params::new()).await.is_err());

    repo.execute_query("none", Params::new()).await.unwrap();
    let err = repo.execute_query("MATCH oops", Params::new()).await.unwrap_err();
    assert_eq!(err.context(), "executeQuery Person");
}
