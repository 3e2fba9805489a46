//! graphmap-graph: everything that talks to a graph.
//!
//! Backends execute templated statements inside transactions; the
//! coordinators decide which transaction an operation runs in; the
//! repositories map entities to nodes and walk their relationships.
//!
//! - [`GraphClient`]: Neo4j over neo4rs
//! - [`MemoryGraph`]: in-process property graph with snapshot transactions
//! - [`AsyncRepository`] / [`blocking::BlockingRepository`]

pub mod backend;
pub mod blocking;
pub mod client;
mod loader;
pub mod memory;
pub mod repository;
pub mod transaction;

pub use backend::{BlockingBackend, BlockingTransaction, GraphBackend, GraphTransaction};
pub use client::{GraphClient, GraphConfig, GraphError, Neo4jTransaction};
pub use memory::{MemoryGraph, MemoryTransaction, RawHandler, TxCounters};
pub use repository::AsyncRepository;
pub use transaction::{TransactionCoordinator, TxHandle};
