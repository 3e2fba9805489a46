//! graphmap-core: backend-independent pieces of the graphmap object-graph mapper.
//!
//! This crate provides everything the repositories need that does not talk to
//! a graph:
//! - Value model and result rows
//! - Write-side transfer structures and the per-type mapper contract
//! - Traversal context and both relation visitor forms
//! - Cypher statement templates, filters, paging and the write planner
//! - Error taxonomy, driver error translation and configuration

pub mod config;
pub mod entity;
pub mod error;
pub mod filter;
pub mod guard;
pub mod mapper;
pub mod paging;
pub mod plan;
pub mod statement;
pub mod thread_visitor;
pub mod translate;
pub mod traversal;
pub mod types;
pub mod visitor;

pub use config::{MappingSettings, Neo4jSettings, Settings};
pub use entity::{
    Direction, EntityWithRelations, RelationshipData, RelationshipDescriptor, RelationshipMode,
};
pub use error::{DriverError, MappingError, RepositoryError, Result};
pub use filter::{Filter, FilterBuilder, Operator};
pub use guard::{ContextGuard, TraversalGuard};
pub use mapper::{AnyEntity, AnyMapper, EntityMapper, MapperRegistry, NodeRecord, NodeRecordMapper, RelatedEntities};
pub use paging::{FindOptions, Page, Sort, SortDirection};
pub use statement::Statement;
pub use thread_visitor::{ContextScope, ThreadBoundVisitor};
pub use traversal::{TraversalContext, TraversalStats};
pub use types::{FromValue, NodeValue, Params, Properties, Row, Value};
pub use visitor::{RelationVisitor, VisitDecision};
