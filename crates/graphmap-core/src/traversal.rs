//! Per-operation traversal state.
//!
//! One [`TraversalContext`] is created for every logical repository
//! operation (including all recursive relationship work it triggers) and
//! dropped when that operation returns. It is never shared between
//! unrelated operations.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::types::Value;

/// Global depth ceiling used when none is configured.
pub const DEFAULT_MAX_DEPTH: i32 = 5;

/// Resolved identity of an entity for cycle detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// `label:id` of a persisted entity.
    Key(String),
    /// Address of an in-memory entity that has no identifier yet.
    ///
    /// Addresses are only stable while the entity stays where it is. When a
    /// loaded child is moved into its parent and its box freed, a later
    /// child without an identifier can reuse the address and be counted in
    /// `circular_references_prevented`.
    Reference(usize),
}

impl Identity {
    pub fn key(label: &str, id: &Value) -> Self {
        Identity::Key(persisted_key(label, id))
    }

    /// Resolve from an optional id, falling back to the entity's address.
    pub fn resolve<T: ?Sized>(label: &str, id: Option<&Value>, entity: &T) -> Self {
        match id {
            Some(id) if !id.is_null() => Identity::key(label, id),
            _ => Identity::Reference(entity as *const T as *const () as usize),
        }
    }
}

/// `label:id` form used for both visited and persisted sets.
pub fn persisted_key(label: &str, id: &Value) -> String {
    format!("{label}:{}", id.key_string())
}

/// Observability counters. Never consulted for correctness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraversalStats {
    pub entities_visited: u64,
    pub circular_references_prevented: u64,
    pub depth_limit_hits: u64,
    pub relationships_loaded: u64,
    pub entities_persisted: u64,
    pub edges_merged: u64,
}

/// One diagnostic path entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathEntry {
    pub entity_type: String,
    pub id: Option<String>,
    pub depth: u32,
}

/// Cycle and depth guard state for one logical operation.
#[derive(Debug, Clone)]
pub struct TraversalContext {
    operation_id: Uuid,
    started_at: DateTime<Utc>,
    max_depth: i32,
    visited_identities: HashSet<String>,
    visited_by_reference: HashSet<usize>,
    persisted_keys: HashSet<String>,
    pub stats: TraversalStats,
    path: Vec<PathEntry>,
}

impl Default for TraversalContext {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl TraversalContext {
    /// A fresh context. A negative `max_depth` means unbounded.
    pub fn new(max_depth: i32) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            started_at: Utc::now(),
            max_depth,
            visited_identities: HashSet::new(),
            visited_by_reference: HashSet::new(),
            persisted_keys: HashSet::new(),
            stats: TraversalStats::default(),
            path: Vec::new(),
        }
    }

    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn max_depth(&self) -> i32 {
        self.max_depth
    }

    /// Whether `depth` is beyond the global ceiling.
    pub fn exceeds_max_depth(&self, depth: u32) -> bool {
        self.max_depth >= 0 && i64::from(depth) > i64::from(self.max_depth)
    }

    pub fn is_visited(&self, identity: &Identity) -> bool {
        match identity {
            Identity::Key(key) => self.visited_identities.contains(key),
            Identity::Reference(addr) => self.visited_by_reference.contains(addr),
        }
    }

    /// Record a visit. Returns false if the identity was already recorded.
    pub fn record_visit(&mut self, identity: &Identity, entity_type: &str, depth: u32) -> bool {
        let inserted = match identity {
            Identity::Key(key) => self.visited_identities.insert(key.clone()),
            Identity::Reference(addr) => self.visited_by_reference.insert(*addr),
        };
        if inserted {
            self.stats.entities_visited += 1;
            self.path.push(PathEntry {
                entity_type: entity_type.to_string(),
                id: match identity {
                    Identity::Key(key) => key.split_once(':').map(|(_, id)| id.to_string()),
                    Identity::Reference(_) => None,
                },
                depth,
            });
        }
        inserted
    }

    pub fn insert_persisted(&mut self, key: String) -> bool {
        let inserted = self.persisted_keys.insert(key);
        if inserted {
            self.stats.entities_persisted += 1;
        }
        inserted
    }

    pub fn contains_persisted(&self, key: &str) -> bool {
        self.persisted_keys.contains(key)
    }

    pub fn path(&self) -> &[PathEntry] {
        &self.path
    }

    pub fn visited_count(&self) -> usize {
        self.visited_identities.len() + self.visited_by_reference.len()
    }

    pub fn persisted_count(&self) -> usize {
        self.persisted_keys.len()
    }
}
