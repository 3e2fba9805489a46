//! Backend-independent value model for statement parameters and result rows.
//!
//! Backends convert their wire types into these values so that mappers,
//! the traversal engine and the test backend never see driver types.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::MappingError;

/// Named statement parameters.
pub type Params = BTreeMap<String, Value>;

/// Persisted node properties (name → scalar).
pub type Properties = BTreeMap<String, Value>;

// ── Value ────────────────────────────────────────────────────────

/// A single graph value: scalar, collection, or node.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Node(NodeValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Short type name used in mapping error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Node(_) => "node",
        }
    }

    /// Render an identifier value as the string used in persisted-key sets.
    pub fn key_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => "null".to_string(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }

    /// Ordering between comparable values; numbers compare across int/float.
    /// Returns `None` for incomparable pairs (including anything vs null).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Convert to JSON for display and CLI output.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::String(v.to_rfc3339())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl From<NodeValue> for Value {
    fn from(v: NodeValue) -> Self {
        Value::Node(v)
    }
}

// ── Nodes ────────────────────────────────────────────────────────

/// A node as returned in a result row.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NodeValue {
    /// Backend-internal node id, when the backend exposes one.
    pub element_id: Option<i64>,
    pub labels: Vec<String>,
    pub properties: Properties,
}

impl NodeValue {
    pub fn new(label: &str, properties: Properties) -> Self {
        Self {
            element_id: None,
            labels: vec![label.to_string()],
            properties,
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Typed property access; a missing property is read as `Null`.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, MappingError> {
        let value = self.properties.get(name).unwrap_or(&Value::Null);
        T::from_value(value).map_err(|e| e.for_field(name))
    }
}

// ── Rows ─────────────────────────────────────────────────────────

/// One result row: ordered column name → value pairs.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.columns.iter_mut().find(|(c, _)| c == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column.to_string(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    /// Typed column access; a missing column is an error.
    pub fn get_as<T: FromValue>(&self, column: &str) -> Result<T, MappingError> {
        let value = self
            .get(column)
            .ok_or_else(|| MappingError::MissingColumn(column.to_string()))?;
        T::from_value(value).map_err(|e| e.for_field(column))
    }

    /// The node bound to `alias`.
    pub fn node(&self, alias: &str) -> Result<&NodeValue, MappingError> {
        match self.get(alias) {
            Some(Value::Node(node)) => Ok(node),
            Some(other) => Err(MappingError::TypeMismatch {
                field: alias.to_string(),
                expected: "node",
                found: other.type_name(),
            }),
            None => Err(MappingError::MissingColumn(alias.to_string())),
        }
    }

    /// The first column's value, if any.
    pub fn first(&self) -> Option<&Value> {
        self.columns.first().map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.columns
                .iter()
                .map(|(c, v)| (c.clone(), v.to_json()))
                .collect(),
        )
    }
}

// ── Typed extraction ─────────────────────────────────────────────

/// Conversion from a graph [`Value`] into a Rust type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, MappingError>;
}

fn mismatch(expected: &'static str, value: &Value) -> MappingError {
    MappingError::TypeMismatch {
        field: String::new(),
        expected,
        found: value.type_name(),
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, MappingError> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, MappingError> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, MappingError> {
        match value {
            Value::Int(i) => Ok(*i),
            other => Err(mismatch("int", other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, MappingError> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => Err(mismatch("float", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, MappingError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(mismatch("string", other)),
        }
    }
}

impl FromValue for NodeValue {
    fn from_value(value: &Value) -> Result<Self, MappingError> {
        match value {
            Value::Node(n) => Ok(n.clone()),
            other => Err(mismatch("node", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, MappingError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, MappingError> {
        match value {
            Value::List(items) => items.iter().map(T::from_value).collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(mismatch("list", other)),
        }
    }
}
