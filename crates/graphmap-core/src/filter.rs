//! WHERE-clause composition.
//!
//! A [`Filter`] tree compiles to a Cypher fragment with positional
//! parameters (`$f0`, `$f1`, ...) and can also be evaluated directly
//! against a property map, which is how the in-memory backend applies it.

use std::cmp::Ordering;

use crate::statement::quote_ident;
use crate::types::{Params, Properties, Value};

/// Comparison operators supported in filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    StartsWith,
    EndsWith,
    In,
    Between,
    IsNull,
    IsNotNull,
}

impl Operator {
    fn symbol(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Contains => "CONTAINS",
            Operator::StartsWith => "STARTS WITH",
            Operator::EndsWith => "ENDS WITH",
            Operator::In => "IN",
            Operator::Between => "BETWEEN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }
}

/// A filter expression over one node's properties.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Condition {
        property: String,
        operator: Operator,
        values: Vec<Value>,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

/// Compiled WHERE fragment (without the `WHERE` keyword).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WhereClause {
    pub clause: String,
    pub params: Params,
}

impl Filter {
    fn condition(property: &str, operator: Operator, values: Vec<Value>) -> Self {
        Filter::Condition {
            property: property.to_string(),
            operator,
            values,
        }
    }

    pub fn eq(property: &str, value: impl Into<Value>) -> Self {
        Self::condition(property, Operator::Eq, vec![value.into()])
    }

    pub fn ne(property: &str, value: impl Into<Value>) -> Self {
        Self::condition(property, Operator::Ne, vec![value.into()])
    }

    pub fn lt(property: &str, value: impl Into<Value>) -> Self {
        Self::condition(property, Operator::Lt, vec![value.into()])
    }

    pub fn le(property: &str, value: impl Into<Value>) -> Self {
        Self::condition(property, Operator::Le, vec![value.into()])
    }

    pub fn gt(property: &str, value: impl Into<Value>) -> Self {
        Self::condition(property, Operator::Gt, vec![value.into()])
    }

    pub fn ge(property: &str, value: impl Into<Value>) -> Self {
        Self::condition(property, Operator::Ge, vec![value.into()])
    }

    pub fn contains(property: &str, value: impl Into<Value>) -> Self {
        Self::condition(property, Operator::Contains, vec![value.into()])
    }

    pub fn starts_with(property: &str, value: impl Into<Value>) -> Self {
        Self::condition(property, Operator::StartsWith, vec![value.into()])
    }

    pub fn ends_with(property: &str, value: impl Into<Value>) -> Self {
        Self::condition(property, Operator::EndsWith, vec![value.into()])
    }

    pub fn is_in<V: Into<Value>>(property: &str, values: Vec<V>) -> Self {
        Self::condition(property, Operator::In, vec![Value::from(values)])
    }

    /// Inclusive range.
    pub fn between(property: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::condition(property, Operator::Between, vec![low.into(), high.into()])
    }

    pub fn is_null(property: &str) -> Self {
        Self::condition(property, Operator::IsNull, Vec::new())
    }

    pub fn is_not_null(property: &str) -> Self {
        Self::condition(property, Operator::IsNotNull, Vec::new())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    /// Compile against the node bound to `alias`.
    pub fn to_cypher(&self, alias: &str) -> WhereClause {
        let mut params = Params::new();
        let mut counter = 0usize;
        let clause = self.compile(alias, &mut params, &mut counter);
        WhereClause { clause, params }
    }

    fn compile(&self, alias: &str, params: &mut Params, counter: &mut usize) -> String {
        match self {
            Filter::Condition {
                property,
                operator,
                values,
            } => {
                let target = format!("{alias}.{}", quote_ident(property));
                match operator {
                    Operator::IsNull | Operator::IsNotNull => {
                        format!("{target} {}", operator.symbol())
                    }
                    Operator::Between => {
                        let low = bind(values.first().unwrap_or(&Value::Null), params, counter);
                        let high = bind(values.get(1).unwrap_or(&Value::Null), params, counter);
                        format!("({target} >= {low} AND {target} <= {high})")
                    }
                    op => {
                        let param = bind(values.first().unwrap_or(&Value::Null), params, counter);
                        format!("{target} {} {param}", op.symbol())
                    }
                }
            }
            Filter::And(parts) => join(parts, "AND", "true", alias, params, counter),
            Filter::Or(parts) => join(parts, "OR", "false", alias, params, counter),
        }
    }

    /// Evaluate against a property map with Cypher null semantics:
    /// any comparison involving a missing or null property is false.
    pub fn matches(&self, properties: &Properties) -> bool {
        match self {
            Filter::And(parts) => parts.iter().all(|p| p.matches(properties)),
            Filter::Or(parts) => parts.iter().any(|p| p.matches(properties)),
            Filter::Condition {
                property,
                operator,
                values,
            } => {
                let actual = properties.get(property).filter(|v| !v.is_null());
                match (operator, actual) {
                    (Operator::IsNull, actual) => actual.is_none(),
                    (Operator::IsNotNull, actual) => actual.is_some(),
                    (_, None) => false,
                    (op, Some(actual)) => evaluate(*op, actual, values),
                }
            }
        }
    }
}

fn bind(value: &Value, params: &mut Params, counter: &mut usize) -> String {
    let name = format!("f{counter}");
    *counter += 1;
    params.insert(name.clone(), value.clone());
    format!("${name}")
}

fn join(
    parts: &[Filter],
    keyword: &str,
    empty: &str,
    alias: &str,
    params: &mut Params,
    counter: &mut usize,
) -> String {
    match parts.len() {
        0 => empty.to_string(),
        1 => parts[0].compile(alias, params, counter),
        _ => {
            let compiled: Vec<String> = parts
                .iter()
                .map(|p| p.compile(alias, params, counter))
                .collect();
            format!("({})", compiled.join(&format!(" {keyword} ")))
        }
    }
}

fn evaluate(operator: Operator, actual: &Value, values: &[Value]) -> bool {
    let first = values.first().unwrap_or(&Value::Null);
    let ord = || actual.compare(first);
    match operator {
        Operator::Eq => ord() == Some(Ordering::Equal) || actual == first,
        Operator::Ne => !first.is_null() && !(ord() == Some(Ordering::Equal) || actual == first),
        Operator::Lt => ord() == Some(Ordering::Less),
        Operator::Le => matches!(ord(), Some(Ordering::Less | Ordering::Equal)),
        Operator::Gt => ord() == Some(Ordering::Greater),
        Operator::Ge => matches!(ord(), Some(Ordering::Greater | Ordering::Equal)),
        Operator::Contains => str_pair(actual, first).is_some_and(|(a, b)| a.contains(b)),
        Operator::StartsWith => str_pair(actual, first).is_some_and(|(a, b)| a.starts_with(b)),
        Operator::EndsWith => str_pair(actual, first).is_some_and(|(a, b)| a.ends_with(b)),
        Operator::In => match first {
            Value::List(items) => items
                .iter()
                .any(|item| item == actual || actual.compare(item) == Some(Ordering::Equal)),
            _ => false,
        },
        Operator::Between => {
            let high = values.get(1).unwrap_or(&Value::Null);
            matches!(actual.compare(first), Some(Ordering::Greater | Ordering::Equal))
                && matches!(actual.compare(high), Some(Ordering::Less | Ordering::Equal))
        }
        Operator::IsNull | Operator::IsNotNull => false,
    }
}

fn str_pair<'a>(a: &'a Value, b: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((a.as_str()?, b.as_str()?))
}

/// Fluent builder: top-level conditions are AND-ed; nested groups via
/// [`any`](Self::any) / [`all`](Self::all).
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    parts: Vec<Filter>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: Filter) -> Self {
        self.parts.push(filter);
        self
    }

    pub fn eq(self, property: &str, value: impl Into<Value>) -> Self {
        self.with(Filter::eq(property, value))
    }

    pub fn ne(self, property: &str, value: impl Into<Value>) -> Self {
        self.with(Filter::ne(property, value))
    }

    pub fn lt(self, property: &str, value: impl Into<Value>) -> Self {
        self.with(Filter::lt(property, value))
    }

    pub fn le(self, property: &str, value: impl Into<Value>) -> Self {
        self.with(Filter::le(property, value))
    }

    pub fn gt(self, property: &str, value: impl Into<Value>) -> Self {
        self.with(Filter::gt(property, value))
    }

    pub fn ge(self, property: &str, value: impl Into<Value>) -> Self {
        self.with(Filter::ge(property, value))
    }

    pub fn contains(self, property: &str, value: impl Into<Value>) -> Self {
        self.with(Filter::contains(property, value))
    }

    pub fn starts_with(self, property: &str, value: impl Into<Value>) -> Self {
        self.with(Filter::starts_with(property, value))
    }

    pub fn ends_with(self, property: &str, value: impl Into<Value>) -> Self {
        self.with(Filter::ends_with(property, value))
    }

    pub fn is_in<V: Into<Value>>(self, property: &str, values: Vec<V>) -> Self {
        self.with(Filter::is_in(property, values))
    }

    pub fn between(self, property: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.with(Filter::between(property, low, high))
    }

    pub fn is_null(self, property: &str) -> Self {
        self.with(Filter::is_null(property))
    }

    pub fn is_not_null(self, property: &str) -> Self {
        self.with(Filter::is_not_null(property))
    }

    /// Nested group whose conditions are OR-ed.
    pub fn any(self, group: impl FnOnce(FilterBuilder) -> FilterBuilder) -> Self {
        let parts = group(FilterBuilder::new()).parts;
        self.with(Filter::Or(parts))
    }

    /// Nested group whose conditions are AND-ed.
    pub fn all(self, group: impl FnOnce(FilterBuilder) -> FilterBuilder) -> Self {
        let parts = group(FilterBuilder::new()).parts;
        self.with(Filter::And(parts))
    }

    pub fn build(self) -> Filter {
        Filter::And(self.parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, Value)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_compile_nested_groups() {
        let filter = FilterBuilder::new()
            .eq("name", "Tester")
            .any(|g| g.gt("age", 30).is_null("age"))
            .build();
        let compiled = filter.to_cypher("n");
        assert_eq!(
            compiled.clause,
            "(n.`name` = $f0 AND (n.`age` > $f1 OR n.`age` IS NULL))"
        );
        assert_eq!(compiled.params["f0"], Value::from("Tester"));
        assert_eq!(compiled.params["f1"], Value::Int(30));
    }

    #[test]
    fn test_compile_string_operators_and_between() {
        let filter = Filter::starts_with("name", "Te")
            .and(Filter::ends_with("name", "er"))
            .and(Filter::contains("name", "st"))
            .and(Filter::between("age", 18, 65))
            .and(Filter::is_in("role", vec!["admin", "ops"]));
        let compiled = filter.to_cypher("n");
        assert_eq!(
            compiled.clause,
            "(n.`name` STARTS WITH $f0 AND n.`name` ENDS WITH $f1 AND n.`name` CONTAINS $f2 \
             AND (n.`age` >= $f3 AND n.`age` <= $f4) AND n.`role` IN $f5)"
        );
        assert_eq!(compiled.params.len(), 6);
    }

    #[test]
    fn test_empty_groups() {
        assert_eq!(FilterBuilder::new().build().to_cypher("n").clause, "true");
        assert_eq!(Filter::Or(vec![]).to_cypher("n").clause, "false");
    }

    #[test]
    fn test_matches_null_semantics() {
        let p = props(&[("name", Value::from("Tester")), ("age", Value::Null)]);
        assert!(Filter::is_null("age").matches(&p));
        assert!(Filter::is_null("missing").matches(&p));
        assert!(!Filter::gt("age", 1).matches(&p));
        assert!(!Filter::ne("age", 1).matches(&p));
        assert!(Filter::ne("name", "Other").matches(&p));
    }

    #[test]
    fn test_matches_operators() {
        let p = props(&[("name", Value::from("Tester")), ("age", Value::Int(40))]);
        assert!(Filter::eq("age", 40.0).matches(&p));
        assert!(Filter::between("age", 40, 41).matches(&p));
        assert!(!Filter::between("age", 41, 50).matches(&p));
        assert!(Filter::is_in("age", vec![1, 40]).matches(&p));
        assert!(Filter::contains("name", "ste").matches(&p));
        assert!(!Filter::contains("age", "4").matches(&p));
        let either = Filter::eq("name", "x").or(Filter::le("age", 40));
        assert!(either.matches(&p));
    }
}
