//! Pagination and ordering fragments.

use std::cmp::Ordering;

use crate::filter::Filter;
use crate::statement::{self, quote_ident, Statement};
use crate::types::Properties;

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub index: u32,
    pub size: u32,
}

impl Page {
    pub fn new(index: u32, size: u32) -> Self {
        Self { index, size }
    }

    pub fn skip(&self) -> i64 {
        i64::from(self.index) * i64::from(self.size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub property: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(property: &str) -> Self {
        Self {
            property: property.to_string(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(property: &str) -> Self {
        Self {
            property: property.to_string(),
            direction: SortDirection::Descending,
        }
    }

    /// Parse `prop` or `prop:asc` / `prop:desc`.
    pub fn parse(spec: &str) -> Option<Self> {
        let (property, direction) = match spec.split_once(':') {
            Some((p, d)) => (p, d),
            None => (spec, "asc"),
        };
        if property.is_empty() {
            return None;
        }
        match direction.to_ascii_lowercase().as_str() {
            "asc" => Some(Self::asc(property)),
            "desc" => Some(Self::desc(property)),
            _ => None,
        }
    }
}

/// Filter, ordering and window for a `find_all`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub filter: Option<Filter>,
    pub sort: Vec<Sort>,
    pub page: Option<Page>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Append an ORDER BY key.
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    pub fn statement(&self, label: &str) -> Statement {
        statement::find_all(label, self.filter.as_ref(), &self.sort, self.page)
    }
}

/// ` ORDER BY a.x ASC, a.y DESC`, or empty when there are no keys.
pub fn order_by_clause(alias: &str, sort: &[Sort]) -> String {
    if sort.is_empty() {
        return String::new();
    }
    let keys: Vec<String> = sort
        .iter()
        .map(|s| {
            let dir = match s.direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            };
            format!("{alias}.{} {dir}", quote_ident(&s.property))
        })
        .collect();
    format!(" ORDER BY {}", keys.join(", "))
}

/// Compare two property maps by `sort`; nulls sort last ascending and
/// first descending, as the server orders them.
pub fn compare_properties(sort: &[Sort], a: &Properties, b: &Properties) -> Ordering {
    for key in sort {
        let va = a.get(&key.property).filter(|v| !v.is_null());
        let vb = b.get(&key.property).filter(|v| !v.is_null());
        let ord = match (va, vb) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
        };
        let ord = match key.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
