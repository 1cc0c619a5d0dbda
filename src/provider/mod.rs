//! Data Provider Contract
//!
//! The backend that executes compiled queries is external to the search core.
//! This module defines what the core requires of it:
//!
//! - **Values and rows**: scalar cells aligned with the retrieval paths
//! - **Path expressions**: what to retrieve, how to group and order it
//! - **Result sets**: a single-pass row sequence plus the total match count
//! - **Metadata**: the fields of a datatype and their type information
//!
//! # Execution
//!
//! ```text
//! (paths, criteria, limit, offset, aggregate, highlight) → execute → ResultSet
//! ```
//!
//! A provider must reject criteria or paths referencing an unknown datatype or
//! field with a [`ProviderError`], never with a panic.

mod error;
mod loader;
mod memory;

pub use error::{ProviderError, ProviderResult};
pub use loader::{load_dataset, load_json, parse_datetime};
pub use memory::{Dataset, MemoryProvider, Record};

use crate::highlight::Highlight;
use crate::query::Criteria;
use crate::time::{TimeUnit, UserTimezone};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A scalar cell value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    DateTime(DateTime<FixedOffset>),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the value; floats must be integral, text must parse
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            Value::Text(s) => DateTime::parse_from_rfc3339(s).ok(),
            _ => None,
        }
    }

    /// Text used for a drill-down criterion; `None` for null and empty values
    pub fn criterion_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) if s.is_empty() => None,
            Value::DateTime(dt) => Some(dt.to_rfc3339()),
            other => Some(other.to_string()),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::DateTime(_) => 3,
            Value::Text(_) => 4,
        }
    }

    /// Total ordering used for sorting: nulls first, then by type, then by value
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) if a.type_rank() == 2 && b.type_rank() == 2 => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Value::DateTime(dt)
    }
}

/// One result row, aligned with the retrieval path list
pub type Row = Vec<Value>;

/// Sort direction of an ordered path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Only `asc` and `desc` are accepted
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// What a retrieval path selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSource {
    /// Row count of a group
    Count,
    /// A physical field path, e.g. `events.severity`
    Field(String),
    /// A time field truncated to one calendar component in a timezone
    Truncated {
        field: String,
        timezone: UserTimezone,
        unit: TimeUnit,
    },
}

/// A retrieval path with its grouping and ordering annotations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    pub source: PathSource,
    pub group_by: bool,
    pub order: Option<SortOrder>,
}

impl PathExpr {
    fn new(source: PathSource) -> Self {
        Self {
            source,
            group_by: false,
            order: None,
        }
    }

    pub fn count() -> Self {
        Self::new(PathSource::Count)
    }

    pub fn field(path: impl Into<String>) -> Self {
        Self::new(PathSource::Field(path.into()))
    }

    pub fn truncated(field: impl Into<String>, timezone: UserTimezone, unit: TimeUnit) -> Self {
        Self::new(PathSource::Truncated {
            field: field.into(),
            timezone,
            unit,
        })
    }

    /// Builder: mark this path as a grouping key
    pub fn grouped(mut self) -> Self {
        self.group_by = true;
        self
    }

    /// Builder: order results by this path
    pub fn ordered(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }

    /// The physical field this path reads, if any
    pub fn field_path(&self) -> Option<&str> {
        match &self.source {
            PathSource::Count => None,
            PathSource::Field(path) => Some(path),
            PathSource::Truncated { field, .. } => Some(field),
        }
    }
}

impl std::fmt::Display for PathExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            PathSource::Count => f.write_str("count(1)")?,
            PathSource::Field(path) => f.write_str(path)?,
            PathSource::Truncated {
                field,
                timezone,
                unit,
            } => write!(f, "timezone({}, '{}'):{}", field, timezone, unit.db_unit())?,
        }

        let mut annotations = Vec::new();
        if let Some(order) = self.order {
            annotations.push(format!("order_{}", order.as_str()));
        }
        if self.group_by {
            annotations.push("group_by".to_string());
        }

        if !annotations.is_empty() {
            write!(f, "/{}", annotations.join(","))?;
        }
        Ok(())
    }
}

/// Storage type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    DateTime,
    /// Opaque structured value
    Object,
}

/// Metadata of one qualified field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathInfo {
    pub path: String,
    pub field_type: FieldType,
    /// Pure datetime fields are filtered through the time window, not the query
    pub filterable: bool,
    /// Object fields cannot be grouped
    pub groupable: bool,
}

impl PathInfo {
    pub fn new(path: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            path: path.into(),
            field_type,
            filterable: field_type != FieldType::DateTime,
            groupable: field_type != FieldType::Object,
        }
    }
}

/// Everything a provider needs to run one query
#[derive(Debug, Clone, Copy)]
pub struct QueryRequest<'a> {
    pub datatype: &'a str,
    pub paths: &'a [PathExpr],
    pub criteria: &'a Criteria,
    /// `None` means unlimited
    pub limit: Option<usize>,
    pub offset: usize,
    pub aggregate: bool,
    pub highlight: Option<&'a Highlight>,
}

/// Boxed single-pass row iterator
pub type RowIter = Box<dyn Iterator<Item = ProviderResult<Row>> + Send>;

/// A finite, single-pass sequence of rows plus the total number of matches
pub struct ResultSet {
    rows: RowIter,
    total: usize,
}

impl ResultSet {
    pub fn new<I>(rows: I, total: usize) -> Self
    where
        I: Iterator<Item = ProviderResult<Row>> + Send + 'static,
    {
        Self {
            rows: Box::new(rows),
            total,
        }
    }

    pub fn from_rows(rows: Vec<Row>, total: usize) -> Self {
        Self::new(rows.into_iter().map(Ok), total)
    }

    /// Total matches before paging (groups, for aggregate queries)
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Iterator for ResultSet {
    type Item = ProviderResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet").field("total", &self.total).finish()
    }
}

/// The backend executing compiled queries
pub trait DataProvider: Send + Sync {
    /// Run a query; fails on unknown datatypes or paths
    fn execute(&self, request: &QueryRequest<'_>) -> ProviderResult<ResultSet>;

    /// Qualified field names (`datatype.field`) of a datatype
    fn get_paths(&self, datatype: &str) -> ProviderResult<Vec<String>>;

    /// Type information of a qualified field
    fn get_path_info(&self, path: &str) -> ProviderResult<PathInfo>;

    /// Human readable datatype name
    fn get_label(&self, datatype: &str) -> String {
        datatype.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_timezone;

    #[test]
    fn test_path_expr_display() {
        assert_eq!(
            PathExpr::count().ordered(SortOrder::Desc).to_string(),
            "count(1)/order_desc"
        );
        assert_eq!(
            PathExpr::field("events.severity").grouped().to_string(),
            "events.severity/group_by"
        );

        let tz = parse_timezone("+02:00").unwrap();
        let path = PathExpr::truncated("events.timestamp", tz, TimeUnit::Day)
            .grouped()
            .ordered(SortOrder::Asc);
        assert_eq!(
            path.to_string(),
            "timezone(events.timestamp, '+02:00'):mday/order_asc,group_by"
        );
        assert_eq!(path.field_path(), Some("events.timestamp"));
    }

    #[test]
    fn test_sort_order_is_strict() {
        assert_eq!(SortOrder::from_str("asc"), Some(SortOrder::Asc));
        assert_eq!(SortOrder::from_str("desc"), Some(SortOrder::Desc));
        assert_eq!(SortOrder::from_str("asc, desc"), None);
        assert_eq!(SortOrder::from_str("s"), None);
    }

    #[test]
    fn test_path_info_flags() {
        let info = PathInfo::new("events.timestamp", FieldType::DateTime);
        assert!(!info.filterable);
        assert!(info.groupable);

        let info = PathInfo::new("events.raw", FieldType::Object);
        assert!(info.filterable);
        assert!(!info.groupable);
    }

    #[test]
    fn test_value_integer_view() {
        assert_eq!(Value::Integer(2024).as_integer(), Some(2024));
        assert_eq!(Value::Float(3.0).as_integer(), Some(3));
        assert_eq!(Value::Float(3.5).as_integer(), None);
        assert_eq!(Value::from(" 15 ").as_integer(), Some(15));
        assert_eq!(Value::from("march").as_integer(), None);
        assert_eq!(Value::Null.as_integer(), None);
    }

    #[test]
    fn test_value_sort_cmp() {
        assert_eq!(Value::Null.sort_cmp(&Value::Integer(1)), Ordering::Less);
        assert_eq!(Value::Integer(2).sort_cmp(&Value::Float(1.5)), Ordering::Greater);
        assert_eq!(Value::from("a").sort_cmp(&Value::from("b")), Ordering::Less);
    }

    #[test]
    fn test_result_set_preserves_total() {
        let mut results = ResultSet::from_rows(vec![vec![Value::Integer(1)]], 42);
        assert_eq!(results.total(), 42);
        assert!(results.next().is_some());
        assert!(results.next().is_none());
    }
}
