//! In-memory data provider
//!
//! Evaluates compiled criteria against flat records held in memory:
//!
//! - criteria and retrieval paths are validated against the declared fields
//! - leaves are compiled once per request (regexes included)
//! - aggregate queries group on the grouped paths and count rows per group
//! - rows are ordered by the order annotations, then paged
//!
//! Terms on the raw-query pseudo-field are matched case-insensitively against
//! every value of a record and are the ones highlighted in listings.

use super::loader::parse_datetime;
use super::{
    DataProvider, FieldType, PathExpr, PathInfo, PathSource, ProviderError, ProviderResult,
    QueryRequest, ResultSet, Row, SortOrder, Value,
};
use crate::highlight::Highlight;
use crate::query::{is_negated_operator, Criteria, RAW_QUERY_FIELD};
use crate::time::{TimeUnit, UserTimezone};
use regex::{Captures, Regex, RegexBuilder};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// A flat record: field name to non-null value
pub type Record = HashMap<String, Value>;

/// Records of one datatype with their declared fields
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    fields: Vec<(String, FieldType)>,
    records: Vec<Record>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: declare a field, even if no record holds it
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = field_type,
            None => self.fields.push((name, field_type)),
        }
        self
    }

    /// Builder: append a record
    pub fn record<I, K>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.push(fields.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    /// Append a record; unseen fields are declared with the type of their first value
    pub fn push(&mut self, fields: Vec<(String, Value)>) {
        let mut record = Record::with_capacity(fields.len());

        for (name, value) in fields {
            if self.field_type(&name).is_none() {
                self.fields.push((name.clone(), infer_type(&value)));
            }
            if !value.is_null() {
                record.insert(name, value);
            }
        }
        self.records.push(record);
    }

    /// Declared fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| *ty)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn infer_type(value: &Value) -> FieldType {
    match value {
        Value::Bool(_) => FieldType::Boolean,
        Value::Integer(_) => FieldType::Integer,
        Value::Float(_) => FieldType::Float,
        Value::DateTime(_) => FieldType::DateTime,
        Value::Null | Value::Text(_) => FieldType::Text,
    }
}

/// Provider over in-memory datasets, one per datatype
#[derive(Debug, Default)]
pub struct MemoryProvider {
    datasets: HashMap<String, Dataset>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, datatype: impl Into<String>, dataset: Dataset) -> Self {
        self.insert(datatype, dataset);
        self
    }

    pub fn insert(&mut self, datatype: impl Into<String>, dataset: Dataset) {
        self.datasets.insert(datatype.into(), dataset);
    }

    pub fn dataset(&self, datatype: &str) -> ProviderResult<&Dataset> {
        self.datasets
            .get(datatype)
            .ok_or_else(|| ProviderError::UnknownDatatype(datatype.to_string()))
    }
}

impl DataProvider for MemoryProvider {
    fn execute(&self, request: &QueryRequest<'_>) -> ProviderResult<ResultSet> {
        let dataset = self.dataset(request.datatype)?;
        let scope = Scope::new(request.datatype, dataset);

        let filter = Filter::compile(request.criteria, &scope)?;
        let columns = request
            .paths
            .iter()
            .map(|path| scope.column(path))
            .collect::<ProviderResult<Vec<_>>>()?;

        let matched: Vec<&Record> = dataset
            .records()
            .iter()
            .filter(|record| filter.matches(record))
            .collect();

        let mut rows: Vec<Row> = if request.aggregate {
            group_rows(&matched, &columns)
        } else {
            matched
                .iter()
                .map(|record| columns.iter().map(|c| c.project(record)).collect())
                .collect()
        };
        sort_rows(&mut rows, request.paths);

        let total = rows.len();
        let mut page: Vec<Row> = rows
            .into_iter()
            .skip(request.offset)
            .take(request.limit.unwrap_or(usize::MAX))
            .collect();

        if let Some(highlight) = request.highlight {
            let mut terms = Vec::new();
            filter.free_text_terms(&mut terms);
            highlight_rows(&mut page, &terms, highlight)?;
        }

        debug!(
            datatype = request.datatype,
            matched = matched.len(),
            total,
            returned = page.len(),
            "Executed in-memory query"
        );
        Ok(ResultSet::from_rows(page, total))
    }

    fn get_paths(&self, datatype: &str) -> ProviderResult<Vec<String>> {
        Ok(self
            .dataset(datatype)?
            .fields()
            .map(|(name, _)| format!("{}.{}", datatype, name))
            .collect())
    }

    fn get_path_info(&self, path: &str) -> ProviderResult<PathInfo> {
        let (datatype, field) = path
            .split_once('.')
            .ok_or_else(|| ProviderError::UnknownPath(path.to_string()))?;
        let field_type = self
            .dataset(datatype)?
            .field_type(field)
            .ok_or_else(|| ProviderError::UnknownPath(path.to_string()))?;
        Ok(PathInfo::new(path, field_type))
    }
}

/// Resolves qualified paths against one dataset
struct Scope<'a> {
    prefix: String,
    dataset: &'a Dataset,
}

impl<'a> Scope<'a> {
    fn new(datatype: &str, dataset: &'a Dataset) -> Self {
        Self {
            prefix: format!("{}.", datatype),
            dataset,
        }
    }

    fn field<'p>(&self, path: &'p str) -> ProviderResult<&'p str> {
        path.strip_prefix(&self.prefix)
            .filter(|field| self.dataset.field_type(field).is_some())
            .ok_or_else(|| ProviderError::UnknownPath(path.to_string()))
    }

    /// Field of a criteria path; `None` for the raw-query pseudo-field
    fn criteria_field<'p>(&self, path: &'p str) -> ProviderResult<Option<&'p str>> {
        match path.strip_prefix(&self.prefix) {
            Some(RAW_QUERY_FIELD) => Ok(None),
            _ => self.field(path).map(Some),
        }
    }

    fn column<'p>(&self, path: &'p PathExpr) -> ProviderResult<Column<'p>> {
        Ok(match &path.source {
            PathSource::Count => Column::Count,
            PathSource::Field(p) => Column::Field(self.field(p)?),
            PathSource::Truncated {
                field,
                timezone,
                unit,
            } => Column::Component {
                field: self.field(field)?,
                timezone: *timezone,
                unit: *unit,
            },
        })
    }
}

/// A resolved retrieval path
enum Column<'a> {
    Count,
    Field(&'a str),
    Component {
        field: &'a str,
        timezone: UserTimezone,
        unit: TimeUnit,
    },
}

impl Column<'_> {
    fn is_count(&self) -> bool {
        matches!(self, Column::Count)
    }

    fn project(&self, record: &Record) -> Value {
        match self {
            Column::Count => Value::Integer(1),
            Column::Field(field) => record.get(*field).cloned().unwrap_or(Value::Null),
            Column::Component {
                field,
                timezone,
                unit,
            } => record
                .get(*field)
                .and_then(Value::as_datetime)
                .map(|dt| Value::Integer(unit.component(&timezone.to_local(&dt))))
                .unwrap_or(Value::Null),
        }
    }
}

fn group_rows(records: &[&Record], columns: &[Column<'_>]) -> Vec<Row> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Row, i64)> = Vec::new();

    for record in records {
        let key: Row = columns
            .iter()
            .filter(|c| !c.is_count())
            .map(|c| c.project(record))
            .collect();
        let slot = *index.entry(format!("{:?}", key)).or_insert_with(|| {
            groups.push((key, 0));
            groups.len() - 1
        });
        groups[slot].1 += 1;
    }

    groups
        .into_iter()
        .map(|(key, count)| {
            let mut key = key.into_iter();
            columns
                .iter()
                .map(|c| match c {
                    Column::Count => Value::Integer(count),
                    _ => key.next().unwrap_or(Value::Null),
                })
                .collect()
        })
        .collect()
}

fn sort_rows(rows: &mut [Row], paths: &[PathExpr]) {
    let keys: Vec<(usize, SortOrder)> = paths
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.order.map(|order| (i, order)))
        .collect();
    if keys.is_empty() {
        return;
    }

    rows.sort_by(|a, b| {
        for &(i, order) in &keys {
            let ord = match (a.get(i), b.get(i)) {
                (Some(x), Some(y)) => x.sort_cmp(y),
                _ => Ordering::Equal,
            };
            let ord = match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn highlight_rows(rows: &mut [Row], terms: &[&str], highlight: &Highlight) -> ProviderResult<()> {
    let alternatives: Vec<String> = terms
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| regex::escape(t))
        .collect();
    if alternatives.is_empty() {
        return Ok(());
    }

    let pattern = RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()
        .map_err(|e| ProviderError::InvalidCriteria(e.to_string()))?;

    for cell in rows.iter_mut().flatten() {
        if let Value::Text(text) = cell {
            if pattern.is_match(text.as_str()) {
                let marked = pattern
                    .replace_all(text.as_str(), |caps: &Captures| highlight.wrap(&caps[0]))
                    .into_owned();
                *text = marked;
            }
        }
    }
    Ok(())
}

/// Criteria compiled for evaluation
enum Filter {
    All,
    Leaf(LeafFilter),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    fn compile(criteria: &Criteria, scope: &Scope<'_>) -> ProviderResult<Self> {
        let compile_all = |children: &[Criteria]| {
            children
                .iter()
                .map(|c| Filter::compile(c, scope))
                .collect::<ProviderResult<Vec<_>>>()
        };

        Ok(match criteria {
            Criteria::Empty => Filter::All,
            Criteria::Leaf {
                path,
                operator,
                value,
            } => {
                let field = scope.criteria_field(path)?.map(str::to_string);
                Filter::Leaf(LeafFilter::compile(field, operator, value.as_deref())?)
            }
            Criteria::And(children) => Filter::And(compile_all(children.as_slice())?),
            Criteria::Or(children) => Filter::Or(compile_all(children.as_slice())?),
        })
    }

    fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::All => true,
            Filter::Leaf(leaf) => leaf.matches(record),
            Filter::And(children) => children.iter().all(|c| c.matches(record)),
            Filter::Or(children) => children.iter().any(|c| c.matches(record)),
        }
    }

    /// Positive raw-query terms, for highlighting
    fn free_text_terms<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::All => {}
            Filter::Leaf(leaf) => {
                if leaf.field.is_none() && !leaf.negated {
                    match &leaf.predicate {
                        Predicate::Equal(term) => out.push(term),
                        Predicate::Contains { needle, .. } => out.push(needle),
                        _ => {}
                    }
                }
            }
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.free_text_terms(out);
                }
            }
        }
    }
}

/// One leaf test; `field: None` searches every value of a record
struct LeafFilter {
    field: Option<String>,
    predicate: Predicate,
    negated: bool,
}

enum Predicate {
    Present,
    Equal(String),
    /// `needle` is lowercased when `ignore_case` is set
    Contains { needle: String, ignore_case: bool },
    Matches(Regex),
    Compare(Comparison, String),
}

#[derive(Clone, Copy)]
enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    fn accepts(&self, ord: Ordering) -> bool {
        match self {
            Comparison::Gt => ord == Ordering::Greater,
            Comparison::Gte => ord != Ordering::Less,
            Comparison::Lt => ord == Ordering::Less,
            Comparison::Lte => ord != Ordering::Greater,
        }
    }
}

impl LeafFilter {
    fn compile(field: Option<String>, operator: &str, value: Option<&str>) -> ProviderResult<Self> {
        let negated = is_negated_operator(operator);
        let base = operator.strip_prefix('!').unwrap_or(operator);

        let Some(value) = value else {
            return Ok(Self {
                field,
                predicate: Predicate::Present,
                negated,
            });
        };

        let predicate = match base {
            "==" | "=" => Predicate::Equal(value.to_string()),
            "<>" => Predicate::Contains {
                needle: value.to_string(),
                ignore_case: false,
            },
            "<>*" => Predicate::Contains {
                needle: value.to_lowercase(),
                ignore_case: true,
            },
            "~" => Predicate::Matches(build_regex(value, false)?),
            "~*" => Predicate::Matches(build_regex(value, true)?),
            ">" => Predicate::Compare(Comparison::Gt, value.to_string()),
            ">=" => Predicate::Compare(Comparison::Gte, value.to_string()),
            "<" => Predicate::Compare(Comparison::Lt, value.to_string()),
            "<=" => Predicate::Compare(Comparison::Lte, value.to_string()),
            _ => {
                return Err(ProviderError::InvalidCriteria(format!(
                    "unsupported operator '{}'",
                    operator
                )))
            }
        };

        Ok(Self {
            field,
            predicate,
            negated,
        })
    }

    fn matches(&self, record: &Record) -> bool {
        let hit = match &self.field {
            Some(field) => record.get(field).map_or(false, |v| self.predicate.test(v)),
            None => record.values().any(|v| self.predicate.test_free_text(v)),
        };
        hit != self.negated
    }
}

fn build_regex(pattern: &str, ignore_case: bool) -> ProviderResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .build()
        .map_err(|e| ProviderError::InvalidCriteria(format!("invalid regex '{}': {}", pattern, e)))
}

impl Predicate {
    fn test(&self, value: &Value) -> bool {
        match self {
            Predicate::Present => true,
            Predicate::Equal(expected) => values_equal(value, expected),
            Predicate::Contains {
                needle,
                ignore_case: true,
            } => value.to_string().to_lowercase().contains(needle.as_str()),
            Predicate::Contains { needle, .. } => value.to_string().contains(needle.as_str()),
            Predicate::Matches(re) => re.is_match(&value.to_string()),
            Predicate::Compare(cmp, operand) => {
                compare_values(value, operand).map_or(false, |ord| cmp.accepts(ord))
            }
        }
    }

    /// Free text matches substrings, ignoring case
    fn test_free_text(&self, value: &Value) -> bool {
        match self {
            Predicate::Equal(term) => value
                .to_string()
                .to_lowercase()
                .contains(&term.to_lowercase()),
            other => other.test(value),
        }
    }
}

fn values_equal(value: &Value, expected: &str) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => expected.parse::<bool>().map_or(false, |e| e == *b),
        Value::Integer(_) | Value::Float(_) => {
            match (value.as_f64(), expected.trim().parse::<f64>()) {
                (Some(a), Ok(b)) => a == b,
                _ => false,
            }
        }
        Value::DateTime(dt) => parse_datetime(expected).map_or(false, |e| e == *dt),
        Value::Text(s) => s == expected,
    }
}

fn compare_values(value: &Value, operand: &str) -> Option<Ordering> {
    match value {
        Value::Integer(_) | Value::Float(_) => {
            let operand: f64 = operand.trim().parse().ok()?;
            value.as_f64()?.partial_cmp(&operand)
        }
        Value::DateTime(dt) => parse_datetime(operand).map(|o| dt.cmp(&o)),
        Value::Text(s) => Some(s.as_str().cmp(operand)),
        Value::Null | Value::Bool(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::HIGHLIGHT_PRE_TAG;
    use crate::time::parse_timezone;

    fn provider() -> MemoryProvider {
        let utc = parse_timezone("UTC").unwrap();
        let at = |d: u32, h: u32, m: u32| {
            Value::DateTime(utc.with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap())
        };

        let dataset = Dataset::new()
            .with_field("timestamp", FieldType::DateTime)
            .with_field("severity", FieldType::Text)
            .with_field("port", FieldType::Integer)
            .with_field("message", FieldType::Text)
            .with_field("tag", FieldType::Text)
            .record([
                ("timestamp", at(1, 10, 0)),
                ("severity", Value::from("high")),
                ("port", Value::Integer(22)),
                ("message", Value::from("Login FAILED for root")),
                ("tag", Value::from("ssh")),
            ])
            .record([
                ("timestamp", at(1, 23, 30)),
                ("severity", Value::from("low")),
                ("port", Value::Integer(443)),
                ("message", Value::from("login ok")),
            ])
            .record([
                ("timestamp", at(2, 9, 15)),
                ("severity", Value::from("high")),
                ("port", Value::Integer(8080)),
                ("message", Value::from("disk failed")),
            ]);

        MemoryProvider::new().with_dataset("events", dataset)
    }

    fn run(provider: &MemoryProvider, criteria: &Criteria, paths: &[PathExpr]) -> (Vec<Row>, usize) {
        let request = QueryRequest {
            datatype: "events",
            paths,
            criteria,
            limit: None,
            offset: 0,
            aggregate: paths.iter().any(|p| p.group_by),
            highlight: None,
        };
        let results = provider.execute(&request).unwrap();
        let total = results.total();
        (results.collect::<ProviderResult<_>>().unwrap(), total)
    }

    fn ports(provider: &MemoryProvider, criteria: Criteria) -> Vec<i64> {
        let paths = [PathExpr::field("events.port").ordered(SortOrder::Asc)];
        run(provider, &criteria, &paths)
            .0
            .into_iter()
            .filter_map(|row| row[0].as_integer())
            .collect()
    }

    #[test]
    fn test_equality_and_negation() {
        let p = provider();
        assert_eq!(ports(&p, Criteria::leaf("events.severity", "==", "high")), vec![22, 8080]);
        assert_eq!(ports(&p, Criteria::leaf("events.severity", "!=", "high")), vec![443]);
        assert_eq!(ports(&p, Criteria::leaf("events.port", "=", "443")), vec![443]);
    }

    #[test]
    fn test_existence() {
        let p = provider();
        assert_eq!(ports(&p, Criteria::exists("events.tag")), vec![22]);
        assert_eq!(ports(&p, Criteria::absent("events.tag")), vec![443, 8080]);
        // a missing field is not equal to anything
        assert_eq!(ports(&p, Criteria::leaf("events.tag", "!=", "ssh")), vec![443, 8080]);
    }

    #[test]
    fn test_numeric_and_datetime_ranges() {
        let p = provider();
        let range = Criteria::leaf("events.port", ">=", "100") & Criteria::leaf("events.port", "<", "8080");
        assert_eq!(ports(&p, range), vec![443]);

        let window = Criteria::leaf("events.timestamp", ">=", "2024-03-01T12:00:00+00:00")
            & Criteria::leaf("events.timestamp", "<", "2024-03-02T00:00:00+00:00");
        assert_eq!(ports(&p, window), vec![443]);
    }

    #[test]
    fn test_substring_and_regex() {
        let p = provider();
        assert_eq!(ports(&p, Criteria::leaf("events.message", "<>", "failed")), vec![8080]);
        assert_eq!(ports(&p, Criteria::leaf("events.message", "<>*", "failed")), vec![22, 8080]);
        assert_eq!(ports(&p, Criteria::leaf("events.message", "!<>*", "failed")), vec![443]);
        assert_eq!(ports(&p, Criteria::leaf("events.message", "~", "^login")), vec![443]);
        assert_eq!(ports(&p, Criteria::leaf("events.message", "~*", "^login")), vec![22, 443]);
        assert_eq!(ports(&p, Criteria::leaf("events.message", "!~", "failed$")), vec![22, 443]);
    }

    #[test]
    fn test_free_text() {
        let p = provider();
        assert_eq!(ports(&p, Criteria::leaf("events._raw_query", "==", "failed")), vec![22, 8080]);
        assert_eq!(ports(&p, Criteria::leaf("events._raw_query", "!=", "failed")), vec![443]);
    }

    #[test]
    fn test_invalid_criteria() {
        let p = provider();
        let paths = [PathExpr::field("events.port")];
        let request = |criteria: &Criteria| {
            let req = QueryRequest {
                datatype: "events",
                paths: &paths,
                criteria,
                limit: None,
                offset: 0,
                aggregate: false,
                highlight: None,
            };
            p.execute(&req).map(|_| ())
        };

        assert!(matches!(
            request(&Criteria::leaf("events.nope", "==", "x")),
            Err(ProviderError::UnknownPath(ref path)) if path == "events.nope"
        ));
        assert!(matches!(
            request(&Criteria::leaf("events.message", "~", "(")),
            Err(ProviderError::InvalidCriteria(_))
        ));
        assert!(matches!(
            request(&Criteria::leaf("events.message", "=~", "x")),
            Err(ProviderError::InvalidCriteria(_))
        ));
    }

    #[test]
    fn test_unknown_datatype_and_path() {
        let p = provider();
        let request = QueryRequest {
            datatype: "flows",
            paths: &[],
            criteria: &Criteria::Empty,
            limit: None,
            offset: 0,
            aggregate: false,
            highlight: None,
        };
        assert!(matches!(p.execute(&request), Err(ProviderError::UnknownDatatype(_))));

        let paths = [PathExpr::field("events.nope")];
        let request = QueryRequest {
            datatype: "events",
            paths: &paths,
            ..request
        };
        assert!(matches!(p.execute(&request), Err(ProviderError::UnknownPath(_))));

        assert!(p.get_path_info("events.nope").is_err());
        assert!(p.get_paths("flows").is_err());
    }

    #[test]
    fn test_metadata() {
        let p = provider();
        assert_eq!(
            p.get_paths("events").unwrap(),
            vec![
                "events.timestamp",
                "events.severity",
                "events.port",
                "events.message",
                "events.tag",
            ]
        );
        let info = p.get_path_info("events.timestamp").unwrap();
        assert_eq!(info.field_type, FieldType::DateTime);
        assert!(!info.filterable);
    }

    #[test]
    fn test_group_and_count() {
        let p = provider();
        let paths = [
            PathExpr::count().ordered(SortOrder::Desc),
            PathExpr::field("events.severity").grouped(),
        ];
        let (rows, total) = run(&p, &Criteria::Empty, &paths);

        assert_eq!(total, 2);
        assert_eq!(
            rows,
            vec![
                vec![Value::Integer(2), Value::from("high")],
                vec![Value::Integer(1), Value::from("low")],
            ]
        );
    }

    #[test]
    fn test_truncation_uses_request_timezone() {
        let p = provider();
        let tz = parse_timezone("+02:00").unwrap();
        let paths: Vec<PathExpr> = std::iter::once(PathExpr::count())
            .chain(TimeUnit::Day.cascade().map(|unit| {
                PathExpr::truncated("events.timestamp", tz, unit)
                    .grouped()
                    .ordered(SortOrder::Asc)
            }))
            .collect();

        // 2024-03-01 23:30 UTC is already March 2nd at +02:00
        let (rows, _) = run(&p, &Criteria::Empty, &paths);
        let as_ints: Vec<Vec<i64>> = rows
            .iter()
            .map(|row| row.iter().filter_map(Value::as_integer).collect())
            .collect();
        assert_eq!(as_ints, vec![vec![1, 2024, 3, 1], vec![2, 2024, 3, 2]]);
    }

    #[test]
    fn test_paging_keeps_total() {
        let p = provider();
        let paths = [PathExpr::field("events.port").ordered(SortOrder::Desc)];
        let request = QueryRequest {
            datatype: "events",
            paths: &paths,
            criteria: &Criteria::Empty,
            limit: Some(1),
            offset: 1,
            aggregate: false,
            highlight: None,
        };

        let results = p.execute(&request).unwrap();
        assert_eq!(results.total(), 3);
        let rows: Vec<Row> = results.collect::<ProviderResult<_>>().unwrap();
        assert_eq!(rows, vec![vec![Value::Integer(443)]]);
    }

    #[test]
    fn test_highlight_free_text_terms() {
        let p = provider();
        let highlight = Highlight::default();
        let paths = [PathExpr::field("events.message"), PathExpr::field("events.port")];
        let criteria = Criteria::leaf("events._raw_query", "==", "failed");
        let request = QueryRequest {
            datatype: "events",
            paths: &paths,
            criteria: &criteria,
            limit: None,
            offset: 0,
            aggregate: false,
            highlight: Some(&highlight),
        };

        let rows: Vec<Row> = p
            .execute(&request)
            .unwrap()
            .collect::<ProviderResult<_>>()
            .unwrap();
        assert_eq!(
            rows[0][0],
            Value::Text(format!("Login {} for root", highlight.wrap("FAILED")))
        );
        assert!(!rows[0][1].to_string().contains(HIGHLIGHT_PRE_TAG));
    }
}
