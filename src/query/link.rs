//! Drill-down links
//!
//! Each row of a grouped result can link to the search that lists the events
//! behind it: the original query narrowed by one criterion per grouping value,
//! and, for time buckets, a custom time window spanning the bucket.

use crate::provider::{PathExpr, PathSource, ProviderResult, Row, Value};
use crate::query::criteria::Criteria;
use crate::query::error::QueryResult;
use crate::query::mode::{criterion_value, lucene_value, QueryMode};
use crate::query::planner::QueryPlanner;
use crate::time::{Step, TimeUnit};
use serde::Serialize;

/// A search request expressed as URL parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrilldownLink {
    pub query: String,
    pub query_mode: QueryMode,
    pub params: Vec<(String, String)>,
}

impl DrilldownLink {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace `key` if present, append it otherwise
    pub fn set_param(&mut self, key: &str, value: impl Into<String>) {
        set_param(&mut self.params, key, value.into());
    }

    /// Percent-encoded query string appended to `base`
    pub fn to_url(&self, base: &str) -> String {
        let mut pairs = vec![
            ("query", self.query.as_str()),
            ("query_mode", self.query_mode.as_str()),
        ];
        pairs.extend(self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let encoded: Vec<String> = pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        format!("{}?{}", base, encoded.join("&"))
    }
}

fn set_param(params: &mut Vec<(String, String)>, key: &str, value: String) {
    match params.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = value,
        None => params.push((key.to_string(), value)),
    }
}

/// One bar of a grouped chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartItem {
    pub value: Value,
    pub label: String,
    pub link: DrilldownLink,
}

/// A single `path = value` criterion; a missing value tests for absence
pub fn format_criterion(path: &str, value: Option<&str>, mode: QueryMode) -> String {
    match (mode, value) {
        (QueryMode::Lucene, Some(v)) => format!("{}:{}", path, lucene_value(v)),
        (QueryMode::Lucene, None) => format!("-{}:[* TO *]", path),
        (QueryMode::Criterion, Some(v)) => format!("{} = {}", path, criterion_value(v)),
        (QueryMode::Criterion, None) => format!("!{}", path),
    }
}

impl QueryPlanner<'_> {
    /// Link listing the events behind one grouped row
    ///
    /// `values` are the grouping columns of the row, without the count.
    pub fn groupby_link(&self, values: &[Value], step: Step) -> DrilldownLink {
        let mode = self.mode();
        let mut query = Vec::new();

        if !self.query().trim().is_empty() {
            // the narrowing criteria are AND-ed, keep a top-level OR intact
            if matches!(self.criteria(), Criteria::Or(_)) {
                query.push(format!("({})", self.query().trim()));
            } else {
                query.push(self.query().trim().to_string());
            }
        }

        let mut params = self.context().url_parameters();
        let mut cursor = 0;

        for (group, width) in self.groupby().iter().zip(self.group_widths()) {
            let columns = values.get(cursor..cursor + width).unwrap_or(&[]);
            // the count occupies the first retrieved path
            let paths = self.paths().get(cursor + 1..cursor + 1 + width).unwrap_or(&[]);
            cursor += width;
            let value = columns.iter().find(|v| !v.is_null()).unwrap_or(&Value::Null);

            if TimeUnit::is_temporal(group) {
                let Some(start) = value.as_datetime() else {
                    continue;
                };
                let end = step
                    .bucket_end(start, &self.context().timezone)
                    .unwrap_or(start);
                set_param(&mut params, "timeline_mode", "custom".to_string());
                set_param(&mut params, "timeline_start", start.timestamp().to_string());
                set_param(&mut params, "timeline_end", end.timestamp().to_string());
            } else if mode == QueryMode::Lucene && self.surface().translations().get(group).is_some() {
                query.push(lucene_physical_criterion(paths, columns, self.surface().datatype()));
            } else {
                let text = value.criterion_text();
                query.push(format_criterion(group, text.as_deref(), mode));
            }
        }

        if let Some(limit) = self.limit() {
            set_param(&mut params, "limit", limit.to_string());
        }

        let joiner = mode.operators().and_joiner();
        DrilldownLink {
            query: query.join(joiner.as_str()),
            query_mode: mode,
            params,
        }
    }

    /// Count, label and drill-down link of every grouped row
    ///
    /// Consumes the result; listings have no chart and return nothing.
    pub fn chart_items(&mut self, step: Step) -> QueryResult<Vec<ChartItem>> {
        if !self.is_aggregate() {
            return Ok(Vec::new());
        }

        let rows: Vec<Row> = self.get_result()?.collect::<ProviderResult<_>>()?;
        let label_format = self.time_group().map(|unit| unit.label_format());

        let items = rows
            .into_iter()
            .filter_map(|mut row| {
                if row.is_empty() {
                    return None;
                }
                let value = row.remove(0);
                let link = self.groupby_link(&row, step);

                let labels: Vec<String> = row
                    .iter()
                    .map(|cell| match (cell, label_format) {
                        (Value::DateTime(dt), Some(format)) => dt.format(format).to_string(),
                        (cell, _) => cell.to_string(),
                    })
                    .collect();

                Some(ChartItem {
                    value,
                    label: labels.join(", "),
                    link,
                })
            })
            .collect();
        Ok(items)
    }
}

/// Criterion over the physical columns of a translated group
///
/// Lucene queries are not translated, so the link names every column with a
/// value, OR-ed, or requires all columns to be absent when none has one.
fn lucene_physical_criterion(paths: &[PathExpr], columns: &[Value], datatype: &str) -> String {
    let named: Vec<(&str, Option<String>)> = paths
        .iter()
        .zip(columns)
        .filter_map(|(path, value)| match &path.source {
            PathSource::Field(field) => {
                let field = field
                    .strip_prefix(datatype)
                    .and_then(|rest| rest.strip_prefix('.'))
                    .unwrap_or(field);
                Some((field, value.criterion_text()))
            }
            _ => None,
        })
        .collect();

    let present: Vec<String> = named
        .iter()
        .filter_map(|(field, text)| {
            text.as_deref()
                .map(|t| format_criterion(field, Some(t), QueryMode::Lucene))
        })
        .collect();

    match present.len() {
        0 => named
            .iter()
            .map(|(field, _)| format_criterion(field, None, QueryMode::Lucene))
            .collect::<Vec<_>>()
            .join(" AND "),
        1 => present.into_iter().collect(),
        _ => format!("({})", present.join(" OR ")),
    }
}

/// Compiled criteria as URL parameters of a criterion-mode search
pub fn criteria_to_urlparams(criteria: &Criteria, datatype: &str) -> Vec<(String, String)> {
    vec![
        (
            "query".to_string(),
            criteria.to_query_string(QueryMode::Criterion, Some(datatype)),
        ),
        (
            "query_mode".to_string(),
            QueryMode::Criterion.as_str().to_string(),
        ),
    ]
}
