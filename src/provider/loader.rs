//! Dataset loading
//!
//! Reads event records from disk into a [`Dataset`]:
//!
//! - `.csv`: one record per row, header names as fields, cell types inferred
//! - anything else: JSON, either an array of objects or one object per line
//!
//! Nested JSON objects are flattened with `.` and array items get an `(i)`
//! suffix, so `{"http": {"headers": ["a"]}}` yields `http.headers(0)`.

use super::memory::Dataset;
use super::{ProviderError, ProviderResult, Value};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use std::path::Path;
use tracing::info;

/// Formats tried after RFC 3339, read as UTC
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];

/// Parse a timestamp: RFC 3339 or a common naive format taken as UTC
pub fn parse_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().fixed_offset());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().fixed_offset())
}

/// Load a dataset file, picking the format from the extension
pub fn load_dataset(path: &Path) -> ProviderResult<Dataset> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));

    let dataset = if is_csv {
        load_csv(path)?
    } else {
        load_json(&std::fs::read_to_string(path)?)?
    };

    info!(
        path = %path.display(),
        records = dataset.len(),
        fields = dataset.fields().count(),
        "Loaded dataset"
    );
    Ok(dataset)
}

fn load_csv(path: &Path) -> ProviderResult<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut dataset = Dataset::new();
    for result in reader.records() {
        let record = result?;
        let fields = headers
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| (name.trim().to_string(), parse_cell(cell)))
            .collect();
        dataset.push(fields);
    }
    Ok(dataset)
}

/// Infer a CSV cell's value: integer, float, boolean, timestamp, else text
fn parse_cell(cell: &str) -> Value {
    let cell = cell.trim();
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = cell.parse::<f64>() {
        return Value::Float(f);
    }
    match cell {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    match parse_datetime(cell) {
        Some(dt) => Value::DateTime(dt),
        None => Value::Text(cell.to_string()),
    }
}

/// JSON array of objects, or JSON lines
pub fn load_json(content: &str) -> ProviderResult<Dataset> {
    let mut dataset = Dataset::new();
    let content = content.trim();

    if content.starts_with('[') {
        let items: Vec<serde_json::Value> = serde_json::from_str(content)?;
        for item in &items {
            dataset.push(flatten_record(item)?);
        }
    } else {
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let item: serde_json::Value = serde_json::from_str(line)?;
            dataset.push(flatten_record(&item)?);
        }
    }
    Ok(dataset)
}

fn flatten_record(item: &serde_json::Value) -> ProviderResult<Vec<(String, Value)>> {
    if !item.is_object() {
        return Err(ProviderError::Dataset(format!(
            "expected a JSON object, got: {}",
            item
        )));
    }

    let mut fields = Vec::new();
    flatten_json("", item, &mut fields);
    Ok(fields)
}

fn flatten_json(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, Value)>) {
    use serde_json::Value as Json;

    match value {
        Json::Object(map) => {
            for (key, child) in map {
                let name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_json(&name, child, out);
            }
        }
        Json::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_json(&format!("{}({})", prefix, i), child, out);
            }
        }
        Json::Null => out.push((prefix.to_string(), Value::Null)),
        Json::Bool(b) => out.push((prefix.to_string(), Value::Bool(*b))),
        Json::Number(n) => {
            let value = match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            };
            out.push((prefix.to_string(), value));
        }
        Json::String(s) => {
            let value = match DateTime::parse_from_rfc3339(s) {
                Ok(dt) => Value::DateTime(dt),
                Err(_) => Value::Text(s.clone()),
            };
            out.push((prefix.to_string(), value));
        }
    }
}
