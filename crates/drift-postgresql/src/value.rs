//! Normalization of PostgreSQL JSON renderings into drift values.
//!
//! Both `row_to_json` and wal2json render rows as JSON. Numbers, booleans
//! and nested json/jsonb come through as-is; timestamps arrive as text in
//! PostgreSQL's own format and are parsed so they compare as instants.

use anyhow::{Context, Result};
use drift_core::{parse_timestamp, Row, Value};
use std::collections::BTreeMap;

/// True for `timestamp`/`timestamptz` in any of their spellings, including
/// typmod forms such as `timestamp(3) with time zone`.
pub fn is_timestamp_type(pg_type: &str) -> bool {
    let t = pg_type.trim().to_ascii_lowercase();
    t.starts_with("timestamp")
}

/// Convert one column value given its declared type.
pub fn normalize(pg_type: Option<&str>, value: serde_json::Value) -> Value {
    if let (Some(t), serde_json::Value::String(s)) = (pg_type, &value) {
        if is_timestamp_type(t) {
            if let Some(ts) = parse_timestamp(s) {
                return Value::Timestamp(ts);
            }
        }
    }
    Value::from(value)
}

/// Parse the text produced by `row_to_json(t)::text`.
pub fn row_from_json(json: &str, column_types: &BTreeMap<String, String>) -> Result<Row> {
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(json).context("row_to_json output is not a JSON object")?;
    Ok(object
        .into_iter()
        .map(|(column, value)| {
            let value = normalize(column_types.get(&column).map(String::as_str), value);
            (column, value)
        })
        .collect())
}
