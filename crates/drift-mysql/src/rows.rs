//! Row reads rendered server-side with `JSON_OBJECT`
//!
//! Rendering each row as JSON on the server keeps value conversion in one
//! place: numbers and decimals arrive as JSON numbers, JSON columns as nested
//! values, and date/time columns as text that is parsed here.

use crate::schema::TableSchema;
use anyhow::{Context, Result};
use drift_core::{parse_timestamp, Row, Value};

/// `SELECT JSON_OBJECT('a', `a`, ...) FROM `table``
pub fn json_object_query(table: &str, schema: &TableSchema) -> String {
    let pairs: Vec<String> = schema
        .column_order
        .iter()
        .map(|column| format!("'{}', {}", column.replace('\'', "''"), quote_ident(column)))
        .collect();
    format!(
        "SELECT JSON_OBJECT({}) FROM {}",
        pairs.join(", "),
        quote_ident(table)
    )
}

pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Convert one column value given the column's declared type.
pub fn normalize(schema: &TableSchema, column: &str, value: serde_json::Value) -> Value {
    let Some(column_type) = schema.columns.get(column).map(|t| t.to_ascii_lowercase()) else {
        return Value::from(value);
    };
    match value {
        serde_json::Value::Number(n) if schema.is_boolean(column) => {
            Value::Bool(n.as_i64().is_some_and(|i| i != 0))
        }
        serde_json::Value::String(s)
            if column_type.starts_with("datetime") || column_type.starts_with("timestamp") =>
        {
            match parse_timestamp(&s) {
                Some(ts) => Value::Timestamp(ts),
                None => Value::String(s),
            }
        }
        other => Value::from(other),
    }
}

/// Parse the text of one `JSON_OBJECT` row.
pub fn row_from_json(json: &str, schema: &TableSchema) -> Result<Row> {
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(json).context("JSON_OBJECT output is not a JSON object")?;
    Ok(object
        .into_iter()
        .map(|(column, value)| {
            let value = normalize(schema, &column, value);
            (column, value)
        })
        .collect())
}
