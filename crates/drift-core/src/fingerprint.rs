//! Deterministic content hashing of rows.
//!
//! A row is first rendered into a canonical JSON text (sorted keys, canonical
//! number text, UTC RFC3339 timestamps) and then hashed with SHA-256. Two rows
//! holding the same column/value pairs in any order produce the same digest.

use crate::values::{canonical_number, Row, Value};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded SHA-256 digest of a row's canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed hex digest, e.g. one read back from JSON.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Fingerprint(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a row.
pub fn fingerprint(row: &Row) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(canonical_row(row).as_bytes());
    Fingerprint(format!("{:x}", hasher.finalize()))
}

/// Canonical text encoding of a row.
pub fn canonical_row(row: &Row) -> String {
    let mut out = String::new();
    write_document(row, &mut out);
    out
}

/// Canonical text encoding of a single value.
pub fn canonical_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_document(doc: &Row, out: &mut String) {
    out.push('{');
    // BTreeMap iteration is already in sorted key order
    for (i, (key, value)) in doc.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(key, out);
        out.push(':');
        write_value(value, out);
    }
    out.push('}');
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&canonical_number(n)),
        Value::String(_) | Value::Timestamp(_) => {
            if let Some(text) = value.text() {
                write_string(&text, out);
            }
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Document(doc) => write_document(doc, out),
    }
}

fn write_string(s: &str, out: &mut String) {
    // serde_json string escaping cannot fail for a &str
    match serde_json::to_string(s) {
        Ok(escaped) => out.push_str(&escaped),
        Err(_) => out.push_str(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let a = row(&[("id", 1.into()), ("name", "Alice".into())]);
        let b = row(&[("name", "Alice".into()), ("id", 1.into())]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn numeric_form_is_normalized() {
        let a: Row = serde_json::from_str(r#"{"n": 10}"#).unwrap();
        let b: Row = serde_json::from_str(r#"{"n": 10.0}"#).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn timestamp_and_its_text_hash_alike() {
        let ts = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        let a = row(&[("at", Value::Timestamp(ts))]);
        let b = row(&[("at", "2023-06-01T00:00:00Z".into())]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn different_content_differs() {
        let a = row(&[("id", 1.into())]);
        let b = row(&[("id", 2.into())]);
        let c = row(&[("id", "1".into())]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    #[test]
    fn canonical_encoding_is_sorted_and_compact() {
        let r: Row = serde_json::from_str(r#"{"b": [1, null], "a": {"y": true, "x": "q"}}"#).unwrap();
        assert_eq!(
            canonical_row(&r),
            r#"{"a":{"x":"q","y":true},"b":[1,null]}"#
        );
    }

    #[test]
    fn digest_is_256_bit_hex() {
        let fp = fingerprint(&Row::new());
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
