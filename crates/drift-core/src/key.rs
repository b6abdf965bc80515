//! Row identity.

use crate::fingerprint::{canonical_value, fingerprint, Fingerprint};
use crate::values::{Row, Value};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a row within one table.
///
/// Tables with a primary key identify rows by the ordered primary key values.
/// Tables without one fall back to the row's content fingerprint, which means
/// structurally identical rows collapse into a single identity.
///
/// Serialized as an object of key columns (in primary key order) or, for
/// content keys, as the fingerprint string.
#[derive(Debug, Clone)]
pub enum RowKey {
    Columns(Vec<(String, Value)>),
    Content(Fingerprint),
}

impl RowKey {
    /// Compute the key of `row` under `primary_key`.
    ///
    /// Returns the name of the first primary key column missing from the row
    /// as the error, so the caller can attach table and source context.
    pub fn for_row(primary_key: &[String], row: &Row) -> Result<Self, String> {
        if primary_key.is_empty() {
            return Ok(RowKey::Content(fingerprint(row)));
        }
        primary_key
            .iter()
            .map(|column| match row.get(column) {
                Some(value) => Ok((column.clone(), value.clone())),
                None => Err(column.clone()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(RowKey::Columns)
    }

    /// Key of `row` under `primary_key`, reading absent key columns as `Null`.
    pub fn for_row_or_null(primary_key: &[String], row: &Row) -> Self {
        if primary_key.is_empty() {
            return RowKey::Content(fingerprint(row));
        }
        RowKey::Columns(
            primary_key
                .iter()
                .map(|column| (column.clone(), row.get(column).cloned().unwrap_or(Value::Null)))
                .collect(),
        )
    }

    /// Key columns with their values; empty for content keys.
    pub fn columns(&self) -> &[(String, Value)] {
        match self {
            RowKey::Columns(columns) => columns,
            RowKey::Content(_) => &[],
        }
    }

    pub fn is_content(&self) -> bool {
        matches!(self, RowKey::Content(_))
    }

    /// Canonical text used for hashing and equality.
    fn encoded(&self) -> String {
        match self {
            RowKey::Columns(columns) => {
                let parts: Vec<String> = columns
                    .iter()
                    .map(|(name, value)| format!("{name:?}={}", canonical_value(value)))
                    .collect();
                parts.join("\u{1f}")
            }
            RowKey::Content(fp) => format!("#{fp}"),
        }
    }
}

impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.encoded() == other.encoded()
    }
}

impl Eq for RowKey {}

impl Hash for RowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encoded().hash(state);
    }
}

impl Serialize for RowKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowKey::Columns(columns) => {
                let mut map = serializer.serialize_map(Some(columns.len()))?;
                for (name, value) in columns {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            RowKey::Content(fp) => fp.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RowKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = RowKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of key columns or a fingerprint string")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<RowKey, E> {
                Ok(RowKey::Content(Fingerprint::from_hex(v)))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RowKey, A::Error> {
                let mut columns = Vec::new();
                while let Some((name, value)) = access.next_entry::<String, Value>()? {
                    columns.push((name, value));
                }
                Ok(RowKey::Columns(columns))
            }
        }

        deserializer.deserialize_any(KeyVisitor)
    }
}
