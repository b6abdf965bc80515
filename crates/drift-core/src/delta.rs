//! Row-level change events and the sets they are grouped into.

use crate::fingerprint::Fingerprint;
use crate::key::RowKey;
use crate::snapshot::SnapshotMetadata;
use crate::values::{Row, Value};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single row-level change.
///
/// Built only through [`Delta::insert`], [`Delta::update`] and
/// [`Delta::delete`], so `before` and `after` are never both absent and
/// `fields`, when present, is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Ordinal assigned by whoever produced the delta, not a database identity.
    pub id: u64,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub table: String,
    pub operation: Operation,
    pub key: RowKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
}

/// Attributes shared by every delta a producer emits.
#[derive(Debug, Clone)]
pub struct DeltaOrigin {
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl DeltaOrigin {
    pub fn new(source: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            timestamp,
        }
    }

    pub fn now(source: impl Into<String>) -> Self {
        Self::new(source, Utc::now())
    }
}

impl Delta {
    pub fn insert(id: u64, origin: &DeltaOrigin, table: &str, key: RowKey, after: Row) -> Self {
        Self::build(id, origin, table, Operation::Insert, key, None, Some(after), None)
    }

    /// An update. `fields` holds the changed columns with their new values;
    /// an empty map is dropped rather than emitted. `before` may be `None`
    /// when a live source only reports the new image.
    pub fn update(
        id: u64,
        origin: &DeltaOrigin,
        table: &str,
        key: RowKey,
        before: Option<Row>,
        after: Row,
        fields: Option<Row>,
    ) -> Self {
        let fields = fields.filter(|f| !f.is_empty());
        Self::build(id, origin, table, Operation::Update, key, before, Some(after), fields)
    }

    pub fn delete(id: u64, origin: &DeltaOrigin, table: &str, key: RowKey, before: Row) -> Self {
        Self::build(id, origin, table, Operation::Delete, key, Some(before), None, None)
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        id: u64,
        origin: &DeltaOrigin,
        table: &str,
        operation: Operation,
        key: RowKey,
        before: Option<Row>,
        after: Option<Row>,
        fields: Option<Row>,
    ) -> Self {
        Self {
            id,
            source: origin.source.clone(),
            timestamp: origin.timestamp,
            table: table.to_string(),
            operation,
            key,
            before,
            after,
            fields,
            fingerprint: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// The delta that undoes this one.
    ///
    /// INSERT and DELETE swap; an UPDATE swaps its images and reports the old
    /// values of the changed columns. An UPDATE without a `before` image
    /// cannot be inverted.
    pub fn inverse(&self) -> Option<Delta> {
        let origin = DeltaOrigin::new(self.source.clone(), self.timestamp);
        let inverted = match self.operation {
            Operation::Insert => Delta::delete(
                self.id,
                &origin,
                &self.table,
                self.key.clone(),
                self.after.clone()?,
            ),
            Operation::Delete => Delta::insert(
                self.id,
                &origin,
                &self.table,
                self.key.clone(),
                self.before.clone()?,
            ),
            Operation::Update => {
                let before = self.before.clone()?;
                let after = self.after.clone()?;
                let fields = self.fields.as_ref().map(|changed| {
                    changed
                        .keys()
                        .map(|column| {
                            let old = before.get(column).cloned().unwrap_or(Value::Null);
                            (column.clone(), old)
                        })
                        .collect()
                });
                Delta::update(
                    self.id,
                    &origin,
                    &self.table,
                    self.key.clone(),
                    Some(after),
                    before,
                    fields,
                )
            }
        };
        Some(inverted)
    }

    /// Compact entry used inside a serialized [`DeltaSet`]:
    /// `{ operation, <key columns...>, row?, fields?, hash? }`.
    pub fn entry(&self) -> DeltaEntry<'_> {
        DeltaEntry(self)
    }
}

/// Serializes a [`Delta`] in the compact per-table form.
pub struct DeltaEntry<'a>(&'a Delta);

impl Serialize for DeltaEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let delta = self.0;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("operation", &delta.operation)?;
        for (column, value) in delta.key.columns() {
            map.serialize_entry(column, value)?;
        }
        match delta.operation {
            Operation::Insert => {
                if let Some(row) = &delta.after {
                    map.serialize_entry("row", row)?;
                }
            }
            Operation::Update => {
                if let Some(fields) = &delta.fields {
                    map.serialize_entry("fields", fields)?;
                }
            }
            Operation::Delete => {}
        }
        if let Some(hash) = &delta.fingerprint {
            map.serialize_entry("hash", hash)?;
        }
        map.end()
    }
}

/// Non-fatal observations made while diffing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffWarning {
    /// Base and current disagree on a table's primary key; current was used.
    PrimaryKeyMismatch {
        table: String,
        base: Vec<String>,
        current: Vec<String>,
    },
    /// A base table is absent from current. Whether it was dropped or simply
    /// not captured is for the caller to decide; no deltas were emitted.
    TableMissingFromCurrent { table: String },
}

impl fmt::Display for DiffWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffWarning::PrimaryKeyMismatch {
                table,
                base,
                current,
            } => write!(
                f,
                "primary key of '{table}' changed from {base:?} to {current:?}; using {current:?}"
            ),
            DiffWarning::TableMissingFromCurrent { table } => {
                write!(f, "table '{table}' exists in base but not in current")
            }
        }
    }
}

/// All deltas between two snapshots, grouped by table.
///
/// Within a table, INSERT and UPDATE deltas come first in current-row order,
/// followed by DELETE deltas in base-row order.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaSet {
    /// Metadata of the current snapshot.
    pub metadata: SnapshotMetadata,
    pub deltas: BTreeMap<String, Vec<Delta>>,
    pub warnings: Vec<DiffWarning>,
}

impl DeltaSet {
    pub fn is_empty(&self) -> bool {
        self.deltas.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.deltas.values().map(Vec::len).sum()
    }

    pub fn table(&self, name: &str) -> &[Delta] {
        self.deltas.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delta> {
        self.deltas.values().flatten()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.iter().filter(|d| d.operation == operation).count()
    }

    /// Deltas that undo this set, table by table in reverse order.
    ///
    /// Returns `None` if any UPDATE lacks its `before` image.
    pub fn inverse(&self) -> Option<DeltaSet> {
        let mut deltas = BTreeMap::new();
        for (table, table_deltas) in &self.deltas {
            let inverted = table_deltas
                .iter()
                .rev()
                .map(Delta::inverse)
                .collect::<Option<Vec<_>>>()?;
            deltas.insert(table.clone(), inverted);
        }
        Some(DeltaSet {
            metadata: self.metadata.clone(),
            deltas,
            warnings: Vec::new(),
        })
    }
}

impl Serialize for DeltaSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Entries<'a>(&'a [Delta]);

        impl Serialize for Entries<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_seq(self.0.iter().map(Delta::entry))
            }
        }

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("metadata", &self.metadata)?;
        let tables: BTreeMap<&str, Entries<'_>> = self
            .deltas
            .iter()
            .filter(|(_, d)| !d.is_empty())
            .map(|(table, d)| (table.as_str(), Entries(d)))
            .collect();
        map.serialize_entry("deltas", &tables)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(json: serde_json::Value) -> Row {
        serde_json::from_value(json).unwrap()
    }

    fn key(id: i64) -> RowKey {
        RowKey::Columns(vec![("id".into(), id.into())])
    }

    #[test]
    fn empty_fields_are_dropped() {
        let origin = DeltaOrigin::now("src");
        let d = Delta::update(
            1,
            &origin,
            "t",
            key(1),
            None,
            row(json!({"id": 1})),
            Some(Row::new()),
        );
        assert!(d.fields.is_none());
        assert!(d.after.is_some());
    }

    #[test]
    fn entry_shapes() {
        let origin = DeltaOrigin::now("src");
        let insert = Delta::insert(1, &origin, "users", key(2), row(json!({"id": 2, "name": "Carl"})));
        assert_eq!(
            serde_json::to_value(insert.entry()).unwrap(),
            json!({"operation": "INSERT", "id": 2, "row": {"id": 2, "name": "Carl"}})
        );

        let update = Delta::update(
            2,
            &origin,
            "users",
            key(1),
            Some(row(json!({"id": 1, "name": "Alice"}))),
            row(json!({"id": 1, "name": "Bob"})),
            Some(row(json!({"name": "Bob"}))),
        );
        assert_eq!(
            serde_json::to_value(update.entry()).unwrap(),
            json!({"operation": "UPDATE", "id": 1, "fields": {"name": "Bob"}})
        );

        let delete = Delta::delete(3, &origin, "users", key(1), row(json!({"id": 1})))
            .with_fingerprint(Fingerprint::from_hex("abc"));
        assert_eq!(
            serde_json::to_value(delete.entry()).unwrap(),
            json!({"operation": "DELETE", "id": 1, "hash": "abc"})
        );
    }

    #[test]
    fn content_keyed_entries_carry_no_key_columns() {
        let origin = DeltaOrigin::now("src");
        let d = Delta::insert(
            1,
            &origin,
            "log",
            RowKey::Content(Fingerprint::from_hex("ff")),
            row(json!({"a": 2})),
        );
        assert_eq!(
            serde_json::to_value(d.entry()).unwrap(),
            json!({"operation": "INSERT", "row": {"a": 2}})
        );
    }

    #[test]
    fn update_inverse_restores_old_values() {
        let origin = DeltaOrigin::now("src");
        let update = Delta::update(
            7,
            &origin,
            "users",
            key(1),
            Some(row(json!({"id": 1, "name": "Alice"}))),
            row(json!({"id": 1, "name": "Bob"})),
            Some(row(json!({"name": "Bob"}))),
        );
        let inverse = update.inverse().unwrap();
        assert_eq!(inverse.operation, Operation::Update);
        assert_eq!(inverse.fields, Some(row(json!({"name": "Alice"}))));
        assert_eq!(inverse.after, Some(row(json!({"id": 1, "name": "Alice"}))));
        assert_eq!(inverse.inverse().unwrap().fields, update.fields);
    }

    #[test]
    fn insert_and_delete_invert_each_other() {
        let origin = DeltaOrigin::now("src");
        let insert = Delta::insert(1, &origin, "t", key(1), row(json!({"id": 1})));
        let inverse = insert.inverse().unwrap();
        assert_eq!(inverse.operation, Operation::Delete);
        assert_eq!(inverse.before, insert.after);
        assert_eq!(inverse.inverse().unwrap().operation, Operation::Insert);
    }

    #[test]
    fn update_without_before_has_no_inverse() {
        let origin = DeltaOrigin::now("src");
        let d = Delta::update(1, &origin, "t", key(1), None, row(json!({"id": 1})), None);
        assert!(d.inverse().is_none());
    }

    #[test]
    fn full_delta_json_round_trips() {
        let origin = DeltaOrigin::now("postgres://db");
        let d = Delta::delete(4, &origin, "users", key(9), row(json!({"id": 9})));
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["operation"], "DELETE");
        assert_eq!(json["key"], json!({"id": 9}));
        assert!(json.get("after").is_none());
        let back: Delta = serde_json::from_value(json).unwrap();
        assert_eq!(back, d);
    }
}
