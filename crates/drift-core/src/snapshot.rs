//! Point-in-time capture of a source's tables.

use crate::error::{Error, Result};
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::key::RowKey;
use crate::values::Row;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Kind of database a snapshot or delta came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Postgres,
    Mysql,
    Mongodb,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Postgres => "postgres",
            SourceKind::Mysql => "mysql",
            SourceKind::Mongodb => "mongodb",
        }
    }

    /// Resolve a connection scheme token (the text before `://`).
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(SourceKind::Postgres),
            "mysql" | "mariadb" => Some(SourceKind::Mysql),
            "mongodb" | "mongodb+srv" => Some(SourceKind::Mongodb),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub snapshot_id: String,
    pub source_name: String,
    pub source_kind: SourceKind,
    pub schema_version: String,
    pub row_count: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// Columns, primary key and rows of one table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableCapture {
    /// Column name to declared type, as reported by the source.
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
    /// Primary key columns in key order. Empty when the table has none.
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Row>,
    /// Per-row fingerprints, parallel to `rows`, when integrity tagging was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprints: Option<Vec<Fingerprint>>,
}

impl TableCapture {
    pub fn new(columns: BTreeMap<String, String>, primary_key: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            primary_key,
            rows,
            fingerprints: None,
        }
    }

    /// Compute the key of every row in order.
    ///
    /// Fails when a row lacks a primary key column or, for tables with a
    /// primary key, when two rows share a key.
    pub fn keyed_rows(&self, source_name: &str, table: &str) -> Result<Vec<(RowKey, &Row)>> {
        let mut seen = HashSet::with_capacity(self.rows.len());
        let mut keyed = Vec::with_capacity(self.rows.len());
        for (position, row) in self.rows.iter().enumerate() {
            let key = RowKey::for_row(&self.primary_key, row).map_err(|column| {
                Error::validation(
                    source_name,
                    table,
                    format!("row {position} has no value for primary key column '{column}'"),
                )
            })?;
            if !key.is_content() && !seen.insert(key.clone()) {
                return Err(Error::validation(
                    source_name,
                    table,
                    format!("duplicate primary key {} at row {position}", describe_key(&key)),
                ));
            }
            keyed.push((key, row));
        }
        Ok(keyed)
    }
}

pub(crate) fn describe_key(key: &RowKey) -> String {
    serde_json::to_string(key).unwrap_or_else(|_| format!("{key:?}"))
}

/// Complete capture of a source. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub tables: BTreeMap<String, TableCapture>,
}

impl Snapshot {
    pub fn builder(source_name: impl Into<String>, source_kind: SourceKind) -> SnapshotBuilder {
        SnapshotBuilder::new(source_name, source_kind)
    }

    pub fn source_name(&self) -> &str {
        &self.metadata.source_name
    }

    pub fn table(&self, name: &str) -> Option<&TableCapture> {
        self.tables.get(name)
    }

    /// Check the structural invariants a diff relies on.
    ///
    /// Every table must have a `row_count` entry matching its row count, every
    /// `row_count` entry must name a captured table, and every row must carry
    /// all primary key columns. Primary keys must be unique.
    pub fn validate(&self) -> Result<()> {
        let source = self.source_name();
        for (table, count) in &self.metadata.row_count {
            let capture = self.tables.get(table).ok_or_else(|| {
                Error::validation(source, table, "listed in row_count but not captured")
            })?;
            if capture.rows.len() != *count {
                return Err(Error::validation(
                    source,
                    table,
                    format!(
                        "row_count says {count} rows but {} were captured",
                        capture.rows.len()
                    ),
                ));
            }
        }
        for (table, capture) in &self.tables {
            if !self.metadata.row_count.contains_key(table) {
                return Err(Error::validation(source, table, "missing from row_count"));
            }
            if let Some(fps) = &capture.fingerprints {
                if fps.len() != capture.rows.len() {
                    return Err(Error::validation(
                        source,
                        table,
                        "fingerprint list does not match row list",
                    ));
                }
            }
            capture.keyed_rows(source, table)?;
        }
        Ok(())
    }

    /// Copy of this snapshot with every table tagged with row fingerprints.
    pub fn with_fingerprints(&self) -> Snapshot {
        let mut tagged = self.clone();
        for capture in tagged.tables.values_mut() {
            capture.fingerprints = Some(capture.rows.iter().map(fingerprint).collect());
        }
        tagged
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(|t| t.rows.len()).sum()
    }
}

/// Assembles a [`Snapshot`] table by table, keeping `row_count` in step with
/// the captured rows.
#[derive(Debug)]
pub struct SnapshotBuilder {
    source_name: String,
    source_kind: SourceKind,
    snapshot_id: Option<String>,
    schema_version: String,
    created_by: Option<String>,
    tables: BTreeMap<String, TableCapture>,
}

impl SnapshotBuilder {
    pub fn new(source_name: impl Into<String>, source_kind: SourceKind) -> Self {
        Self {
            source_name: source_name.into(),
            source_kind,
            snapshot_id: None,
            schema_version: "1.0".to_string(),
            created_by: Some("drift".to_string()),
            tables: BTreeMap::new(),
        }
    }

    pub fn snapshot_id(mut self, id: impl Into<String>) -> Self {
        self.snapshot_id = Some(id.into());
        self
    }

    pub fn schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    pub fn created_by(mut self, created_by: Option<String>) -> Self {
        self.created_by = created_by;
        self
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Add a captured table.
    ///
    /// A table with a primary key whose rows repeat a key, or lack a key
    /// column, is a capture error for that table.
    pub fn table(&mut self, name: impl Into<String>, capture: TableCapture) -> Result<()> {
        let name = name.into();
        capture
            .keyed_rows(&self.source_name, &name)
            .map_err(|e| Error::capture(self.source_name.clone(), name.clone(), e))?;
        self.tables.insert(name, capture);
        Ok(())
    }

    pub fn build(self) -> Snapshot {
        let now = Utc::now();
        let row_count = self
            .tables
            .iter()
            .map(|(name, capture)| (name.clone(), capture.rows.len()))
            .collect();
        Snapshot {
            metadata: SnapshotMetadata {
                snapshot_id: self.snapshot_id.unwrap_or_else(|| now.to_rfc3339()),
                source_name: self.source_name,
                source_kind: self.source_kind,
                schema_version: self.schema_version,
                row_count,
                created_at: Some(now),
                created_by: self.created_by,
            },
            tables: self.tables,
        }
    }
}
