//! Parser for wal2json format-version 2 output
//!
//! With format version 2 every row returned by the slot functions is one
//! JSON object: a `B`/`C` transaction marker or an `I`/`U`/`D` change for a
//! single row. Markers carry the commit timestamp and the LSN to advance to.

use crate::value::normalize;
use anyhow::{anyhow, Context, Result};
use drift_core::{changed_fields, fingerprint, Delta, DeltaOrigin, Operation, Row, RowKey};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Wal2JsonColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub pg_type: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Wal2JsonKey {
    pub name: String,
    #[serde(rename = "type")]
    pub pg_type: String,
}

/// One wal2json v2 record
#[derive(Debug, Clone, Deserialize)]
pub struct Wal2JsonRecord {
    pub action: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub nextlsn: Option<String>,
    /// New row image (INSERT, UPDATE)
    #[serde(default)]
    pub columns: Vec<Wal2JsonColumn>,
    /// Old key or old row, depending on the table's REPLICA IDENTITY
    #[serde(default)]
    pub identity: Vec<Wal2JsonColumn>,
    #[serde(default)]
    pub pk: Vec<Wal2JsonKey>,
}

/// Parses a wal2json formatted string into a record
pub fn parse_wal2json(input: &str) -> Result<Wal2JsonRecord> {
    let value: serde_json::Value =
        serde_json::from_str(input).context("Failed to parse wal2json output as JSON")?;
    if !value.is_object() {
        anyhow::bail!("Expected wal2json output to be a JSON object, got: {value:?}");
    }
    serde_json::from_value(value).context("Unexpected wal2json record layout")
}

impl Wal2JsonRecord {
    /// Row-level operation, `None` for transaction markers and messages.
    pub fn operation(&self) -> Option<Operation> {
        match self.action.as_str() {
            "I" => Some(Operation::Insert),
            "U" => Some(Operation::Update),
            "D" => Some(Operation::Delete),
            _ => None,
        }
    }

    pub fn is_begin(&self) -> bool {
        self.action == "B"
    }

    pub fn is_commit(&self) -> bool {
        self.action == "C"
    }

    /// Build the deltas for a row change; markers produce none.
    ///
    /// UPDATE carries `before` and `fields` only when the table's replica
    /// identity is FULL, since otherwise the old image is just the key. An
    /// UPDATE whose old key differs from the new one becomes a DELETE of the
    /// old key followed by an INSERT of the new row. `next_id` is called once
    /// per emitted delta.
    pub fn into_deltas(
        self,
        mut next_id: impl FnMut() -> u64,
        origin: &DeltaOrigin,
    ) -> Result<Vec<Delta>> {
        let Some(operation) = self.operation() else {
            return Ok(Vec::new());
        };
        let table = self
            .table
            .clone()
            .context("wal2json change is missing 'table'")?;
        let primary_key: Vec<String> = self.pk.iter().map(|k| k.name.clone()).collect();
        let after = to_row(&self.columns);
        let identity = to_row(&self.identity);

        let key_of = |row: &Row| -> Result<RowKey> {
            if primary_key.is_empty() {
                return Ok(RowKey::Content(fingerprint(row)));
            }
            RowKey::for_row(&primary_key, row).map_err(|column| {
                anyhow!("{operation} on '{table}' has no value for key column '{column}'")
            })
        };

        let deltas = match operation {
            Operation::Insert => {
                vec![Delta::insert(next_id(), origin, &table, key_of(&after)?, after)]
            }
            Operation::Update => {
                let key = key_of(&after)?;
                let full_identity = !identity.is_empty()
                    && self.columns.iter().all(|c| identity.contains_key(&c.name));
                // Without a primary key only a full old image identifies the row
                let old_key = if primary_key.is_empty() {
                    full_identity.then(|| RowKey::Content(fingerprint(&identity)))
                } else {
                    RowKey::for_row(&primary_key, &identity).ok()
                };
                match old_key {
                    Some(old_key) if old_key != key => vec![
                        Delta::delete(next_id(), origin, &table, old_key, identity),
                        Delta::insert(next_id(), origin, &table, key, after),
                    ],
                    _ => {
                        let before = full_identity.then_some(identity);
                        let fields = before.as_ref().map(|b| changed_fields(b, &after));
                        vec![Delta::update(next_id(), origin, &table, key, before, after, fields)]
                    }
                }
            }
            Operation::Delete => {
                if identity.is_empty() {
                    anyhow::bail!(
                        "DELETE on '{table}' carries no old key; set REPLICA IDENTITY on the table"
                    );
                }
                vec![Delta::delete(next_id(), origin, &table, key_of(&identity)?, identity)]
            }
        };
        Ok(deltas)
    }
}

fn to_row(columns: &[Wal2JsonColumn]) -> Row {
    columns
        .iter()
        .map(|c| (c.name.clone(), normalize(Some(&c.pg_type), c.value.clone())))
        .collect()
}
