//! Replaying a delta set onto a snapshot.

use crate::delta::{Delta, DeltaSet, Operation};
use crate::error::{Error, Result};
use crate::key::RowKey;
use crate::snapshot::{describe_key, Snapshot, TableCapture};
use crate::values::Row;
use std::collections::HashMap;

impl Snapshot {
    /// Produce the snapshot obtained by applying `deltas` to this one.
    ///
    /// Deltas are applied table by table in their stored order. An INSERT of
    /// an existing primary key, or an UPDATE/DELETE of a key that is not
    /// present, is a validation error. Row fingerprints are not carried over.
    pub fn apply(&self, deltas: &DeltaSet) -> Result<Snapshot> {
        let mut next = self.clone();
        for (table, table_deltas) in &deltas.deltas {
            let capture = next
                .tables
                .entry(table.clone())
                .or_insert_with(|| new_table_for(table_deltas));
            capture.fingerprints = None;

            let mut rows = IndexedRows::new(&self.metadata.source_name, table, capture)?;
            for delta in table_deltas {
                rows.apply(delta)?;
            }
            capture.rows = rows.into_rows();
        }
        next.metadata.row_count = next
            .tables
            .iter()
            .map(|(name, capture)| (name.clone(), capture.rows.len()))
            .collect();
        Ok(next)
    }
}

fn new_table_for(deltas: &[Delta]) -> TableCapture {
    let primary_key = deltas
        .first()
        .map(|d| d.key.columns().iter().map(|(name, _)| name.clone()).collect())
        .unwrap_or_default();
    TableCapture::new(Default::default(), primary_key, Vec::new())
}

/// Rows of one table with a key index built once up front.
///
/// Deleted rows leave an empty slot so positions stay valid; the surviving
/// rows keep their original order.
struct IndexedRows<'a> {
    source_name: &'a str,
    table: &'a str,
    primary_key: Vec<String>,
    slots: Vec<Option<Row>>,
    index: HashMap<RowKey, Vec<usize>>,
}

impl<'a> IndexedRows<'a> {
    fn new(source_name: &'a str, table: &'a str, capture: &mut TableCapture) -> Result<Self> {
        let mut rows = IndexedRows {
            source_name,
            table,
            primary_key: capture.primary_key.clone(),
            slots: Vec::with_capacity(capture.rows.len()),
            index: HashMap::new(),
        };
        for row in std::mem::take(&mut capture.rows) {
            rows.push(row)?;
        }
        Ok(rows)
    }

    fn key_of(&self, position: usize, row: &Row) -> Result<RowKey> {
        RowKey::for_row(&self.primary_key, row).map_err(|column| {
            Error::validation(
                self.source_name,
                self.table,
                format!("row {position} has no value for primary key column '{column}'"),
            )
        })
    }

    fn push(&mut self, row: Row) -> Result<()> {
        let position = self.slots.len();
        let key = self.key_of(position, &row)?;
        self.index.entry(key).or_default().push(position);
        self.slots.push(Some(row));
        Ok(())
    }

    fn apply(&mut self, delta: &Delta) -> Result<()> {
        let existing = self.index.get(&delta.key).filter(|p| !p.is_empty());
        match delta.operation {
            Operation::Insert => {
                let row = delta.after.clone().ok_or_else(|| {
                    Error::validation(self.source_name, self.table, "INSERT without a row image")
                })?;
                match existing {
                    Some(_) if !delta.key.is_content() => {
                        return Err(Error::validation(
                            self.source_name,
                            self.table,
                            format!("INSERT of existing key {}", describe_key(&delta.key)),
                        ));
                    }
                    Some(_) => {}
                    None => self.push(row)?,
                }
            }
            Operation::Update => {
                let position = *existing
                    .and_then(|p| p.first())
                    .ok_or_else(|| self.missing(delta))?;
                let Some(row) = self.slots[position].as_mut() else {
                    return Err(self.missing(delta));
                };
                match (&delta.fields, &delta.after) {
                    (Some(fields), _) => merge(row, fields),
                    (None, Some(after)) => *row = after.clone(),
                    (None, None) => return Ok(()),
                }
                let row = row.clone();
                self.reindex(&delta.key, position, &row)?;
            }
            Operation::Delete => {
                let positions = self
                    .index
                    .remove(&delta.key)
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| self.missing(delta))?;
                for position in positions {
                    self.slots[position] = None;
                }
            }
        }
        Ok(())
    }

    /// Move `position` from `old` to the key of its updated contents.
    fn reindex(&mut self, old: &RowKey, position: usize, row: &Row) -> Result<()> {
        let new = self.key_of(position, row)?;
        if &new == old {
            return Ok(());
        }
        if let Some(positions) = self.index.get_mut(old) {
            positions.retain(|p| *p != position);
            if positions.is_empty() {
                self.index.remove(old);
            }
        }
        self.index.entry(new).or_default().push(position);
        Ok(())
    }

    fn missing(&self, delta: &Delta) -> Error {
        Error::validation(
            self.source_name,
            self.table,
            format!("{} of missing key {}", delta.operation, describe_key(&delta.key)),
        )
    }

    fn into_rows(self) -> Vec<Row> {
        self.slots.into_iter().flatten().collect()
    }
}

fn merge(row: &mut Row, fields: &Row) {
    for (column, value) in fields {
        row.insert(column.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use crate::diff::{diff, DiffOptions};
    use crate::snapshot::{Snapshot, SourceKind, TableCapture};
    use serde_json::json;

    fn snapshot(pk: &[&str], rows: serde_json::Value) -> Snapshot {
        let mut builder = Snapshot::builder("src", SourceKind::Postgres);
        builder
            .table(
                "t",
                TableCapture::new(
                    Default::default(),
                    pk.iter().map(|s| s.to_string()).collect(),
                    serde_json::from_value(rows).unwrap(),
                ),
            )
            .unwrap();
        builder.build()
    }

    #[test]
    fn applying_a_diff_reaches_current() {
        let base = snapshot(&["id"], json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}]));
        let current = snapshot(&["id"], json!([{"id": 1, "v": "z"}, {"id": 3, "v": "c"}]));
        let set = diff(&base, &current, &DiffOptions::default()).unwrap();

        let replayed = base.apply(&set).unwrap();
        replayed.validate().unwrap();
        assert!(diff(&current, &replayed, &DiffOptions::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn applying_many_deltas_to_a_large_table() {
        let ids: Vec<_> = (0..2000).map(|id| json!({"id": id, "v": 0})).collect();
        let base = snapshot(&["id"], json!(ids));
        let changed: Vec<_> = (0..2000)
            .filter(|id| id % 3 != 0)
            .map(|id| json!({"id": id, "v": id % 2}))
            .chain((2000..2100).map(|id| json!({"id": id, "v": 1})))
            .collect();
        let current = snapshot(&["id"], json!(changed));
        let set = diff(&base, &current, &DiffOptions::default()).unwrap();

        let replayed = base.apply(&set).unwrap();
        replayed.validate().unwrap();
        assert_eq!(replayed.tables["t"].rows.len(), current.tables["t"].rows.len());
        assert!(diff(&current, &replayed, &DiffOptions::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn update_that_changes_key_columns_is_reindexed() {
        let base = snapshot(&["id"], json!([{"id": 1, "v": "a"}]));
        let mut set = diff(&base, &snapshot(&["id"], json!([])), &DiffOptions::default()).unwrap();
        // turn the DELETE into an UPDATE moving the row to id 2, then delete id 2
        let mut moved = set.deltas["t"][0].clone();
        moved.operation = crate::delta::Operation::Update;
        moved.fields = Some(serde_json::from_value(json!({"id": 2})).unwrap());
        let mut gone = set.deltas["t"][0].clone();
        gone.key = crate::key::RowKey::Columns(vec![("id".into(), 2.into())]);
        set.deltas.insert("t".into(), vec![moved, gone]);

        let replayed = base.apply(&set).unwrap();
        assert!(replayed.tables["t"].rows.is_empty());
    }

    #[test]
    fn deleting_a_missing_key_fails() {
        let base = snapshot(&["id"], json!([{"id": 1}]));
        let current = snapshot(&["id"], json!([]));
        let set = diff(&base, &current, &DiffOptions::default()).unwrap();
        let empty = snapshot(&["id"], json!([]));
        assert!(empty.apply(&set).is_err());
    }

    #[test]
    fn inserting_an_existing_key_fails() {
        let base = snapshot(&["id"], json!([]));
        let current = snapshot(&["id"], json!([{"id": 1}]));
        let set = diff(&base, &current, &DiffOptions::default()).unwrap();
        assert!(current.apply(&set).is_err());
    }
}
