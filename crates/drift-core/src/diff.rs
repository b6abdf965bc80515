//! Snapshot diff engine.
//!
//! Pure computation over two immutable snapshots: no I/O and no suspension,
//! so independent pairs can be diffed concurrently.

use crate::delta::{Delta, DeltaOrigin, DeltaSet, DiffWarning};
use crate::error::Result;
use crate::fingerprint::fingerprint;
use crate::key::RowKey;
use crate::snapshot::{Snapshot, TableCapture};
use crate::values::{Row, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Attach the row fingerprint (`hash`) to every delta.
    pub fingerprint: bool,
    /// Timestamp stamped on every delta. Defaults to the time of the diff.
    pub timestamp: Option<DateTime<Utc>>,
}

impl DiffOptions {
    pub fn with_fingerprint(mut self, fingerprint: bool) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Compute the deltas that turn `base` into `current`.
///
/// Both snapshots are validated first; a malformed snapshot fails the whole
/// diff. Only tables present in `current` are compared. Tables missing from
/// `current` are reported as warnings and left to the caller.
///
/// Tables without a primary key are keyed by content, so a changed row shows
/// up as a DELETE of the old content plus an INSERT of the new content.
pub fn diff(base: &Snapshot, current: &Snapshot, options: &DiffOptions) -> Result<DeltaSet> {
    base.validate()?;
    current.validate()?;

    let origin = DeltaOrigin::new(
        current.source_name(),
        options.timestamp.unwrap_or_else(Utc::now),
    );
    let mut next_id = 1u64;
    let mut deltas = BTreeMap::new();
    let mut warnings = Vec::new();

    for table in base.tables.keys() {
        if !current.tables.contains_key(table) {
            warn!("Table '{table}' is in base but not in current; skipping");
            warnings.push(DiffWarning::TableMissingFromCurrent {
                table: table.clone(),
            });
        }
    }

    for (table, current_table) in &current.tables {
        let base_table = base.tables.get(table);
        if let Some(base_table) = base_table {
            if base_table.primary_key != current_table.primary_key {
                let warning = DiffWarning::PrimaryKeyMismatch {
                    table: table.clone(),
                    base: base_table.primary_key.clone(),
                    current: current_table.primary_key.clone(),
                };
                warn!("{warning}");
                warnings.push(warning);
            }
        }

        let table_deltas = diff_table(
            TableDiff {
                base_source: base.source_name(),
                table,
                origin: &origin,
                fingerprint: options.fingerprint,
            },
            base_table,
            current_table,
            &mut next_id,
        )?;
        debug!("Table '{table}': {} deltas", table_deltas.len());
        if !table_deltas.is_empty() {
            deltas.insert(table.clone(), table_deltas);
        }
    }

    Ok(DeltaSet {
        metadata: current.metadata.clone(),
        deltas,
        warnings,
    })
}

struct TableDiff<'a> {
    base_source: &'a str,
    table: &'a str,
    origin: &'a DeltaOrigin,
    fingerprint: bool,
}

fn diff_table(
    ctx: TableDiff<'_>,
    base: Option<&TableCapture>,
    current: &TableCapture,
    next_id: &mut u64,
) -> Result<Vec<Delta>> {
    // Key rule comes from current's table definition
    let primary_key = &current.primary_key;
    // Base rows written under another key may lack current's key columns
    let rekeyed = base.is_some_and(|b| &b.primary_key != primary_key);

    let mut base_order: Vec<(RowKey, &Row)> = Vec::new();
    let mut base_index: HashMap<RowKey, usize> = HashMap::new();
    if let Some(base) = base {
        for (position, row) in base.rows.iter().enumerate() {
            let key = if rekeyed {
                RowKey::for_row_or_null(primary_key, row)
            } else {
                RowKey::for_row(primary_key, row).map_err(|column| {
                    crate::Error::validation(
                        ctx.base_source,
                        ctx.table,
                        format!(
                            "base row {position} has no value for primary key column '{column}'"
                        ),
                    )
                })?
            };
            if base_index.contains_key(&key) {
                if key.is_content() {
                    // Identical rows without a key collapse into one identity
                    continue;
                }
                if !rekeyed {
                    return Err(crate::Error::validation(
                        ctx.base_source,
                        ctx.table,
                        format!(
                            "duplicate primary key {} in base",
                            crate::snapshot::describe_key(&key)
                        ),
                    ));
                }
                // Later base rows sharing a re-derived key are never matched
                base_order.push((key, row));
                continue;
            }
            base_index.insert(key.clone(), base_order.len());
            base_order.push((key, row));
        }
    }

    let mut matched = vec![false; base_order.len()];
    let mut seen_content: HashSet<RowKey> = HashSet::new();
    let mut out = Vec::new();

    for (key, row) in current.keyed_rows(ctx.origin.source.as_str(), ctx.table)? {
        if key.is_content() && !seen_content.insert(key.clone()) {
            // Identical rows without a key collapse into one identity
            continue;
        }
        let id = *next_id;
        match base_index.get(&key) {
            None => {
                let mut delta = Delta::insert(id, ctx.origin, ctx.table, key, row.clone());
                if ctx.fingerprint {
                    delta = delta.with_fingerprint(fingerprint(row));
                }
                out.push(delta);
                *next_id += 1;
            }
            Some(&position) => {
                matched[position] = true;
                let base_row = base_order[position].1;
                let fields = changed_fields(base_row, row);
                if !fields.is_empty() {
                    let mut delta = Delta::update(
                        id,
                        ctx.origin,
                        ctx.table,
                        key,
                        Some(base_row.clone()),
                        row.clone(),
                        Some(fields),
                    );
                    if ctx.fingerprint {
                        delta = delta.with_fingerprint(fingerprint(row));
                    }
                    out.push(delta);
                    *next_id += 1;
                }
            }
        }
    }

    for ((key, base_row), seen) in base_order.into_iter().zip(matched) {
        if seen {
            continue;
        }
        let mut delta = Delta::delete(*next_id, ctx.origin, ctx.table, key, base_row.clone());
        if ctx.fingerprint {
            delta = delta.with_fingerprint(fingerprint(base_row));
        }
        out.push(delta);
        *next_id += 1;
    }

    Ok(out)
}

/// Columns whose value differs between `before` and `after`, with the value
/// from `after`. A column present on only one side compares against `Null`.
pub fn changed_fields(before: &Row, after: &Row) -> Row {
    let columns: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    columns
        .into_iter()
        .filter_map(|column| {
            let old = before.get(column).unwrap_or(&Value::Null);
            let new = after.get(column).unwrap_or(&Value::Null);
            (old != new).then(|| (column.clone(), new.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::Operation;
    use crate::snapshot::SourceKind;
    use serde_json::json;

    fn snapshot(tables: &[(&str, Vec<&str>, serde_json::Value)]) -> Snapshot {
        let mut builder = Snapshot::builder("postgres://test", SourceKind::Postgres);
        for (name, pk, rows) in tables {
            let capture = TableCapture::new(
                BTreeMap::new(),
                pk.iter().map(|s| s.to_string()).collect(),
                serde_json::from_value(rows.clone()).unwrap(),
            );
            builder.table(*name, capture).unwrap();
        }
        builder.build()
    }

    #[test]
    fn changed_fields_covers_removed_columns() {
        let before: Row = serde_json::from_value(json!({"id": 1, "a": 1, "gone": "x"})).unwrap();
        let after: Row = serde_json::from_value(json!({"id": 1, "a": 2})).unwrap();
        let fields = changed_fields(&before, &after);
        assert_eq!(
            fields,
            serde_json::from_value::<Row>(json!({"a": 2, "gone": null})).unwrap()
        );
    }

    #[test]
    fn primary_key_mismatch_warns_and_uses_current() {
        let base = snapshot(&[("t", vec!["id"], json!([{"id": 1, "code": "a"}]))]);
        let current = snapshot(&[("t", vec!["code"], json!([{"id": 1, "code": "a"}]))]);
        let set = diff(&base, &current, &DiffOptions::default()).unwrap();
        assert!(set.is_empty());
        assert_eq!(
            set.warnings,
            vec![DiffWarning::PrimaryKeyMismatch {
                table: "t".into(),
                base: vec!["id".into()],
                current: vec!["code".into()],
            }]
        );
    }

    #[test]
    fn base_rows_missing_current_key_column_are_keyed_by_null() {
        let base = snapshot(&[("t", vec!["id"], json!([{"id": 1}, {"id": 2}]))]);
        let current = snapshot(&[("t", vec!["uuid"], json!([{"uuid": "a", "id": 1}]))]);
        let set = diff(&base, &current, &DiffOptions::default()).unwrap();

        assert_eq!(
            set.warnings,
            vec![DiffWarning::PrimaryKeyMismatch {
                table: "t".into(),
                base: vec!["id".into()],
                current: vec!["uuid".into()],
            }]
        );
        let ops: Vec<Operation> = set.iter().map(|d| d.operation).collect();
        assert_eq!(
            ops,
            vec![Operation::Insert, Operation::Delete, Operation::Delete]
        );
        let deleted = &set.table("t")[1];
        assert_eq!(
            deleted.key.columns(),
            &[("uuid".to_string(), Value::Null)][..]
        );
        assert_eq!(deleted.before.as_ref().unwrap()["id"], Value::from(1));
    }

    #[test]
    fn rekeyed_base_row_matching_current_is_an_update() {
        let base = snapshot(&[("t", vec!["id"], json!([{"id": 1, "code": "a", "v": 1}]))]);
        let current = snapshot(&[("t", vec!["code"], json!([{"id": 1, "code": "a", "v": 2}]))]);
        let set = diff(&base, &current, &DiffOptions::default()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.count(Operation::Update), 1);
        assert_eq!(set.warnings.len(), 1);
    }

    #[test]
    fn missing_table_in_current_is_a_warning() {
        let base = snapshot(&[("old", vec!["id"], json!([{"id": 1}]))]);
        let current = snapshot(&[]);
        let set = diff(&base, &current, &DiffOptions::default()).unwrap();
        assert!(set.is_empty());
        assert_eq!(
            set.warnings,
            vec![DiffWarning::TableMissingFromCurrent {
                table: "old".into()
            }]
        );
    }

    #[test]
    fn ids_are_monotonic_across_tables() {
        let base = snapshot(&[]);
        let current = snapshot(&[
            ("a", vec!["id"], json!([{"id": 1}, {"id": 2}])),
            ("b", vec!["id"], json!([{"id": 1}])),
        ]);
        let set = diff(&base, &current, &DiffOptions::default()).unwrap();
        let ids: Vec<u64> = set.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(set.count(Operation::Insert), 3);
    }

    #[test]
    fn fingerprints_are_attached_on_request() {
        let base = snapshot(&[("t", vec!["id"], json!([{"id": 1, "v": 1}, {"id": 2}]))]);
        let current = snapshot(&[("t", vec!["id"], json!([{"id": 1, "v": 2}, {"id": 3}]))]);
        let options = DiffOptions::default().with_fingerprint(true);
        let set = diff(&base, &current, &options).unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.iter().all(|d| d.fingerprint.is_some()));

        let delete = set.iter().find(|d| d.operation == Operation::Delete).unwrap();
        let base_row = &base.tables["t"].rows[1];
        assert_eq!(delete.fingerprint.as_ref(), Some(&fingerprint(base_row)));
    }

    #[test]
    fn content_duplicates_collapse() {
        let base = snapshot(&[("log", vec![], json!([{"a": 1}, {"a": 1}]))]);
        let current = snapshot(&[("log", vec![], json!([{"a": 2}, {"a": 2}, {"a": 1}]))]);
        let set = diff(&base, &current, &DiffOptions::default()).unwrap();
        assert_eq!(set.count(Operation::Insert), 1);
        assert_eq!(set.count(Operation::Delete), 0);
    }

    #[test]
    fn malformed_snapshot_fails_fast() {
        let base = snapshot(&[("t", vec!["id"], json!([{"id": 1}]))]);
        let mut current = snapshot(&[("t", vec!["id"], json!([{"id": 1}]))]);
        current.metadata.row_count.insert("t".into(), 3);
        assert!(diff(&base, &current, &DiffOptions::default()).is_err());
    }
}
