//! Result of a one-shot snapshot capture.

use drift_core::{BoxError, Error, Result, Snapshot, SnapshotBuilder, TableCapture};
use tracing::{debug, warn};

/// A captured snapshot plus the tables that could not be read.
///
/// Failed tables are absent from `snapshot`. The caller decides whether a
/// partial snapshot is acceptable: [`CaptureReport::require_complete`] turns
/// the first failure into the error, [`CaptureReport::into_parts`] hands both
/// halves over.
#[derive(Debug)]
pub struct CaptureReport {
    pub snapshot: Snapshot,
    pub failures: Vec<Error>,
}

impl CaptureReport {
    pub fn complete(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            failures: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// The snapshot, or the first table failure if there was any.
    pub fn require_complete(self) -> Result<Snapshot> {
        let mut failures = self.failures.into_iter();
        match failures.next() {
            None => Ok(self.snapshot),
            Some(first) => {
                for other in failures {
                    warn!("{other}");
                }
                Err(first)
            }
        }
    }

    pub fn into_parts(self) -> (Snapshot, Vec<Error>) {
        (self.snapshot, self.failures)
    }
}

/// Collects per-table results into a [`CaptureReport`].
///
/// Adapters read tables one at a time and hand each outcome to
/// [`ReportBuilder::record`]; a failed read is kept as a `Capture` error
/// instead of aborting the whole capture.
#[derive(Debug)]
pub struct ReportBuilder {
    builder: SnapshotBuilder,
    failures: Vec<Error>,
}

impl ReportBuilder {
    pub fn new(builder: SnapshotBuilder) -> Self {
        Self {
            builder,
            failures: Vec::new(),
        }
    }

    pub fn record<E>(&mut self, table: &str, outcome: std::result::Result<TableCapture, E>)
    where
        E: Into<BoxError>,
    {
        let outcome = outcome
            .map_err(|cause| Error::capture(self.builder.source_name(), table, cause))
            .and_then(|capture| {
                let rows = capture.rows.len();
                self.builder.table(table, capture).map(|()| rows)
            });
        match outcome {
            Ok(rows) => debug!("Captured {rows} rows from '{table}'"),
            Err(e) => {
                warn!("{e}");
                self.failures.push(e);
            }
        }
    }

    pub fn failures(&self) -> usize {
        self.failures.len()
    }

    pub fn finish(self) -> CaptureReport {
        CaptureReport {
            snapshot: self.builder.build(),
            failures: self.failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_core::SourceKind;
    use serde_json::json;

    fn capture(rows: serde_json::Value) -> TableCapture {
        TableCapture::new(
            Default::default(),
            vec!["id".into()],
            serde_json::from_value(rows).unwrap(),
        )
    }

    #[test]
    fn test_failed_tables_are_reported_individually() {
        let mut report = ReportBuilder::new(Snapshot::builder("pg://x", SourceKind::Postgres));
        report.record::<BoxError>("users", Ok(capture(json!([{"id": 1}]))));
        report.record("secret", Err(anyhow::anyhow!("permission denied for table secret")));
        report.record::<BoxError>("dupes", Ok(capture(json!([{"id": 1}, {"id": 1}]))));
        assert_eq!(report.failures(), 2);

        let report = report.finish();
        assert!(!report.is_complete());
        assert_eq!(report.snapshot.tables.len(), 1);
        assert_eq!(report.snapshot.metadata.row_count["users"], 1);

        let tables: Vec<_> = report.failures.iter().filter_map(|e| e.table()).collect();
        assert_eq!(tables, vec!["secret", "dupes"]);
    }

    #[test]
    fn test_require_complete_surfaces_first_failure() {
        let mut report = ReportBuilder::new(Snapshot::builder("pg://x", SourceKind::Postgres));
        report.record("a", Err(anyhow::anyhow!("boom")));
        report.record("b", Err(anyhow::anyhow!("bang")));
        let err = report.finish().require_complete().unwrap_err();
        assert!(matches!(err, Error::Capture { ref table, .. } if table == "a"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_complete_report_yields_snapshot() {
        let mut report = ReportBuilder::new(Snapshot::builder("pg://x", SourceKind::Postgres));
        report.record::<BoxError>("users", Ok(capture(json!([]))));
        let snapshot = report.finish().require_complete().unwrap();
        assert!(snapshot.tables.contains_key("users"));
    }

    #[test]
    fn test_into_parts_keeps_partial_snapshot() {
        let mut report = ReportBuilder::new(Snapshot::builder("pg://x", SourceKind::Postgres));
        report.record::<BoxError>("ok", Ok(capture(json!([{"id": 1}]))));
        report.record("bad", Err(anyhow::anyhow!("timeout")));
        let (snapshot, failures) = report.finish().into_parts();
        assert_eq!(snapshot.total_rows(), 1);
        assert_eq!(failures.len(), 1);
        snapshot.validate().unwrap();
    }
}
