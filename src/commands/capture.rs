//! `drift capture`: snapshot a database, optionally diffing against a base.

use crate::{output, OutputOpts, SourceAdapter, SourceOpts};
use anyhow::Context;
use drift_core::{diff, DiffOptions};
use drift_source::Connection;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CaptureArgs {
    pub source: SourceOpts,
    pub output: OutputOpts,
    /// Emit the deltas from this snapshot to the new capture instead of the
    /// snapshot itself.
    pub base: Option<PathBuf>,
    /// Tag rows (or deltas) with content fingerprints
    pub hash: bool,
    /// Write the snapshot even if some tables failed to capture
    pub allow_partial: bool,
}

pub async fn run(args: CaptureArgs) -> anyhow::Result<()> {
    let config = args.source.load_config()?;
    let connection = Connection::parse(&args.source.connection)?;
    info!("Capturing snapshot from {} source", connection.kind());

    let adapter = SourceAdapter::for_connection(&connection, &config);
    let report = adapter.capture_snapshot(&connection).await?;
    let snapshot = if args.allow_partial {
        let (snapshot, failures) = report.into_parts();
        for failure in &failures {
            warn!("Skipped table: {failure}");
        }
        snapshot
    } else {
        report.require_complete()?
    };
    info!(
        "Captured {} rows across {} tables",
        snapshot.total_rows(),
        snapshot.tables.len()
    );

    match &args.base {
        Some(base_path) => {
            let base = output::read_snapshot(base_path)?;
            let deltas = diff(
                &base,
                &snapshot,
                &DiffOptions::default().with_fingerprint(args.hash),
            )
            .with_context(|| format!("Failed to diff against {}", base_path.display()))?;
            info!("Found {} deltas", deltas.len());
            output::write_json(&deltas, args.output.out.as_deref(), args.output.gzip)?;
        }
        None if args.hash => {
            output::write_json(
                &snapshot.with_fingerprints(),
                args.output.out.as_deref(),
                args.output.gzip,
            )?;
        }
        None => output::write_json(&snapshot, args.output.out.as_deref(), args.output.gzip)?,
    }

    if let Some(path) = &args.output.out {
        info!("Output written to {}", path.display());
    }
    Ok(())
}
