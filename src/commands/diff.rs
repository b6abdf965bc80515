//! `drift diff`: compare two saved snapshots.

use crate::{output, OutputOpts};
use drift_core::{diff, DeltaSet, DiffOptions};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct DiffArgs {
    pub base: PathBuf,
    pub current: PathBuf,
    pub hash: bool,
    pub output: OutputOpts,
}

pub fn run(args: DiffArgs) -> anyhow::Result<()> {
    let deltas = diff_files(&args.base, &args.current, args.hash)?;
    output::write_json(&deltas, args.output.out.as_deref(), args.output.gzip)
}

/// Load both snapshot files and diff them.
pub fn diff_files(base: &Path, current: &Path, hash: bool) -> anyhow::Result<DeltaSet> {
    let base = output::read_snapshot(base)?;
    let current = output::read_snapshot(current)?;
    let deltas = diff(&base, &current, &DiffOptions::default().with_fingerprint(hash))?;
    info!(
        "Found {} deltas ({} warnings)",
        deltas.len(),
        deltas.warnings.len()
    );
    Ok(deltas)
}
