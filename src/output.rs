//! Reading and writing snapshot and delta files.
//!
//! Everything is pretty-printed JSON, optionally gzip-compressed. Readers
//! detect compression from the gzip magic bytes, so a `--gzip` snapshot can be
//! passed back as `--base` without further flags.

use anyhow::Context;
use drift_core::Snapshot;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Serialize `value` to `path`, or stdout when no path is given.
pub fn write_json<T: Serialize>(value: &T, path: Option<&Path>, gzip: bool) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            write_to(value, BufWriter::new(file), gzip)
                .with_context(|| format!("Failed to write {}", path.display()))
        }
        None => write_to(value, io::stdout().lock(), gzip),
    }
}

/// Serialize `value` as pretty JSON into `writer`.
pub fn write_to<T: Serialize, W: Write>(value: &T, writer: W, gzip: bool) -> anyhow::Result<()> {
    if gzip {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        serde_json::to_writer_pretty(&mut encoder, value)?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = writer;
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    Ok(())
}

/// Load a snapshot file, compressed or not, and check its invariants.
pub fn read_snapshot(path: &Path) -> anyhow::Result<Snapshot> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let snapshot = read_snapshot_from(BufReader::new(file))
        .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
    Ok(snapshot)
}

pub fn read_snapshot_from<R: Read>(reader: R) -> anyhow::Result<Snapshot> {
    let bytes = decompress(reader)?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
    snapshot.validate()?;
    Ok(snapshot)
}

fn decompress<R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;
    if !raw.starts_with(&GZIP_MAGIC) {
        return Ok(raw);
    }
    let mut inflated = Vec::new();
    GzDecoder::new(raw.as_slice()).read_to_end(&mut inflated)?;
    Ok(inflated)
}
