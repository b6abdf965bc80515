//! Capabilities a source adapter can offer.

use crate::connection::Connection;
use crate::report::CaptureReport;
use async_trait::async_trait;
use drift_core::{Delta, Result};

/// One-shot capture of every table a source exposes.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Capture a complete snapshot.
    ///
    /// Failing to connect is an error. Failing to read an individual table is
    /// not: it is recorded in [`CaptureReport::failures`] and the table is left
    /// out of the snapshot.
    async fn capture_snapshot(&self, connection: &Connection) -> Result<CaptureReport>;
}

/// Live change capture.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Open the source's change feed. Returns once the feed is established.
    async fn start_capture(&self, connection: &Connection) -> Result<Box<dyn DeltaStream>>;
}

/// A lazy, possibly endless sequence of deltas from a live source.
///
/// Deltas touching the same table and key come out in source commit order.
#[async_trait]
pub trait DeltaStream: Send {
    /// Next delta. `None` means the source is exhausted or the stream was
    /// stopped and fully drained; an `Err` is terminal.
    ///
    /// Cancel safe: dropping the future before it completes loses nothing.
    async fn next(&mut self) -> Option<Result<Delta>>;

    /// Request a graceful shutdown.
    ///
    /// No fetch is issued after this returns, but a fetch already in flight is
    /// allowed to finish. Everything fetched so far stays available through
    /// [`DeltaStream::next`].
    async fn stop(&mut self) -> Result<()>;
}
