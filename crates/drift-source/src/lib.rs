//! Source adapter contract for drift.
//!
//! An adapter implements [`SnapshotSource`], [`StreamSource`], or both. The
//! caller resolves a connection string to a [`Connection`] first, which pins
//! down the [`drift_core::SourceKind`] from the scheme alone.
//!
//! Live adapters usually build their [`DeltaStream`] with
//! [`WorkerStream::spawn`], which runs a fetch loop on a background task and
//! takes care of buffering, stop requests and draining.

pub mod connection;
pub mod report;
pub mod source;
pub mod worker;

pub use connection::Connection;
pub use report::{CaptureReport, ReportBuilder};
pub use source::{DeltaStream, SnapshotSource, StreamSource};
pub use worker::{DeltaSender, WorkerStream};
