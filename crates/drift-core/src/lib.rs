//! Core types and algorithms for drift.
//!
//! This crate holds everything that does not touch a database:
//!
//! - [`Value`] / [`Row`] - the canonical value representation adapters normalize into
//! - [`Snapshot`] - a complete capture of a source's tables
//! - [`fingerprint`] - deterministic content hashing of rows
//! - [`diff`] - the snapshot diff engine producing a [`DeltaSet`]
//! - [`Delta`] - a single row-level change, shared with live capture
//! - [`Error`] - the error kinds every layer surfaces
//!
//! # Architecture
//!
//! ```text
//! drift-core (this crate)
//!    │
//!    ├─── drift-source       (adapter contract, builds on Snapshot/Delta)
//!    │       ├─── drift-postgresql
//!    │       ├─── drift-mysql
//!    │       └─── drift-mongodb
//!    │
//!    └─── drift-capture      (live capture sessions)
//! ```
//!
//! # Example
//!
//! ```rust
//! use drift_core::{diff, DiffOptions, Snapshot, SourceKind, TableCapture};
//!
//! let table = |rows: serde_json::Value| {
//!     TableCapture::new(Default::default(), vec!["id".into()], serde_json::from_value(rows).unwrap())
//! };
//!
//! let mut base = Snapshot::builder("postgres://db", SourceKind::Postgres);
//! base.table("users", table(serde_json::json!([{"id": 1, "name": "Alice"}]))).unwrap();
//!
//! let mut current = Snapshot::builder("postgres://db", SourceKind::Postgres);
//! current.table("users", table(serde_json::json!([{"id": 1, "name": "Bob"}]))).unwrap();
//!
//! let deltas = diff(&base.build(), &current.build(), &DiffOptions::default()).unwrap();
//! assert_eq!(deltas.len(), 1);
//! ```

mod apply;
pub mod delta;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod key;
pub mod snapshot;
pub mod values;

pub use delta::{Delta, DeltaEntry, DeltaOrigin, DeltaSet, DiffWarning, Operation};
pub use diff::{changed_fields, diff, DiffOptions};
pub use error::{BoxError, Error, Result};
pub use fingerprint::{fingerprint, Fingerprint};
pub use key::RowKey;
pub use snapshot::{Snapshot, SnapshotBuilder, SnapshotMetadata, SourceKind, TableCapture};
pub use values::{parse_timestamp, Row, Value};
