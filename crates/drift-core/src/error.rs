//! Error kinds surfaced by the engine and by source adapters.
//!
//! Each kind names the source it came from and, where one is involved, the
//! table. Underlying causes are kept as boxed errors so callers can log the
//! whole chain verbatim. Nothing in this workspace retries on any of these.

use thiserror::Error;

/// Boxed underlying cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    /// The source could not be reached or refused the credentials.
    #[error("connection to {source_name} failed: {cause}")]
    Connection {
        source_name: String,
        #[source]
        cause: BoxError,
    },

    /// Reading a table (or the table list) failed.
    #[error("capture of table '{table}' from {source_name} failed: {cause}")]
    Capture {
        source_name: String,
        table: String,
        #[source]
        cause: BoxError,
    },

    /// A snapshot handed to the diff engine is malformed or inconsistent.
    #[error("invalid snapshot from {source_name}, table '{table}': {reason}")]
    Validation {
        source_name: String,
        table: String,
        reason: String,
    },

    /// A live stream failed after it was started.
    #[error("stream from {source_name} failed{}: {cause}", table_suffix(.table))]
    Stream {
        source_name: String,
        table: Option<String>,
        #[source]
        cause: BoxError,
    },

    /// No adapter is registered for the connection scheme.
    #[error("unsupported connection scheme '{scheme}' in {source_name}")]
    UnsupportedSource { source_name: String, scheme: String },
}

fn table_suffix(table: &Option<String>) -> String {
    match table {
        Some(t) => format!(" on table '{t}'"),
        None => String::new(),
    }
}

impl Error {
    pub fn connection(source_name: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Error::Connection {
            source_name: source_name.into(),
            cause: cause.into(),
        }
    }

    pub fn capture(
        source_name: impl Into<String>,
        table: impl Into<String>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Error::Capture {
            source_name: source_name.into(),
            table: table.into(),
            cause: cause.into(),
        }
    }

    pub fn validation(
        source_name: impl Into<String>,
        table: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Validation {
            source_name: source_name.into(),
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn stream(
        source_name: impl Into<String>,
        table: Option<String>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Error::Stream {
            source_name: source_name.into(),
            table,
            cause: cause.into(),
        }
    }

    pub fn unsupported_source(source_name: impl Into<String>, scheme: impl Into<String>) -> Self {
        Error::UnsupportedSource {
            source_name: source_name.into(),
            scheme: scheme.into(),
        }
    }

    /// Source identifier carried by every kind.
    pub fn source_name(&self) -> &str {
        match self {
            Error::Connection { source_name, .. }
            | Error::Capture { source_name, .. }
            | Error::Validation { source_name, .. }
            | Error::Stream { source_name, .. }
            | Error::UnsupportedSource { source_name, .. } => source_name,
        }
    }

    /// Table the error relates to, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            Error::Capture { table, .. } | Error::Validation { table, .. } => Some(table),
            Error::Stream { table, .. } => table.as_deref(),
            Error::Connection { .. } | Error::UnsupportedSource { .. } => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
