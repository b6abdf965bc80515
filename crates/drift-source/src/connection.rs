//! Connection descriptors.
//!
//! A descriptor is an opaque `scheme://...` string. Only the scheme token is
//! inspected here, to pick the source kind; everything after `://` belongs to
//! the adapter that ends up handling it.

use drift_core::{Error, Result, SourceKind};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    raw: String,
    kind: SourceKind,
}

impl Connection {
    /// Parse a descriptor, resolving its scheme to a known [`SourceKind`].
    ///
    /// Fails with `UnsupportedSource` when the descriptor has no scheme or the
    /// scheme matches no known source.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let scheme = scheme_of(&raw).to_ascii_lowercase();
        match SourceKind::from_scheme(&scheme) {
            Some(kind) => Ok(Self { raw, kind }),
            None => Err(Error::unsupported_source(raw, scheme)),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// The scheme token as written, e.g. `postgresql`.
    pub fn scheme(&self) -> &str {
        scheme_of(&self.raw)
    }

    /// The full descriptor, handed verbatim to the database driver.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Identifier stamped on snapshots, deltas and errors.
    pub fn source_name(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for Connection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Connection::parse(s)
    }
}

fn scheme_of(raw: &str) -> &str {
    raw.split_once("://").map(|(scheme, _)| scheme).unwrap_or("")
}
