//! Live capture sessions.
//!
//! A [`CaptureSession`] binds a [`drift_source::StreamSource`] to a
//! [`DeltaSink`] and manages the stream's lifecycle: starting it, forwarding
//! every delta in order with a bounded in-flight window, draining on stop, and
//! surfacing source failures as terminal errors. Nothing here retries.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use drift_capture::{CaptureSession, MemorySink, SessionConfig};
//! # use drift_source::{Connection, StreamSource};
//! # async fn demo(source: Arc<dyn StreamSource>) -> anyhow::Result<()> {
//! let connection = Connection::parse("postgresql://localhost/app")?;
//! let mut session = CaptureSession::new(source, connection, SessionConfig::default());
//! let sink = MemorySink::new();
//! session.start(sink.clone()).await?;
//! // ...
//! let report = session.stop().await?;
//! assert_eq!(report.forwarded as usize, sink.len());
//! # Ok(())
//! # }
//! ```

mod error;
mod session;
mod sink;

pub use error::SessionError;
pub use session::{CaptureSession, SessionConfig, SessionReport, SessionState, StopHandle};
pub use sink::{ChannelSink, DeltaSink, MemorySink};
