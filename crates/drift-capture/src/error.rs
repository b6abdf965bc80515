use crate::session::SessionState;
use drift_core::BoxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation is not allowed in the session's current state.
    #[error("cannot {operation} a capture session that is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// The source failed to start or failed mid-stream. Terminal.
    #[error(transparent)]
    Source(#[from] drift_core::Error),

    /// The sink rejected a delta or failed to flush.
    #[error("sink for {source_name} failed: {cause}")]
    Sink {
        source_name: String,
        #[source]
        cause: BoxError,
    },
}
