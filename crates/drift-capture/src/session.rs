//! Capture session lifecycle.
//!
//! ```text
//! Idle ──start()──▶ Capturing ──stop() / exhaustion──▶ Draining ──▶ Stopped
//!   │                   │
//!   └──stop()───────────┴──source error──────────────────────────▶ Stopped
//! ```
//!
//! A session is single use: once `Stopped` it never captures again.

use crate::error::SessionError;
use crate::sink::DeltaSink;
use drift_core::{BoxError, Delta, Error};
use drift_source::{Connection, DeltaStream, StreamSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Capturing,
    Draining,
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Capturing => "capturing",
            SessionState::Draining => "draining",
            SessionState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Deltas pulled from the source but not yet taken by the sink. The
    /// session stops pulling while the window is full.
    pub window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { window: 256 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// Deltas the sink accepted.
    pub forwarded: u64,
    pub state: SessionState,
}

/// Stops a session from outside, e.g. from a signal handler.
#[derive(Debug, Clone)]
pub struct StopHandle(CancellationToken);

impl StopHandle {
    pub fn stop(&self) {
        self.0.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Drives one live stream into one sink.
pub struct CaptureSession {
    source: Arc<dyn StreamSource>,
    connection: Connection,
    config: SessionConfig,
    state: Arc<watch::Sender<SessionState>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<SessionReport, SessionError>>>,
    forwarded: u64,
}

impl CaptureSession {
    pub fn new(source: Arc<dyn StreamSource>, connection: Connection, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            source,
            connection,
            config,
            state: Arc::new(state),
            cancel: CancellationToken::new(),
            task: None,
            forwarded: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.cancel.clone())
    }

    /// Open the source's stream and start forwarding into `sink`.
    ///
    /// Returns once the stream is established; forwarding continues in the
    /// background until [`CaptureSession::stop`] or the stream ends. A
    /// failure to open the stream leaves the session `Stopped`.
    pub async fn start<S>(&mut self, sink: S) -> Result<(), SessionError>
    where
        S: DeltaSink + 'static,
    {
        let state = self.state();
        if state != SessionState::Idle {
            return Err(SessionError::InvalidState {
                operation: "start",
                state,
            });
        }
        if self.cancel.is_cancelled() {
            info!("Capture session for {} stopped before start", self.connection);
            self.state.send_replace(SessionState::Stopped);
            return Ok(());
        }

        let stream = match self.source.start_capture(&self.connection).await {
            Ok(stream) => stream,
            Err(e) => {
                self.state.send_replace(SessionState::Stopped);
                return Err(e.into());
            }
        };

        info!("Capture session for {} started", self.connection);
        self.state.send_replace(SessionState::Capturing);
        self.task = Some(tokio::spawn(run(
            stream,
            sink,
            self.config.window.max(1),
            self.cancel.clone(),
            Arc::clone(&self.state),
            self.connection.source_name().to_string(),
        )));
        Ok(())
    }

    /// Stop capturing, deliver everything already pulled, and wait for the
    /// session to reach `Stopped`.
    ///
    /// Stopping an idle session moves it straight to `Stopped`. Stopping a
    /// stopped session returns its final report again.
    pub async fn stop(&mut self) -> Result<SessionReport, SessionError> {
        self.cancel.cancel();
        if self.state() == SessionState::Idle {
            info!("Capture session for {} stopped before start", self.connection);
            self.state.send_replace(SessionState::Stopped);
        }
        self.wait().await
    }

    /// Wait until the stream is exhausted, fails, or is stopped.
    pub async fn wait(&mut self) -> Result<SessionReport, SessionError> {
        let Some(task) = self.task.take() else {
            let state = self.state();
            if state == SessionState::Idle {
                return Err(SessionError::InvalidState {
                    operation: "wait on",
                    state,
                });
            }
            return Ok(SessionReport {
                forwarded: self.forwarded,
                state,
            });
        };

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(Error::stream(self.connection.source_name(), None, e).into()),
        };
        self.state.send_replace(SessionState::Stopped);
        if let Ok(report) = &outcome {
            self.forwarded = report.forwarded;
        }
        outcome
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum Exit {
    Cancelled,
    Exhausted,
    Failed(Error),
    SinkClosed,
}

async fn run<S>(
    mut stream: Box<dyn DeltaStream>,
    sink: S,
    window: usize,
    cancel: CancellationToken,
    state: Arc<watch::Sender<SessionState>>,
    source_name: String,
) -> Result<SessionReport, SessionError>
where
    S: DeltaSink + 'static,
{
    let (tx, rx) = mpsc::channel::<Delta>(window);
    let forwarder = tokio::spawn(forward(sink, rx, source_name.clone()));

    let exit = loop {
        // Hold a window slot before pulling so a lagging sink stalls the pull
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Exit::Cancelled,
            permit = tx.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => break Exit::SinkClosed,
            },
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break Exit::Cancelled,
            _ = tx.closed() => break Exit::SinkClosed,
            item = stream.next() => match item {
                Some(Ok(delta)) => {
                    debug!("Forwarding delta {} on '{}'", delta.id, delta.table);
                    permit.send(delta);
                }
                Some(Err(e)) => break Exit::Failed(e),
                None => break Exit::Exhausted,
            },
        }
    };

    let mut failure = None;
    match exit {
        Exit::Cancelled => {
            info!("Draining capture session for {source_name}");
            state.send_replace(SessionState::Draining);
            if let Err(e) = stream.stop().await {
                failure = Some(e);
            }
            while let Some(item) = stream.next().await {
                match item {
                    Ok(delta) => {
                        if tx.send(delta).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        failure.get_or_insert(e);
                        break;
                    }
                }
            }
        }
        Exit::Exhausted => {
            info!("Stream from {source_name} is exhausted");
            state.send_replace(SessionState::Draining);
        }
        Exit::Failed(e) => {
            warn!("Stream from {source_name} failed: {e}");
            state.send_replace(SessionState::Stopped);
            failure = Some(e);
        }
        Exit::SinkClosed => {
            if let Err(e) = stream.stop().await {
                warn!("Failed to stop stream from {source_name} after the sink closed: {e}");
            }
        }
    }

    drop(tx);
    let forwarded = match forwarder.await {
        Ok(result) => result,
        Err(e) => Err(Error::stream(source_name.clone(), None, e).into()),
    };
    state.send_replace(SessionState::Stopped);

    if let Some(e) = failure {
        return Err(e.into());
    }
    let forwarded = forwarded?;
    info!("Capture session for {source_name} stopped after {forwarded} deltas");
    Ok(SessionReport {
        forwarded,
        state: SessionState::Stopped,
    })
}

async fn forward<S: DeltaSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Delta>,
    source_name: String,
) -> Result<u64, SessionError> {
    let sink_error = |cause: BoxError| SessionError::Sink {
        source_name: source_name.clone(),
        cause,
    };
    let mut forwarded = 0;
    while let Some(delta) = rx.recv().await {
        sink.accept(delta).await.map_err(sink_error)?;
        forwarded += 1;
    }
    sink.flush().await.map_err(sink_error)?;
    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window() {
        assert_eq!(SessionConfig::default().window, 256);
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.window, 256);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(SessionState::Draining.to_string(), "draining");
        assert_eq!(
            serde_json::to_string(&SessionState::Stopped).unwrap(),
            "\"stopped\""
        );
    }
}
