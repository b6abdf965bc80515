//! Destinations for forwarded deltas.

use async_trait::async_trait;
use drift_core::{BoxError, Delta};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Receives deltas from a [`crate::CaptureSession`], one at a time and in
/// stream order.
#[async_trait]
pub trait DeltaSink: Send {
    /// Take ownership of one delta. Returning an error ends the session.
    async fn accept(&mut self, delta: Delta) -> Result<(), BoxError>;

    /// Called once after the last delta, before the session reports `Stopped`.
    async fn flush(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Forwards every delta into a channel.
pub struct ChannelSink {
    tx: mpsc::Sender<Delta>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Delta>) -> Self {
        Self { tx }
    }

    /// A sink paired with the receiver it feeds.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Delta>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl DeltaSink for ChannelSink {
    async fn accept(&mut self, delta: Delta) -> Result<(), BoxError> {
        self.tx
            .send(delta)
            .await
            .map_err(|_| "delta receiver was dropped".into())
    }
}

/// Collects deltas in memory. Clones share the same buffer, so keep one
/// clone to read what the session delivered.
#[derive(Clone, Default)]
pub struct MemorySink {
    deltas: Arc<Mutex<Vec<Delta>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deltas(&self) -> Vec<Delta> {
        match self.deltas.lock() {
            Ok(deltas) => deltas.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.deltas.lock() {
            Ok(deltas) => deltas.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeltaSink for MemorySink {
    async fn accept(&mut self, delta: Delta) -> Result<(), BoxError> {
        self.deltas
            .lock()
            .map_err(|_| "memory sink lock poisoned")?
            .push(delta);
        Ok(())
    }
}
