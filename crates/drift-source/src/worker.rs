//! Channel-backed [`DeltaStream`] driven by a background task.
//!
//! Adapters write their fetch loop as an async closure taking a
//! [`DeltaSender`]. The loop runs on its own tokio task and pushes deltas into
//! a bounded queue; when the queue is full the loop waits, so a slow consumer
//! holds the fetch loop back.

use crate::source::DeltaStream;
use async_trait::async_trait;
use drift_core::{Delta, Error, Result};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Producer half handed to an adapter's fetch loop.
pub struct DeltaSender {
    source_name: String,
    tx: mpsc::Sender<Result<Delta>>,
    cancel: CancellationToken,
    next_id: u64,
}

impl DeltaSender {
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Next delta ordinal, starting at 1.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// True once the consumer asked the stream to stop. The loop should
    /// finish delivering what it already fetched and return.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Deliver a delta, waiting for queue space.
    ///
    /// Returns `false` if the consumer has gone away.
    pub async fn send(&self, delta: Delta) -> bool {
        self.tx.send(Ok(delta)).await.is_ok()
    }

    /// Sleep between polls. Returns `false` if a stop arrived first.
    pub async fn pause(&self, interval: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(interval) => true,
        }
    }
}

/// [`DeltaStream`] over a spawned fetch loop.
pub struct WorkerStream {
    source_name: String,
    rx: mpsc::Receiver<Result<Delta>>,
    buffered: VecDeque<Result<Delta>>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl WorkerStream {
    /// Spawn `work` on the current runtime with a queue of `capacity` deltas.
    ///
    /// An `Err` returned by `work` is delivered as the stream's final item.
    pub fn spawn<F, Fut>(source_name: impl Into<String>, capacity: usize, work: F) -> Self
    where
        F: FnOnce(DeltaSender) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let source_name = source_name.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();

        let sender = DeltaSender {
            source_name: source_name.clone(),
            tx: tx.clone(),
            cancel: cancel.clone(),
            next_id: 1,
        };
        let fetch = work(sender);
        let name = source_name.clone();
        let worker = tokio::spawn(async move {
            match fetch.await {
                Ok(()) => debug!("Fetch loop for {name} finished"),
                Err(e) => {
                    warn!("Fetch loop for {name} failed: {e}");
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        Self {
            source_name,
            rx,
            buffered: VecDeque::new(),
            cancel,
            worker: Some(worker),
        }
    }

    async fn join_worker(&mut self) -> Result<()> {
        if let Some(handle) = self.worker.as_mut() {
            let joined = handle.await;
            self.worker = None;
            if let Err(e) = joined {
                return Err(Error::stream(self.source_name.clone(), None, e));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DeltaStream for WorkerStream {
    async fn next(&mut self) -> Option<Result<Delta>> {
        if let Some(item) = self.buffered.pop_front() {
            return Some(item);
        }
        if let Some(item) = self.rx.recv().await {
            return Some(item);
        }
        self.join_worker().await.err().map(Err)
    }

    async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();
        while let Some(item) = self.rx.recv().await {
            self.buffered.push_back(item);
        }
        if let Err(e) = self.join_worker().await {
            self.buffered.push_back(Err(e));
        }
        debug!(
            "Stream from {} stopped with {} buffered deltas",
            self.source_name,
            self.buffered.len()
        );
        Ok(())
    }
}

impl Drop for WorkerStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
