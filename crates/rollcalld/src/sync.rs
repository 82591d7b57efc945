//! Best-effort replication of written records to a remote mirror.
//!
//! A bounded queue feeds a single worker task. `push` only enqueues, so a
//! slow or unreachable mirror never delays attendance capture. Each payload
//! gets exactly one delivery attempt; failures are logged and discarded.

use rollcall_core::{AttendanceRecord, Mirror, MirrorPayload};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("mirror unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mirror answered HTTP {0}")]
    Status(u16),
}

/// HTTP client bound to one mirror endpoint.
#[derive(Clone)]
pub struct MirrorClient {
    client: reqwest::Client,
    url: String,
}

impl MirrorClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SyncError::Client)?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST one payload. Any non-2xx answer is an error.
    pub async fn deliver(&self, payload: &MirrorPayload) -> Result<(), SyncError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Handle to the sync worker. Implements [`Mirror`] for the reconciliation
/// service.
pub struct SyncForwarder {
    client: MirrorClient,
    tx: Mutex<Option<mpsc::Sender<MirrorPayload>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SyncForwarder {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(client: MirrorClient, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<MirrorPayload>(capacity.max(1));
        let worker = tokio::spawn(run_worker(client.clone(), rx));
        tracing::info!(url = client.url(), capacity, "sync forwarder started");
        Self {
            client,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn client(&self) -> &MirrorClient {
        &self.client
    }

    /// Close the queue and give the worker `grace` to drain it. Whatever is
    /// still pending afterwards is abandoned.
    pub async fn shutdown(&self, grace: Duration) {
        let pending = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut worker) = worker else {
            return;
        };

        tracing::info!(pending, grace_ms = grace.as_millis() as u64, "draining sync queue");
        if tokio::time::timeout(grace, &mut worker).await.is_err() {
            worker.abort();
            tracing::warn!("sync queue not drained in time; abandoning pending pushes");
        }
    }
}

impl Mirror for SyncForwarder {
    fn push(&self, record: &AttendanceRecord) {
        let payload = record.to_payload();
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            tracing::debug!(name = %payload.name, "sync forwarder stopped; not queued");
            return;
        };

        match tx.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(p)) => {
                tracing::warn!(name = %p.name, day = %p.day, "sync queue full; dropping push");
            }
            Err(TrySendError::Closed(p)) => {
                tracing::warn!(name = %p.name, day = %p.day, "sync worker gone; dropping push");
            }
        }
    }
}

async fn run_worker(client: MirrorClient, mut rx: mpsc::Receiver<MirrorPayload>) {
    tracing::info!("sync worker started");
    while let Some(payload) = rx.recv().await {
        match client.deliver(&payload).await {
            Ok(()) => tracing::info!(name = %payload.name, day = %payload.day, "synced"),
            Err(e) => tracing::warn!(
                name = %payload.name,
                day = %payload.day,
                error = %e,
                "sync failed; dropping"
            ),
        }
    }
    tracing::info!("sync worker exiting");
}
