// image-downloader-core - download-and-persist engine for mobile hosts
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! HTTP transfer engine
//!
//! Stands in for the platform download manager on desktop hosts and in the
//! CLI. Each enqueued task runs in its own worker which streams the body to
//! the destination and pushes statuses as it goes.
//!
//! # Status sequence
//! - `Pending` as soon as the worker starts
//! - `Running` on the first chunk, then at most once per progress interval
//! - `Successful` or `Failed` exactly once at the end
//!
//! A cancelled worker removes its partial file and closes the stream without
//! a terminal status.

use crate::download::engine::{
    RawStatus, StatusReceiver, TransferEngine, TransferId, TransferTask, ERROR_FILE_ERROR,
    ERROR_HTTP_DATA_ERROR, ERROR_TOO_MANY_REDIRECTS, ERROR_UNKNOWN,
};
use crate::error::{DownloaderError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Active transfer handle
struct ActiveTransfer {
    handle: JoinHandle<()>,
    cancel_tx: oneshot::Sender<()>,
    /// Taken by the first subscriber
    status_rx: Option<StatusReceiver>,
}

type TransferMap = Arc<RwLock<HashMap<TransferId, ActiveTransfer>>>;

/// Streaming reqwest engine
pub struct HttpTransferEngine {
    client: reqwest::Client,
    progress_interval: Duration,
    transfers: TransferMap,
}

impl HttpTransferEngine {
    pub fn new(progress_interval: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), progress_interval)
    }

    pub fn with_client(client: reqwest::Client, progress_interval: Duration) -> Self {
        Self {
            client,
            progress_interval,
            transfers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of transfers still tracked
    pub async fn tracked_count(&self) -> usize {
        self.transfers.read().await.len()
    }
}

#[async_trait]
impl TransferEngine for HttpTransferEngine {
    async fn enqueue(&self, task: TransferTask) -> Result<TransferId> {
        let id = TransferId::new(Uuid::new_v4().to_string());
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        log::info!("Enqueuing transfer {} for {}", id, task.url);

        // Hold the write lock until the entry exists so a fast worker
        // cannot try to remove itself first
        let mut transfers = self.transfers.write().await;

        let handle = {
            let client = self.client.clone();
            let interval = self.progress_interval;
            let transfers = Arc::clone(&self.transfers);
            let id = id.clone();

            tokio::spawn(async move {
                run_transfer(client, task, interval, status_tx, cancel_rx).await;
                release_finished(&transfers, &id).await;
            })
        };

        transfers.insert(
            id.clone(),
            ActiveTransfer {
                handle,
                cancel_tx,
                status_rx: Some(status_rx),
            },
        );

        Ok(id)
    }

    async fn subscribe(&self, id: &TransferId) -> Result<StatusReceiver> {
        let mut transfers = self.transfers.write().await;
        let transfer = transfers.get_mut(id).ok_or_else(|| {
            DownloaderError::InvalidState(format!("Unknown transfer: {}", id))
        })?;

        let status_rx = transfer.status_rx.take().ok_or_else(|| {
            DownloaderError::InvalidState(format!("Transfer {} already has a subscriber", id))
        })?;

        if transfer.handle.is_finished() {
            transfers.remove(id);
        }

        Ok(status_rx)
    }

    async fn cancel(&self, id: &TransferId) -> Result<()> {
        let transfer = self.transfers.write().await.remove(id);

        match transfer {
            Some(transfer) => {
                log::info!("Cancelling transfer {}", id);
                let _ = transfer.cancel_tx.send(());
                // Wait for the worker so the partial file is gone on return
                let _ = transfer.handle.await;
                Ok(())
            }
            None => {
                log::debug!("Cancel for finished or unknown transfer {}", id);
                Ok(())
            }
        }
    }
}

/// Drop the entry of a finished worker once nobody can subscribe to it anymore
async fn release_finished(transfers: &TransferMap, id: &TransferId) {
    let mut transfers = transfers.write().await;
    if matches!(transfers.get(id), Some(transfer) if transfer.status_rx.is_none()) {
        transfers.remove(id);
    }
}

/// Worker body: fetch, or clean up after a cancel
async fn run_transfer(
    client: reqwest::Client,
    task: TransferTask,
    interval: Duration,
    status_tx: mpsc::UnboundedSender<RawStatus>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let _ = status_tx.send(RawStatus::pending());

    tokio::select! {
        biased;
        _ = &mut cancel_rx => {
            if let Err(e) = fs::remove_file(&task.destination).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to remove partial file {:?}: {}", task.destination, e);
                }
            }
            log::debug!("Transfer of {} cancelled", task.url);
        }
        result = fetch(&client, &task, interval, &status_tx) => {
            let status = match result {
                Ok(total) => {
                    log::info!("Transfer of {} finished ({} bytes)", task.url, total);
                    RawStatus::successful(total)
                }
                Err(e) => {
                    log::warn!("Transfer of {} failed: {}", task.url, e);
                    failure_status(&e)
                }
            };
            let _ = status_tx.send(status);
        }
    }
}

/// Stream the body to the destination; returns the byte count
async fn fetch(
    client: &reqwest::Client,
    task: &TransferTask,
    interval: Duration,
    status_tx: &mpsc::UnboundedSender<RawStatus>,
) -> Result<u64> {
    let mut request = client.get(task.url.clone());
    for (key, value) in &task.headers {
        request = request.header(key.as_str(), value.as_str());
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloaderError::transfer_failed(
            format!("HTTP {}", status),
            Some(status.as_u16() as i32),
        ));
    }

    let total = response.content_length();

    if let Some(parent) = task.destination.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::File::create(&task.destination).await?;

    let mut stream = response.bytes_stream();
    let mut bytes_so_far: u64 = 0;
    let mut last_update: Option<tokio::time::Instant> = None;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        bytes_so_far += chunk.len() as u64;

        let due = last_update.map_or(true, |at| at.elapsed() >= interval);
        if due {
            let _ = status_tx.send(RawStatus::running(bytes_so_far, total));
            last_update = Some(tokio::time::Instant::now());
        }
    }

    file.flush().await?;
    Ok(bytes_so_far)
}

/// Translate a worker error into a Failed status with a platform reason code
fn failure_status(err: &DownloaderError) -> RawStatus {
    let reason = match err {
        DownloaderError::TransferFailed { code: Some(code), .. } => *code,
        DownloaderError::IoError(_) => ERROR_FILE_ERROR,
        DownloaderError::ReqwestError(e) if e.is_redirect() => ERROR_TOO_MANY_REDIRECTS,
        DownloaderError::ReqwestError(e) if e.is_body() || e.is_decode() => ERROR_HTTP_DATA_ERROR,
        _ => ERROR_UNKNOWN,
    };
    let message = match err {
        DownloaderError::TransferFailed { reason, .. } => reason.clone(),
        other => other.to_string(),
    };
    RawStatus::failed(reason, Some(message))
}
