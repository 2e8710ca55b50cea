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


//! Download orchestrator
//!
//! Owns at most one in-flight transfer. Starting a transfer enqueues it on
//! the engine and spawns an observer task that maps raw statuses to
//! [`DownloadEvent`]s, hands them to the caller's callback, and resolves the
//! [`TransferHandle`] with a [`TransferOutcome`] once the transfer ends.
//!
//! # Guarantees
//! - A second `start` while a transfer is active fails with `Busy`
//! - After `cancel` returns, the callback is never invoked again
//! - The slot is free again by the time the handle resolves

use crate::download::engine::{
    failure_reason, RawState, StatusReceiver, TransferEngine, TransferId, TransferTask,
};
use crate::download::event::{DownloadEvent, EventCallback, EventMapper, TransferEvent};
use crate::error::{DownloaderError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

/// How a transfer ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    Failed { reason: String, code: Option<i32> },
    Cancelled,
    /// Status stream closed without a terminal status
    Stalled { last: Option<DownloadEvent> },
}

/// Caller's view of a started transfer
#[derive(Debug)]
pub struct TransferHandle {
    id: TransferId,
    outcome_rx: oneshot::Receiver<TransferOutcome>,
}

impl TransferHandle {
    pub fn id(&self) -> &TransferId {
        &self.id
    }

    /// Wait for the transfer to end
    pub async fn wait(self) -> TransferOutcome {
        // The observer only drops the sender when it is aborted
        self.outcome_rx.await.unwrap_or(TransferOutcome::Cancelled)
    }
}

struct ActiveTransfer {
    id: TransferId,
    cancel_tx: oneshot::Sender<()>,
    delivering: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

type ActiveSlot = Arc<Mutex<Option<ActiveTransfer>>>;

/// Single-slot transfer orchestrator
pub struct DownloadOrchestrator {
    engine: Arc<dyn TransferEngine>,
    active: ActiveSlot,
}

impl DownloadOrchestrator {
    pub fn new(engine: Arc<dyn TransferEngine>) -> Self {
        Self {
            engine,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Id of the active transfer, if any
    pub async fn active_id(&self) -> Option<TransferId> {
        self.active.lock().await.as_ref().map(|a| a.id.clone())
    }

    /// Enqueue a transfer and start observing it
    pub async fn start(
        &self,
        task: TransferTask,
        callback: EventCallback<TransferEvent>,
    ) -> Result<TransferHandle> {
        let mut slot = self.active.lock().await;
        if slot.is_some() {
            return Err(DownloaderError::Busy);
        }

        let id = self.engine.enqueue(task).await?;
        let status_rx = match self.engine.subscribe(&id).await {
            Ok(rx) => rx,
            Err(e) => {
                log::warn!("Could not observe transfer {}: {}", id, e);
                let _ = self.engine.cancel(&id).await;
                return Err(e);
            }
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let delivering = Arc::new(AtomicBool::new(true));

        let handle = tokio::spawn(observe(
            id.clone(),
            status_rx,
            cancel_rx,
            callback,
            Arc::clone(&delivering),
            Arc::clone(&self.active),
            outcome_tx,
        ));

        *slot = Some(ActiveTransfer {
            id: id.clone(),
            cancel_tx,
            delivering,
            handle,
        });

        log::debug!("Observing transfer {}", id);
        Ok(TransferHandle { id, outcome_rx })
    }

    /// Cancel the active transfer; returns false when nothing was running
    pub async fn cancel(&self) -> Result<bool> {
        let active = self.active.lock().await.take();

        let Some(active) = active else {
            return Ok(false);
        };

        log::info!("Cancelling transfer {}", active.id);
        active.delivering.store(false, Ordering::SeqCst);
        let _ = active.cancel_tx.send(());

        let result = self.engine.cancel(&active.id).await;
        let _ = active.handle.await;
        result.map(|_| true)
    }
}

/// Observer task body
async fn observe(
    id: TransferId,
    mut status_rx: StatusReceiver,
    mut cancel_rx: oneshot::Receiver<()>,
    callback: EventCallback<TransferEvent>,
    delivering: Arc<AtomicBool>,
    active: ActiveSlot,
    outcome_tx: oneshot::Sender<TransferOutcome>,
) {
    let mut mapper = EventMapper::new();
    let mut last: Option<DownloadEvent> = None;

    let outcome = loop {
        let status = tokio::select! {
            biased;
            _ = &mut cancel_rx => break TransferOutcome::Cancelled,
            status = status_rx.recv() => status,
        };

        let Some(status) = status else {
            log::warn!("Transfer {} stopped reporting after {:?}", id, last);
            break TransferOutcome::Stalled { last };
        };

        if let Some(event) = mapper.map(&status) {
            match &event {
                DownloadEvent::Paused { reason } => log::info!("Transfer {} paused: {}", id, reason),
                DownloadEvent::Failed { reason } => log::warn!("Transfer {} failed: {}", id, reason),
                other => log::debug!("Transfer {}: {:?}", id, other),
            }

            if delivering.load(Ordering::SeqCst) {
                callback(TransferEvent {
                    transfer_id: id.clone(),
                    event: event.clone(),
                });
            }
            last = Some(event);
        }

        match status.state {
            RawState::Successful => break TransferOutcome::Completed,
            RawState::Failed => {
                let reason = match &last {
                    Some(DownloadEvent::Failed { reason }) => reason.clone(),
                    _ => failure_reason(status.reason),
                };
                break TransferOutcome::Failed {
                    reason,
                    code: status.reason,
                };
            }
            _ => {}
        }
    };

    {
        let mut slot = active.lock().await;
        if matches!(slot.as_ref(), Some(a) if a.id == id) {
            *slot = None;
        }
    }

    let _ = outcome_tx.send(outcome);
}
