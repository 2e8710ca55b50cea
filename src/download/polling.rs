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


//! Adapter for engines that can only be polled
//!
//! The platform download manager exposes a status table, not a stream.
//! [`PolledEngine`] queries it at a fixed interval and turns changes into
//! the subscription interface the orchestrator consumes.

use crate::download::engine::{
    RawStatus, StatusReceiver, TransferEngine, TransferId, TransferTask, ERROR_UNKNOWN,
};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Consecutive failed status queries before the transfer is reported failed
pub const MAX_QUERY_FAILURES: u32 = 3;

/// Snapshot-style engine
#[async_trait]
pub trait PollingBackend: Send + Sync + 'static {
    async fn enqueue(&self, task: TransferTask) -> Result<TransferId>;

    /// Current status, or None once the engine no longer tracks the transfer
    async fn query(&self, id: &TransferId) -> Result<Option<RawStatus>>;

    async fn cancel(&self, id: &TransferId) -> Result<()>;
}

/// [`TransferEngine`] over a [`PollingBackend`]
pub struct PolledEngine<B: PollingBackend> {
    backend: Arc<B>,
    interval: Duration,
}

impl<B: PollingBackend> PolledEngine<B> {
    pub fn new(backend: Arc<B>, interval: Duration) -> Self {
        Self { backend, interval }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}

#[async_trait]
impl<B: PollingBackend> TransferEngine for PolledEngine<B> {
    async fn enqueue(&self, task: TransferTask) -> Result<TransferId> {
        self.backend.enqueue(task).await
    }

    async fn subscribe(&self, id: &TransferId) -> Result<StatusReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = Arc::clone(&self.backend);
        let id = id.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            poll_until_terminal(backend, id, interval, tx).await;
        });

        Ok(rx)
    }

    async fn cancel(&self, id: &TransferId) -> Result<()> {
        self.backend.cancel(id).await
    }
}

/// Poll until a terminal status, a vanished transfer, repeated query
/// failures or a dropped receiver
async fn poll_until_terminal<B: PollingBackend>(
    backend: Arc<B>,
    id: TransferId,
    interval: Duration,
    tx: mpsc::UnboundedSender<RawStatus>,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut last: Option<RawStatus> = None;
    let mut failures = 0;

    loop {
        ticker.tick().await;

        if tx.is_closed() {
            return;
        }

        let status = match backend.query(&id).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                log::warn!("Transfer {} is no longer tracked by the engine", id);
                let _ = tx.send(RawStatus::failed(
                    ERROR_UNKNOWN,
                    Some("transfer no longer tracked".to_string()),
                ));
                return;
            }
            Err(e) => {
                failures += 1;
                log::warn!(
                    "Status query for {} failed ({}/{}): {}",
                    id,
                    failures,
                    MAX_QUERY_FAILURES,
                    e
                );
                if failures >= MAX_QUERY_FAILURES {
                    let _ = tx.send(RawStatus::failed(ERROR_UNKNOWN, Some(e.to_string())));
                    return;
                }
                continue;
            }
        };
        failures = 0;

        if last.as_ref() == Some(&status) {
            continue;
        }

        let terminal = status.state.is_terminal();
        if tx.send(status.clone()).is_err() || terminal {
            return;
        }
        last = Some(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::engine::RawState;
    use crate::error::DownloaderError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed list of snapshots, one per query
    struct ScriptedBackend {
        snapshots: Mutex<VecDeque<Option<RawStatus>>>,
    }

    #[async_trait]
    impl PollingBackend for ScriptedBackend {
        async fn enqueue(&self, _task: TransferTask) -> Result<TransferId> {
            Ok(TransferId::new("42"))
        }

        async fn query(&self, _id: &TransferId) -> Result<Option<RawStatus>> {
            let mut snapshots = self.snapshots.lock().unwrap();
            Ok(snapshots.pop_front().unwrap_or(None))
        }

        async fn cancel(&self, _id: &TransferId) -> Result<()> {
            Ok(())
        }
    }

    /// Query fails for the first `failures` calls, then reports success
    struct FlakyBackend {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PollingBackend for FlakyBackend {
        async fn enqueue(&self, _task: TransferTask) -> Result<TransferId> {
            Ok(TransferId::new("7"))
        }

        async fn query(&self, _id: &TransferId) -> Result<Option<RawStatus>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(DownloaderError::InvalidState("host detached".to_string()));
            }
            Ok(Some(RawStatus::successful(5)))
        }

        async fn cancel(&self, _id: &TransferId) -> Result<()> {
            Ok(())
        }
    }

    fn flaky(failures: u32) -> PolledEngine<FlakyBackend> {
        PolledEngine::new(
            Arc::new(FlakyBackend {
                failures,
                calls: AtomicU32::new(0),
            }),
            Duration::from_millis(1),
        )
    }

    fn engine(snapshots: Vec<Option<RawStatus>>) -> PolledEngine<ScriptedBackend> {
        PolledEngine::new(
            Arc::new(ScriptedBackend {
                snapshots: Mutex::new(snapshots.into()),
            }),
            Duration::from_millis(1),
        )
    }

    async fn collect(mut rx: StatusReceiver) -> Vec<RawStatus> {
        let mut out = Vec::new();
        while let Some(status) = rx.recv().await {
            out.push(status);
        }
        out
    }

    #[tokio::test]
    async fn test_unchanged_snapshots_are_skipped() {
        let engine = engine(vec![
            Some(RawStatus::pending()),
            Some(RawStatus::pending()),
            Some(RawStatus::running(10, Some(100))),
            Some(RawStatus::running(10, Some(100))),
            Some(RawStatus::successful(100)),
            Some(RawStatus::running(0, None)),
        ]);

        let rx = engine.subscribe(&TransferId::new("42")).await.unwrap();
        let states: Vec<RawState> = collect(rx).await.into_iter().map(|s| s.state).collect();

        assert_eq!(
            states,
            vec![RawState::Pending, RawState::Running, RawState::Successful]
        );
    }

    #[tokio::test]
    async fn test_vanished_transfer_fails() {
        let engine = engine(vec![Some(RawStatus::pending()), None]);

        let rx = engine.subscribe(&TransferId::new("42")).await.unwrap();
        let statuses = collect(rx).await;

        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[1].state, RawState::Failed);
        assert_eq!(statuses[1].reason, Some(ERROR_UNKNOWN));
    }

    #[tokio::test]
    async fn test_persistent_query_errors_fail_the_transfer() {
        let engine = flaky(u32::MAX);

        let rx = engine.subscribe(&TransferId::new("7")).await.unwrap();
        let statuses = tokio::time::timeout(Duration::from_secs(2), collect(rx))
            .await
            .expect("status stream must end");

        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].state, RawState::Failed);
        assert_eq!(statuses[0].reason, Some(ERROR_UNKNOWN));
        assert_eq!(
            engine.backend().calls.load(Ordering::SeqCst),
            MAX_QUERY_FAILURES
        );
    }

    #[tokio::test]
    async fn test_transient_query_errors_are_tolerated() {
        let engine = flaky(MAX_QUERY_FAILURES - 1);

        let rx = engine.subscribe(&TransferId::new("7")).await.unwrap();
        let states: Vec<RawState> = collect(rx).await.into_iter().map(|s| s.state).collect();

        assert_eq!(states, vec![RawState::Successful]);
    }
}
