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


//! Download events delivered to the caller
//!
//! Raw engine statuses are mapped into the small [`DownloadEvent`] enum by
//! [`EventMapper`], which also keeps `Running` progress non-decreasing and
//! drops consecutive duplicates.

use crate::download::engine::{failure_reason, pause_reason, RawState, RawStatus, TransferId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Lifecycle event of one download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    Pending,
    Running {
        /// None while the total size is unknown
        progress_percent: Option<u8>,
    },
    Paused {
        reason: String,
    },
    Failed {
        reason: String,
    },
    Successful,
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadEvent::Failed { .. } | DownloadEvent::Successful)
    }
}

/// Event tagged with the transfer it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub transfer_id: TransferId,
    #[serde(flatten)]
    pub event: DownloadEvent,
}

/// Caller-supplied event sink
pub type EventCallback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Sink that forwards into a channel, for callers that drain events on
/// their own execution context
pub fn channel_callback<T: Send + 'static>() -> (EventCallback<T>, mpsc::UnboundedReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: EventCallback<T> = Arc::new(move |event| {
        let _ = tx.send(event);
    });
    (callback, rx)
}

/// Sink whose events are handed to `deliver` one at a time, in send order,
/// on a dedicated blocking thread. The thread exits once every clone of the
/// sink is dropped. Must be called inside a tokio runtime.
pub fn delivery_callback<T, F>(deliver: F) -> (EventCallback<T>, JoinHandle<()>)
where
    T: Send + 'static,
    F: Fn(T) + Send + 'static,
{
    let (callback, mut rx) = channel_callback();
    let handle = tokio::task::spawn_blocking(move || {
        while let Some(event) = rx.blocking_recv() {
            deliver(event);
        }
    });
    (callback, handle)
}

/// Stateful raw-status to event translation for one transfer
#[derive(Debug, Default)]
pub struct EventMapper {
    highest_percent: Option<u8>,
    last: Option<DownloadEvent>,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a status; None when the event would repeat the previous one
    pub fn map(&mut self, status: &RawStatus) -> Option<DownloadEvent> {
        let event = match status.state {
            RawState::Pending => DownloadEvent::Pending,
            RawState::Running => {
                let percent = match (status.progress_percent(), self.highest_percent) {
                    (Some(now), Some(seen)) => Some(now.max(seen)),
                    (now, seen) => now.or(seen),
                };
                if percent.is_some() {
                    self.highest_percent = percent;
                }
                DownloadEvent::Running {
                    progress_percent: percent,
                }
            }
            RawState::Paused => DownloadEvent::Paused {
                reason: pause_reason(status.reason),
            },
            RawState::Failed => DownloadEvent::Failed {
                reason: status
                    .message
                    .clone()
                    .unwrap_or_else(|| failure_reason(status.reason)),
            },
            RawState::Successful => DownloadEvent::Successful,
        };

        if self.last.as_ref() == Some(&event) {
            return None;
        }
        self.last = Some(event.clone());
        Some(event)
    }
}
