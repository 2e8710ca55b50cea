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


//! Transfer engine interface
//!
//! The byte transfer itself belongs to an external engine (the platform
//! download manager on Android). The core only needs to enqueue a task,
//! observe its raw status, and cancel it.
//!
//! # Reason codes
//! Raw statuses carry the platform's numeric reason when paused or failed:
//! - Pause: 1 waiting to retry, 2 waiting for network, 3 queued for Wi-Fi, 4 unknown
//! - Error: 1000-1009 (see [`failure_reason`])

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;
use url::Url;

pub const PAUSED_WAITING_TO_RETRY: i32 = 1;
pub const PAUSED_WAITING_FOR_NETWORK: i32 = 2;
pub const PAUSED_QUEUED_FOR_WIFI: i32 = 3;
pub const PAUSED_UNKNOWN: i32 = 4;

pub const ERROR_UNKNOWN: i32 = 1000;
pub const ERROR_FILE_ERROR: i32 = 1001;
pub const ERROR_UNHANDLED_HTTP_CODE: i32 = 1002;
pub const ERROR_HTTP_DATA_ERROR: i32 = 1004;
pub const ERROR_TOO_MANY_REDIRECTS: i32 = 1005;
pub const ERROR_INSUFFICIENT_SPACE: i32 = 1006;
pub const ERROR_DEVICE_NOT_FOUND: i32 = 1007;
pub const ERROR_CANNOT_RESUME: i32 = 1008;
pub const ERROR_FILE_ALREADY_EXISTS: i32 = 1009;

/// Identifier assigned by the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(String);

impl TransferId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the engine is asked to fetch, and where to put it
#[derive(Debug, Clone)]
pub struct TransferTask {
    pub url: Url,
    pub headers: HashMap<String, String>,
    pub destination: PathBuf,
}

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawState {
    Pending,
    Running,
    Paused,
    Successful,
    Failed,
}

impl RawState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RawState::Successful | RawState::Failed)
    }
}

/// One status snapshot as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatus {
    pub state: RawState,
    pub bytes_so_far: u64,
    /// None while the size is unknown
    pub total_bytes: Option<u64>,
    /// Platform reason code for Paused and Failed
    pub reason: Option<i32>,
    /// Free-form detail from the engine
    pub message: Option<String>,
}

impl RawStatus {
    pub fn pending() -> Self {
        Self::with_state(RawState::Pending)
    }

    pub fn running(bytes_so_far: u64, total_bytes: Option<u64>) -> Self {
        Self {
            bytes_so_far,
            total_bytes,
            ..Self::with_state(RawState::Running)
        }
    }

    pub fn paused(reason: i32) -> Self {
        Self {
            reason: Some(reason),
            ..Self::with_state(RawState::Paused)
        }
    }

    pub fn failed(reason: i32, message: Option<String>) -> Self {
        Self {
            reason: Some(reason),
            message,
            ..Self::with_state(RawState::Failed)
        }
    }

    pub fn successful(total_bytes: u64) -> Self {
        Self {
            bytes_so_far: total_bytes,
            total_bytes: Some(total_bytes),
            ..Self::with_state(RawState::Successful)
        }
    }

    fn with_state(state: RawState) -> Self {
        Self {
            state,
            bytes_so_far: 0,
            total_bytes: None,
            reason: None,
            message: None,
        }
    }

    /// Percent of bytes transferred, when the total is known
    pub fn progress_percent(&self) -> Option<u8> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                let percent = self.bytes_so_far.saturating_mul(100) / total;
                Some(percent.min(100) as u8)
            }
            _ => None,
        }
    }
}

/// Stream of statuses for one transfer; closes when the engine stops reporting
pub type StatusReceiver = mpsc::UnboundedReceiver<RawStatus>;

/// Byte transfer engine
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Queue a transfer
    async fn enqueue(&self, task: TransferTask) -> Result<TransferId>;

    /// Start observing a transfer; statuses queued before this call are kept
    async fn subscribe(&self, id: &TransferId) -> Result<StatusReceiver>;

    /// Cancel a transfer and discard its partial output
    async fn cancel(&self, id: &TransferId) -> Result<()>;
}

/// Human-readable text for a pause reason
pub fn pause_reason(code: Option<i32>) -> String {
    match code {
        Some(PAUSED_WAITING_TO_RETRY) => "Waiting to retry",
        Some(PAUSED_WAITING_FOR_NETWORK) => "Waiting for network",
        Some(PAUSED_QUEUED_FOR_WIFI) => "Queued for Wi-Fi",
        _ => "Paused for an unknown reason",
    }
    .to_string()
}

/// Human-readable text for a failure reason
pub fn failure_reason(code: Option<i32>) -> String {
    match code {
        Some(ERROR_CANNOT_RESUME) => "Download cannot be resumed",
        Some(ERROR_DEVICE_NOT_FOUND) => "Storage device not found",
        Some(ERROR_FILE_ALREADY_EXISTS) => "File already exists",
        Some(ERROR_FILE_ERROR) => "Storage error",
        Some(ERROR_HTTP_DATA_ERROR) => "HTTP data error",
        Some(ERROR_INSUFFICIENT_SPACE) => "Insufficient space",
        Some(ERROR_TOO_MANY_REDIRECTS) => "Too many redirects",
        Some(ERROR_UNHANDLED_HTTP_CODE) => "Unhandled HTTP code",
        Some(ERROR_UNKNOWN) | None => "Unknown error",
        // HTTP status codes are reported as-is
        Some(code) if (100..600).contains(&code) => return format!("HTTP {}", code),
        Some(_) => "Unknown error",
    }
    .to_string()
}
