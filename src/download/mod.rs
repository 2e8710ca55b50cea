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


//! Transfer orchestration
//!
//! The byte transfer is delegated to a [`TransferEngine`]; this module
//! observes it and turns its statuses into [`DownloadEvent`]s.
//!
//! # Layout
//! - `engine` - engine trait, raw statuses, platform reason codes
//! - `polling` - adapter for engines that can only be polled
//! - `http` - reqwest engine used on desktop hosts
//! - `event` - caller-facing events and the status mapper
//! - `destination` - temporary target naming
//! - `orchestrator` - single-slot observer with cancel

pub mod destination;
pub mod engine;
pub mod event;
pub mod http;
pub mod orchestrator;
pub mod polling;

// Re-export commonly used types
pub use destination::Destination;
pub use engine::{RawState, RawStatus, StatusReceiver, TransferEngine, TransferId, TransferTask};
pub use event::{
    channel_callback, delivery_callback, DownloadEvent, EventCallback, EventMapper, TransferEvent,
};
pub use http::HttpTransferEngine;
pub use orchestrator::{DownloadOrchestrator, TransferHandle, TransferOutcome};
pub use polling::{PolledEngine, PollingBackend};
