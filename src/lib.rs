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


//! Download a remote file, place it in shared or app-private storage, and
//! hand back a stable identifier the host can later resolve to the file's
//! path, name, size and MIME type.
//!
//! # Layout
//! - [`plugin`] - the [`ImageDownloader`] handle hosts bind to
//! - [`permission`] - storage-write permission gate
//! - [`download`] - transfer engines, orchestrator and events
//! - [`file`] - completion finalizer and MIME detection
//! - [`storage`] - shared and private identifier indexes
//! - [`query`] - field lookups by identifier
//! - [`viewer`] - opening files in an external viewer

pub mod config;
pub mod download;
pub mod error;
pub mod file;
pub mod permission;
pub mod platform;
pub mod plugin;
pub mod query;
pub mod request;
pub mod storage;
pub mod viewer;

// JNI bridge for Android
#[cfg(target_os = "android")]
mod jni_bridge;

pub use config::DownloaderConfig;
pub use error::{DownloaderError, Result};
pub use plugin::{HostContext, ImageDownloader, ProgressUpdate};
pub use request::{DownloadImageArgs, FindArgs, OpenArgs, TargetCategory, Visibility};
