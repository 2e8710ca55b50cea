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


//! Downloader configuration
//!
//! The host passes this as JSON when attaching. On Android the roots are:
//! - `public_root`: `Environment.getExternalStorageDirectory()`
//! - `private_root`: `Context.getExternalFilesDir(null)`
//! - `database_path`: `Context.getDatabasePath("image_downloader_temporary")`

use crate::error::{DownloaderError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Private index database file name
pub const PRIVATE_DATABASE_NAME: &str = "image_downloader_temporary";

/// Local media catalog database file name
pub const CATALOG_DATABASE_NAME: &str = "media_catalog.db";

/// Configuration for a downloader instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Root of the shared volume; category directories live directly below it
    pub public_root: PathBuf,

    /// Root of the app-private area
    pub private_root: PathBuf,

    /// SQLite file backing the private index
    pub database_path: PathBuf,

    /// SQLite file backing the local media catalog (desktop hosts)
    pub catalog_path: PathBuf,

    /// Platform API level, drives capability selection
    pub sdk_version: u32,

    /// Interval between status polls for polling engines
    pub poll_interval_ms: u64,

    /// Minimum interval between running-status pushes from the HTTP engine
    pub progress_interval_ms: u64,

    /// Application package, used for the file provider authority
    pub package_name: Option<String>,
}

/// Field fallbacks for partial JSON. The roots it produces are relative and
/// fail [`DownloaderConfig::validate`]; a usable configuration names its
/// paths or comes from [`DownloaderConfig::for_base_dir`].
impl Default for DownloaderConfig {
    fn default() -> Self {
        Self::for_base_dir(PathBuf::from("."))
    }
}

impl DownloaderConfig {
    /// Lay out every path below one base directory
    pub fn for_base_dir<P: AsRef<Path>>(base: P) -> Self {
        let base = base.as_ref();
        Self {
            public_root: base.join("shared"),
            private_root: base.join("private"),
            database_path: base.join("databases").join(PRIVATE_DATABASE_NAME),
            catalog_path: base.join("databases").join(CATALOG_DATABASE_NAME),
            sdk_version: 30,
            poll_interval_ms: 500,
            progress_interval_ms: 200,
            package_name: None,
        }
    }

    /// Parse configuration sent by the host
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = tokio::fs::read_to_string(path.as_ref()).await.map_err(|e| {
            DownloaderError::InvalidConfiguration(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("public_root", &self.public_root),
            ("private_root", &self.private_root),
            ("database_path", &self.database_path),
            ("catalog_path", &self.catalog_path),
        ] {
            if !path.is_absolute() {
                return Err(DownloaderError::InvalidConfiguration(format!(
                    "{} must be absolute: {}",
                    name,
                    path.display()
                )));
            }
        }

        if self.poll_interval_ms == 0 || self.progress_interval_ms == 0 {
            return Err(DownloaderError::InvalidConfiguration(
                "intervals must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Authority of the host's file provider, if a package is known
    pub fn file_provider_authority(&self) -> Option<String> {
        self.package_name
            .as_ref()
            .map(|package| format!("{}.image_downloader.provider", package))
    }
}
