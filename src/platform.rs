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


//! Platform capabilities and storage layout
//!
//! Everything that depends on the platform API level sits behind
//! [`CapabilityProvider`]. Two implementations exist:
//! - [`ScopedStorage`] for API 30 and newer: writing to the shared volume
//!   needs no runtime permission and catalog rows take a relative path hint
//! - [`LegacyStorage`] below that: the write permission must be granted and
//!   catalog rows carry the absolute path
//!
//! The provider is picked once, when the host attaches.

use crate::config::DownloaderConfig;
use crate::request::{TargetCategory, Visibility};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// First API level with scoped storage semantics
pub const SCOPED_STORAGE_MIN_SDK: u32 = 30;

/// Path columns written into a catalog row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPlacement {
    pub relative_path: String,
    /// Absolute path column, only written on legacy platforms
    pub data: Option<String>,
}

/// Version-dependent platform behavior
pub trait CapabilityProvider: Send + Sync + Debug {
    fn sdk_version(&self) -> u32;

    /// Whether shared-volume writes need no runtime permission
    fn write_permission_implicit(&self) -> bool;

    /// Path columns for a catalog row describing `absolute_path`
    fn catalog_placement(&self, absolute_path: &Path, relative_dir: &str) -> CatalogPlacement;
}

/// API 30+
#[derive(Debug, Clone, Copy)]
pub struct ScopedStorage {
    sdk_version: u32,
}

impl ScopedStorage {
    pub fn new(sdk_version: u32) -> Self {
        Self { sdk_version }
    }
}

impl CapabilityProvider for ScopedStorage {
    fn sdk_version(&self) -> u32 {
        self.sdk_version
    }

    fn write_permission_implicit(&self) -> bool {
        true
    }

    fn catalog_placement(&self, _absolute_path: &Path, relative_dir: &str) -> CatalogPlacement {
        CatalogPlacement {
            relative_path: relative_dir.to_string(),
            data: None,
        }
    }
}

/// Below API 30
#[derive(Debug, Clone, Copy)]
pub struct LegacyStorage {
    sdk_version: u32,
}

impl LegacyStorage {
    pub fn new(sdk_version: u32) -> Self {
        Self { sdk_version }
    }
}

impl CapabilityProvider for LegacyStorage {
    fn sdk_version(&self) -> u32 {
        self.sdk_version
    }

    fn write_permission_implicit(&self) -> bool {
        false
    }

    fn catalog_placement(&self, absolute_path: &Path, _relative_dir: &str) -> CatalogPlacement {
        let path = absolute_path.to_string_lossy().to_string();
        CatalogPlacement {
            relative_path: path.clone(),
            data: Some(path),
        }
    }
}

/// Pick the provider for a platform API level
pub fn capabilities_for(sdk_version: u32) -> Arc<dyn CapabilityProvider> {
    if sdk_version >= SCOPED_STORAGE_MIN_SDK {
        Arc::new(ScopedStorage::new(sdk_version))
    } else {
        Arc::new(LegacyStorage::new(sdk_version))
    }
}

/// Resolves category directories on the shared volume and in the private area
#[derive(Debug, Clone)]
pub struct StorageLayout {
    public_root: PathBuf,
    private_root: PathBuf,
}

impl StorageLayout {
    pub fn new(public_root: PathBuf, private_root: PathBuf) -> Self {
        Self {
            public_root,
            private_root,
        }
    }

    pub fn from_config(config: &DownloaderConfig) -> Self {
        Self::new(config.public_root.clone(), config.private_root.clone())
    }

    pub fn public_root(&self) -> &Path {
        &self.public_root
    }

    pub fn private_root(&self) -> &Path {
        &self.private_root
    }

    /// Directory for a category, by visibility
    pub fn directory(&self, visibility: Visibility, category: &TargetCategory) -> PathBuf {
        let root = match visibility {
            Visibility::Public => &self.public_root,
            Visibility::Private => &self.private_root,
        };
        root.join(category.directory_name())
    }

    /// Relative path hint of a category directory, with trailing slash
    pub fn relative_dir(category: &TargetCategory) -> String {
        format!("{}/", category.directory_name().trim_end_matches('/'))
    }
}
