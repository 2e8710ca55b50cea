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


//! Identifier indexes
//!
//! A finalized download is registered in one of two indexes and can later be
//! resolved from its opaque id:
//! - [`SharedIndex`] for public downloads, backed by a [`MediaCatalog`]
//! - [`PrivateIndex`] for private downloads, a local SQLite table that only
//!   holds the files of the most recent private download
//!
//! # Usage Example
//! ```no_run
//! use image_downloader_core::storage::{IdentifierIndex, PrivateIndex};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let index = PrivateIndex::open("/data/databases/image_downloader_temporary").await?;
//! if let Some(record) = index.find("Xc81PqA0bn3LrT5mWz2K", None).await? {
//!     println!("{} ({} bytes)", record.path, record.byte_size);
//! }
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod local_catalog;
pub mod migrations;
pub mod models;
pub mod private_index;
pub mod shared_index;

use crate::error::Result;
use crate::request::Visibility;
use async_trait::async_trait;
use std::sync::Arc;

// Re-export commonly used types
pub use database::Database;
pub use local_catalog::LocalMediaCatalog;
pub use models::{FieldValue, FileRecord, NewFileRecord, RecordField};
pub use private_index::PrivateIndex;
pub use shared_index::{CatalogRow, CatalogValues, MediaCatalog, MediaCollection, SharedIndex};

/// Insert and point-query over one index variant
#[async_trait]
pub trait IdentifierIndex: Send + Sync {
    /// Register a record; returns its id
    async fn insert(&self, record: &NewFileRecord) -> Result<String>;

    /// Look a record up by id; `is_video` picks the collection where the index has several
    async fn find(&self, id: &str, is_video: Option<bool>) -> Result<Option<FileRecord>>;
}

/// Both index variants of one downloader instance
#[derive(Clone)]
pub struct Indexes {
    pub shared: Arc<SharedIndex>,
    pub private: Arc<PrivateIndex>,
}

impl Indexes {
    pub fn new(shared: Arc<SharedIndex>, private: Arc<PrivateIndex>) -> Self {
        Self { shared, private }
    }

    /// Index for a visibility
    pub fn select(&self, visibility: Visibility) -> &dyn IdentifierIndex {
        match visibility {
            Visibility::Public => self.shared.as_ref(),
            Visibility::Private => self.private.as_ref(),
        }
    }
}
