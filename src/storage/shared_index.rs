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


//! Shared index backed by the platform media catalog
//!
//! The catalog owns ids and deduplicates rows. Inserts go into the image or
//! video collection depending on the MIME type, and the assigned id is
//! recovered by querying the collection for the absolute path.
//!
//! Catalog queries return `None` when the query channel itself could not be
//! opened, which is reported differently from a missing row.

use crate::error::{DownloaderError, Result};
use crate::storage::models::{FileRecord, NewFileRecord};
use crate::storage::IdentifierIndex;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Catalog collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCollection {
    Images,
    Videos,
}

impl MediaCollection {
    pub fn for_mime_type(mime_type: &str) -> Self {
        if mime_type.starts_with("video") {
            MediaCollection::Videos
        } else {
            MediaCollection::Images
        }
    }

    /// Collection searched by `find*`; anything but an explicit `false` means video
    pub fn for_query(is_video: Option<bool>) -> Self {
        if is_video != Some(false) {
            MediaCollection::Videos
        } else {
            MediaCollection::Images
        }
    }
}

/// Column values for a catalog insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogValues {
    pub mime_type: String,
    pub display_name: String,
    pub size: i64,
    pub relative_path: String,
    /// Absolute path column, written on legacy platforms only
    pub data: Option<String>,
}

/// One catalog row
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CatalogRow {
    pub id: String,
    pub mime_type: Option<String>,
    pub data: Option<String>,
    pub display_name: Option<String>,
    pub relative_path: Option<String>,
    pub size: Option<i64>,
}

impl CatalogRow {
    fn into_record(self) -> FileRecord {
        FileRecord {
            id: self.id,
            path: self.data.unwrap_or_default(),
            display_name: self.display_name.unwrap_or_default(),
            byte_size: self.size.unwrap_or(0),
            mime_type: self.mime_type.unwrap_or_default(),
            relative_path: self.relative_path,
        }
    }
}

/// Platform media catalog
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// Insert a row; returns the content uri of the new row when the catalog reports one
    async fn insert(
        &self,
        collection: MediaCollection,
        values: CatalogValues,
    ) -> Result<Option<String>>;

    /// Rows whose id equals `id`; None when the channel could not be opened
    async fn query_by_id(
        &self,
        collection: MediaCollection,
        id: &str,
    ) -> Result<Option<Vec<CatalogRow>>>;

    /// Rows whose absolute path equals `path`; None when the channel could not be opened
    async fn query_by_path(
        &self,
        collection: MediaCollection,
        path: &str,
    ) -> Result<Option<Vec<CatalogRow>>>;
}

/// Identifier index over a [`MediaCatalog`]
pub struct SharedIndex {
    catalog: Arc<dyn MediaCatalog>,
}

impl SharedIndex {
    pub fn new(catalog: Arc<dyn MediaCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl IdentifierIndex for SharedIndex {
    async fn insert(&self, record: &NewFileRecord) -> Result<String> {
        let collection = MediaCollection::for_mime_type(&record.mime_type);
        let values = CatalogValues {
            mime_type: record.mime_type.clone(),
            display_name: record.display_name.clone(),
            size: record.byte_size,
            relative_path: record.relative_path.clone(),
            data: record.data.clone(),
        };

        let uri = self.catalog.insert(collection, values).await?;
        log::debug!("Catalog insert into {:?}: {:?}", collection, uri);

        let rows = self
            .catalog
            .query_by_path(collection, &record.path)
            .await?
            .ok_or_else(|| DownloaderError::NotFound(record.path.clone()))?;

        rows.into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| DownloaderError::NotFound(record.path.clone()))
    }

    async fn find(&self, id: &str, is_video: Option<bool>) -> Result<Option<FileRecord>> {
        let collection = MediaCollection::for_query(is_video);
        let rows = self
            .catalog
            .query_by_id(collection, id)
            .await?
            .ok_or_else(|| {
                DownloaderError::Precondition(format!("{} is an id that does not exist.", id))
            })?;

        Ok(rows.into_iter().next().map(CatalogRow::into_record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Catalog that records inserts and answers path queries from them
    #[derive(Default)]
    struct MemoryCatalog {
        rows: Mutex<Vec<(MediaCollection, CatalogRow)>>,
        closed: bool,
    }

    #[async_trait]
    impl MediaCatalog for MemoryCatalog {
        async fn insert(
            &self,
            collection: MediaCollection,
            values: CatalogValues,
        ) -> Result<Option<String>> {
            let mut rows = self.rows.lock().unwrap();
            let id = (rows.len() + 1).to_string();
            rows.push((
                collection,
                CatalogRow {
                    id: id.clone(),
                    mime_type: Some(values.mime_type),
                    data: values.data,
                    display_name: Some(values.display_name),
                    relative_path: Some(values.relative_path),
                    size: Some(values.size),
                },
            ));
            Ok(Some(format!("content://media/{}", id)))
        }

        async fn query_by_id(
            &self,
            collection: MediaCollection,
            id: &str,
        ) -> Result<Option<Vec<CatalogRow>>> {
            if self.closed {
                return Ok(None);
            }
            let rows = self.rows.lock().unwrap();
            Ok(Some(
                rows.iter()
                    .filter(|(c, row)| *c == collection && row.id == id)
                    .map(|(_, row)| row.clone())
                    .collect(),
            ))
        }

        async fn query_by_path(
            &self,
            collection: MediaCollection,
            path: &str,
        ) -> Result<Option<Vec<CatalogRow>>> {
            if self.closed {
                return Ok(None);
            }
            let rows = self.rows.lock().unwrap();
            Ok(Some(
                rows.iter()
                    .filter(|(c, row)| *c == collection && row.data.as_deref() == Some(path))
                    .map(|(_, row)| row.clone())
                    .collect(),
            ))
        }
    }

    fn new_record(mime_type: &str) -> NewFileRecord {
        NewFileRecord {
            path: "/sdcard/Download/clip.mp4".to_string(),
            display_name: "clip.mp4".to_string(),
            byte_size: 4096,
            mime_type: mime_type.to_string(),
            relative_path: "/sdcard/Download/clip.mp4".to_string(),
            data: Some("/sdcard/Download/clip.mp4".to_string()),
        }
    }

    #[test]
    fn test_collection_selection() {
        assert_eq!(MediaCollection::for_mime_type("video/mp4"), MediaCollection::Videos);
        assert_eq!(MediaCollection::for_mime_type("image/png"), MediaCollection::Images);
        assert_eq!(MediaCollection::for_mime_type(""), MediaCollection::Images);
        assert_eq!(MediaCollection::for_query(None), MediaCollection::Videos);
        assert_eq!(MediaCollection::for_query(Some(true)), MediaCollection::Videos);
        assert_eq!(MediaCollection::for_query(Some(false)), MediaCollection::Images);
    }

    #[tokio::test]
    async fn test_insert_recovers_catalog_id() {
        let index = SharedIndex::new(Arc::new(MemoryCatalog::default()));

        let id = index.insert(&new_record("video/mp4")).await.unwrap();
        let record = index.find(&id, None).await.unwrap().unwrap();

        assert_eq!(record.path, "/sdcard/Download/clip.mp4");
        assert_eq!(record.byte_size, 4096);
        // Stored as a video, so the image collection does not have it
        assert!(index.find(&id, Some(false)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unrecoverable_insert_is_not_found() {
        let index = SharedIndex::new(Arc::new(MemoryCatalog::default()));
        let mut record = new_record("image/png");
        // Relative-only hint and the platform places the file elsewhere
        record.data = None;

        let err = index.insert(&record).await.unwrap_err();
        assert_eq!(err.to_string(), "/sdcard/Download/clip.mp4 is not found.");
    }

    #[tokio::test]
    async fn test_closed_channel_is_precondition() {
        let index = SharedIndex::new(Arc::new(MemoryCatalog {
            closed: true,
            ..Default::default()
        }));

        let err = index.find("17", Some(false)).await.unwrap_err();
        assert!(matches!(err, DownloaderError::Precondition(_)));
        assert_eq!(err.to_string(), "17 is an id that does not exist.");
    }
}
