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


//! SQLite media catalog for hosts without a platform catalog
//!
//! Behaves like the platform catalog as far as the shared index can tell:
//! - ids are assigned by the catalog (integer, autoincrement)
//! - rows are deduplicated by absolute path; a second insert for the same
//!   path updates the existing row and keeps its id
//! - rows written with a relative-path hint only get their absolute path
//!   derived from the volume root, the hint and the display name

use crate::error::Result;
use crate::storage::database::Database;
use crate::storage::migrations::CATALOG_MIGRATIONS;
use crate::storage::shared_index::{CatalogRow, CatalogValues, MediaCatalog, MediaCollection};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::{Path, PathBuf};

/// Media catalog emulation
pub struct LocalMediaCatalog {
    db: Database,
    volume_root: PathBuf,
}

impl LocalMediaCatalog {
    pub async fn open<P: AsRef<Path>>(database_path: P, volume_root: PathBuf) -> Result<Self> {
        let db = Database::new(database_path, CATALOG_MIGRATIONS).await?;
        Ok(Self { db, volume_root })
    }

    pub async fn in_memory(volume_root: PathBuf) -> Result<Self> {
        let db = Database::new_in_memory(CATALOG_MIGRATIONS).await?;
        Ok(Self { db, volume_root })
    }

    fn table(collection: MediaCollection) -> &'static str {
        match collection {
            MediaCollection::Images => "media_images",
            MediaCollection::Videos => "media_videos",
        }
    }

    fn content_uri(collection: MediaCollection, id: i64) -> String {
        let segment = match collection {
            MediaCollection::Images => "images",
            MediaCollection::Videos => "video",
        };
        format!("content://media/external/{}/media/{}", segment, id)
    }

    /// Absolute path for a row written without one
    fn derive_path(&self, values: &CatalogValues) -> String {
        self.volume_root
            .join(values.relative_path.trim_matches('/'))
            .join(&values.display_name)
            .to_string_lossy()
            .to_string()
    }

    async fn select_where(
        &self,
        collection: MediaCollection,
        column: &str,
        value: &str,
    ) -> Result<Vec<CatalogRow>> {
        let sql = format!(
            "SELECT _id, mime_type, _data, _display_name, relative_path, _size FROM {} WHERE {} = ?",
            Self::table(collection),
            column
        );

        let rows = sqlx::query(&sql)
            .bind(value)
            .fetch_all(self.db.pool())
            .await?;

        rows.into_iter().map(|row| row_to_catalog_row(&row)).collect()
    }
}

#[async_trait]
impl MediaCatalog for LocalMediaCatalog {
    async fn insert(
        &self,
        collection: MediaCollection,
        values: CatalogValues,
    ) -> Result<Option<String>> {
        let data = values
            .data
            .clone()
            .unwrap_or_else(|| self.derive_path(&values));

        let sql = format!(
            r#"
            INSERT INTO {} (mime_type, _data, _display_name, relative_path, _size)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(_data) DO UPDATE SET
                mime_type = excluded.mime_type,
                _display_name = excluded._display_name,
                relative_path = excluded.relative_path,
                _size = excluded._size
            "#,
            Self::table(collection)
        );

        sqlx::query(&sql)
            .bind(&values.mime_type)
            .bind(&data)
            .bind(&values.display_name)
            .bind(&values.relative_path)
            .bind(values.size)
            .execute(self.db.pool())
            .await?;

        let id: i64 = sqlx::query_scalar(&format!(
            "SELECT _id FROM {} WHERE _data = ?",
            Self::table(collection)
        ))
        .bind(&data)
        .fetch_one(self.db.pool())
        .await?;

        log::debug!("Catalogued {} as {}", data, id);
        Ok(Some(Self::content_uri(collection, id)))
    }

    async fn query_by_id(
        &self,
        collection: MediaCollection,
        id: &str,
    ) -> Result<Option<Vec<CatalogRow>>> {
        // Catalog ids are integers; anything else cannot match
        if id.parse::<i64>().is_err() {
            return Ok(Some(Vec::new()));
        }
        self.select_where(collection, "_id", id).await.map(Some)
    }

    async fn query_by_path(
        &self,
        collection: MediaCollection,
        path: &str,
    ) -> Result<Option<Vec<CatalogRow>>> {
        self.select_where(collection, "_data", path).await.map(Some)
    }
}

fn row_to_catalog_row(row: &SqliteRow) -> Result<CatalogRow> {
    let id: i64 = row.try_get("_id")?;
    Ok(CatalogRow {
        id: id.to_string(),
        mime_type: row.try_get("mime_type")?,
        data: row.try_get("_data")?,
        display_name: row.try_get("_display_name")?,
        relative_path: row.try_get("relative_path")?,
        size: row.try_get("_size")?,
    })
}
