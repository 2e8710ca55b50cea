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


//! Private fallback index
//!
//! A single SQLite table holding the files of the most recent private
//! download. The table is emptied when a private download starts, so only
//! completions since then can be resolved.
//!
//! Ids are 20 random alphanumeric characters. Collisions are not checked:
//! the table holds at most a handful of rows at any time.

use crate::error::Result;
use crate::storage::database::Database;
use crate::storage::migrations::PRIVATE_INDEX_MIGRATIONS;
use crate::storage::models::{FileRecord, NewFileRecord};
use crate::storage::IdentifierIndex;
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::Row;
use std::path::Path;
use tokio::sync::Mutex;

/// Length of generated ids
pub const PRIVATE_ID_LENGTH: usize = 20;

/// SQLite-backed private index
pub struct PrivateIndex {
    db: Database,
    // Serializes reset and insert so a clear never lands between them
    write_lock: Mutex<()>,
}

impl PrivateIndex {
    pub async fn open<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let db = Database::new(database_path, PRIVATE_INDEX_MIGRATIONS).await?;
        Ok(Self::with_database(db))
    }

    pub async fn in_memory() -> Result<Self> {
        let db = Database::new_in_memory(PRIVATE_INDEX_MIGRATIONS).await?;
        Ok(Self::with_database(db))
    }

    fn with_database(db: Database) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    /// Delete every row
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM image_downloader_temporary")
            .execute(self.db.pool())
            .await?;
        log::debug!("Cleared {} private index rows", result.rows_affected());
        Ok(())
    }

    /// Number of rows currently held
    pub async fn len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM image_downloader_temporary")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

#[async_trait]
impl IdentifierIndex for PrivateIndex {
    async fn insert(&self, record: &NewFileRecord) -> Result<String> {
        let id = generate_id();
        let _guard = self.write_lock.lock().await;

        sqlx::query(
            r#"
            INSERT INTO image_downloader_temporary
                (_id, mime_type, _data, _display_name, relative_path, _size)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&record.mime_type)
        .bind(&record.path)
        .bind(&record.display_name)
        .bind(&record.relative_path)
        .bind(record.byte_size)
        .execute(self.db.pool())
        .await?;

        log::debug!("Indexed private file {} as {}", record.path, id);
        Ok(id)
    }

    async fn find(&self, id: &str, _is_video: Option<bool>) -> Result<Option<FileRecord>> {
        let row = sqlx::query(
            r#"
            SELECT _id, mime_type, _data, _display_name, relative_path, _size
            FROM image_downloader_temporary
            WHERE _id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(FileRecord {
            id: row.try_get("_id")?,
            path: row.try_get::<Option<String>, _>("_data")?.unwrap_or_default(),
            display_name: row
                .try_get::<Option<String>, _>("_display_name")?
                .unwrap_or_default(),
            byte_size: row.try_get::<Option<i64>, _>("_size")?.unwrap_or(0),
            mime_type: row.try_get::<Option<String>, _>("mime_type")?.unwrap_or_default(),
            relative_path: row.try_get("relative_path")?,
        }))
    }
}

/// Fresh random id
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PRIVATE_ID_LENGTH)
        .map(char::from)
        .collect()
}
