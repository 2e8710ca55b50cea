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


//! Database connection and management
//!
//! Both the private index and the local media catalog are SQLite files
//! opened through [`Database`], each with its own migration set.
//!
//! # Database Location
//! - Android: `Context.getDatabasePath("image_downloader_temporary")`
//! - Desktop: `databases/` below the configured base directory
//!
//! # SQLite Configuration
//! - WAL mode
//! - Normal synchronous mode
//! - 30 second busy timeout

use crate::error::{DownloaderError, Result};
use crate::storage::migrations::{run_migrations, Migration};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    ConnectOptions,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Database manager - handles connection pooling and schema setup
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: Option<PathBuf>, // None for in-memory databases
}

impl Database {
    /// Open (or create) a database file and apply `migrations`
    ///
    /// # Errors
    /// Returns error if:
    /// - Parent directory doesn't exist and can't be created
    /// - Database file can't be opened
    /// - Migrations fail
    pub async fn new<P: AsRef<Path>>(database_path: P, migrations: &[Migration]) -> Result<Self> {
        let path = database_path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DownloaderError::FileIoError(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let connection_string = format!("sqlite://{}?mode=rwc", path.display());
        let connect_opts = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect_opts)
            .await?;

        let db = Self {
            pool,
            path: Some(path.to_path_buf()),
        };
        db.migrate(migrations).await?;

        log::debug!("Opened database {}", path.display());
        Ok(db)
    }

    /// Create in-memory database for testing
    pub async fn new_in_memory(migrations: &[Migration]) -> Result<Self> {
        let connect_opts = SqliteConnectOptions::from_str("sqlite::memory:")?
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(1) // Every connection would get its own memory database
            .connect_with(connect_opts)
            .await?;

        let db = Self { pool, path: None };
        db.migrate(migrations).await?;

        Ok(db)
    }

    /// Apply pending migrations
    pub async fn migrate(&self, migrations: &[Migration]) -> Result<()> {
        run_migrations(&self.pool, migrations)
            .await
            .map_err(|e| DownloaderError::MigrationFailed(e.to_string()))
    }

    /// Get reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get database file path
    ///
    /// Returns `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close database and release all connections
    pub async fn close(self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrations::PRIVATE_INDEX_MIGRATIONS;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new_in_memory(PRIVATE_INDEX_MIGRATIONS)
            .await
            .expect("Failed to create in-memory database");

        let result: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(db.pool())
            .await
            .expect("Failed to query database");

        assert_eq!(result, 1);
        assert!(db.path().is_none());
    }

    #[tokio::test]
    async fn test_file_database_creates_parent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("databases").join("index.db");

        let db = Database::new(&path, PRIVATE_INDEX_MIGRATIONS)
            .await
            .expect("Failed to create database");

        assert!(path.exists());
        assert_eq!(db.path(), Some(path.as_path()));
        db.close().await.unwrap();
    }
}
