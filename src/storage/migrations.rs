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


//! Database migrations
//!
//! Schemas are applied as runtime SQL so nothing needs a database at build
//! time. Applied migrations are tracked in the `_migrations` table.
//!
//! # Schema sets
//! - [`PRIVATE_INDEX_MIGRATIONS`] - the private fallback index, one table
//!   named after the database, all media columns as TEXT except the size
//! - [`CATALOG_MIGRATIONS`] - the local media catalog with one table per
//!   collection

use crate::error::Result;
use sqlx::{Executor, SqlitePool};

/// One schema step
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub id: i32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Private index schema (version 1)
pub const PRIVATE_INDEX_MIGRATIONS: &[Migration] = &[Migration {
    id: 1,
    name: "private_index",
    sql: r#"
CREATE TABLE IF NOT EXISTS image_downloader_temporary (
    _id TEXT,
    mime_type TEXT,
    _data TEXT,
    _display_name TEXT,
    relative_path TEXT,
    _size INTEGER
);
"#,
}];

/// Local media catalog schema
pub const CATALOG_MIGRATIONS: &[Migration] = &[Migration {
    id: 1,
    name: "media_collections",
    sql: r#"
CREATE TABLE IF NOT EXISTS media_images (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    mime_type TEXT,
    _data TEXT NOT NULL UNIQUE,
    _display_name TEXT,
    relative_path TEXT,
    _size INTEGER NOT NULL DEFAULT 0,
    date_added TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS media_videos (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    mime_type TEXT,
    _data TEXT NOT NULL UNIQUE,
    _display_name TEXT,
    relative_path TEXT,
    _size INTEGER NOT NULL DEFAULT 0,
    date_added TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
}];

/// Apply every migration of a set that hasn't been applied yet
pub async fn run_migrations(pool: &SqlitePool, migrations: &[Migration]) -> Result<()> {
    create_migrations_table(pool).await?;

    for migration in migrations {
        run_migration(pool, migration).await?;
    }

    Ok(())
}

/// Create migrations tracking table
async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;

    Ok(())
}

/// Run a single migration if it hasn't been applied yet
async fn run_migration(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let applied: Option<i32> = sqlx::query_scalar("SELECT id FROM _migrations WHERE id = ?")
        .bind(migration.id)
        .fetch_optional(pool)
        .await?;

    if applied.is_some() {
        return Ok(());
    }

    log::debug!("Applying migration {} ({})", migration.id, migration.name);
    pool.execute(migration.sql).await?;

    sqlx::query("INSERT INTO _migrations (id, name) VALUES (?, ?)")
        .bind(migration.id)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}
