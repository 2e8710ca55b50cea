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


//! Query façade behind the `find*` methods
//!
//! Resolves an id to one field of its record. Queries are read-only, so
//! repeating one returns the same value.

use crate::error::{DownloaderError, Result};
use crate::request::Visibility;
use crate::storage::{FieldValue, Indexes, RecordField};

pub struct QueryFacade {
    indexes: Indexes,
}

impl QueryFacade {
    pub fn new(indexes: Indexes) -> Self {
        Self { indexes }
    }

    /// Project one field of the record `id` resolves to
    pub async fn find_field(
        &self,
        id: Option<&str>,
        visibility: Visibility,
        is_video: Option<bool>,
        field: RecordField,
    ) -> Result<Option<FieldValue>> {
        let id = id.ok_or_else(|| DownloaderError::required("id"))?;

        let record = self.indexes.select(visibility).find(id, is_video).await?;
        if record.is_none() {
            log::debug!("No {:?} record for id {}", visibility, id);
        }

        Ok(record.map(|record| field.project(&record)))
    }

    pub async fn find_path(
        &self,
        id: Option<&str>,
        visibility: Visibility,
        is_video: Option<bool>,
    ) -> Result<Option<String>> {
        self.find_text(id, visibility, is_video, RecordField::Path).await
    }

    pub async fn find_name(
        &self,
        id: Option<&str>,
        visibility: Visibility,
        is_video: Option<bool>,
    ) -> Result<Option<String>> {
        self.find_text(id, visibility, is_video, RecordField::DisplayName)
            .await
    }

    pub async fn find_mime_type(
        &self,
        id: Option<&str>,
        visibility: Visibility,
        is_video: Option<bool>,
    ) -> Result<Option<String>> {
        self.find_text(id, visibility, is_video, RecordField::MimeType)
            .await
    }

    pub async fn find_byte_size(
        &self,
        id: Option<&str>,
        visibility: Visibility,
        is_video: Option<bool>,
    ) -> Result<Option<i64>> {
        let value = self
            .find_field(id, visibility, is_video, RecordField::ByteSize)
            .await?;
        Ok(value.and_then(|v| v.as_integer()))
    }

    async fn find_text(
        &self,
        id: Option<&str>,
        visibility: Visibility,
        is_video: Option<bool>,
        field: RecordField,
    ) -> Result<Option<String>> {
        let value = self.find_field(id, visibility, is_video, field).await?;
        Ok(value.and_then(|v| v.as_text().map(str::to_string)))
    }
}
