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


//! Completion finalizer
//!
//! Runs once per successful transfer and turns the temporary artifact into
//! an indexed file.
//!
//! # Algorithm
//! 1. The artifact must exist at the temporary path, otherwise `SaveError`
//! 2. MIME type: caller override, else sniffed from the file head
//! 3. Final name: explicit name, else `<temp>.<ext>`, else the last URL
//!    path segment, else `file`
//! 4. Rename within the same directory; failure is fatal. An explicit name
//!    may be a relative path and is left where the transfer wrote it
//! 5. MIME type from the final extension if still unknown, else empty
//! 6. Insert into the index selected by visibility and return its id

use crate::download::Destination;
use crate::error::{DownloaderError, Result};
use crate::file::mime::{extension_for_mime, mime_for_path, sniff_file};
use crate::platform::{CapabilityProvider, StorageLayout};
use crate::request::{DownloadRequest, Visibility};
use crate::storage::{Indexes, NewFileRecord};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use url::Url;

/// Name used when nothing better is known
pub const FALLBACK_FILE_NAME: &str = "file";

/// Relocates and indexes finished downloads
pub struct CompletionFinalizer {
    capabilities: Arc<dyn CapabilityProvider>,
    indexes: Indexes,
}

impl CompletionFinalizer {
    pub fn new(capabilities: Arc<dyn CapabilityProvider>, indexes: Indexes) -> Self {
        Self {
            capabilities,
            indexes,
        }
    }

    /// Finalize a successful transfer; returns the new record's id
    pub async fn finalize(
        &self,
        request: &DownloadRequest,
        destination: &Destination,
    ) -> Result<String> {
        let temp_path = destination.temp_path();

        let is_file = fs::metadata(&temp_path)
            .await
            .map(|metadata| metadata.is_file())
            .unwrap_or(false);
        if !is_file {
            log::error!("Engine reported success but {:?} is missing", temp_path);
            return Err(DownloaderError::SaveError(
                temp_path.to_string_lossy().to_string(),
            ));
        }

        let mime_type = match &request.mime_type_override {
            Some(mime_type) => Some(mime_type.clone()),
            None => sniff_file(&temp_path).await?.map(str::to_string),
        };

        let file_name = final_file_name(request, destination, mime_type.as_deref());
        let final_path = destination.directory().join(&file_name);

        if final_path != temp_path {
            fs::rename(&temp_path, &final_path).await.map_err(|e| {
                DownloaderError::FileIoError(format!(
                    "Move failed: {} -> {}: {}",
                    temp_path.display(),
                    final_path.display(),
                    e
                ))
            })?;
        }

        let mime_type = mime_type
            .or_else(|| mime_for_path(&final_path).map(str::to_string))
            .unwrap_or_default();

        let record = self
            .new_record(request, &final_path, &file_name, mime_type)
            .await?;

        let id = self.indexes.select(request.visibility).insert(&record).await?;
        log::info!(
            "Saved {} ({}, {} bytes) as {}",
            record.path,
            record.mime_type,
            record.byte_size,
            id
        );
        Ok(id)
    }

    async fn new_record(
        &self,
        request: &DownloadRequest,
        final_path: &Path,
        file_name: &str,
        mime_type: String,
    ) -> Result<NewFileRecord> {
        let byte_size = fs::metadata(final_path).await?.len() as i64;
        let path = final_path.to_string_lossy().to_string();

        // An explicit name may carry sub-directories; they belong to the relative path
        let (sub_dir, display_name) = match file_name.rsplit_once('/') {
            Some((sub_dir, name)) => (Some(sub_dir), name.to_string()),
            None => (None, file_name.to_string()),
        };
        let mut relative_dir = StorageLayout::relative_dir(&request.target_category);
        if let Some(sub_dir) = sub_dir {
            relative_dir.push_str(sub_dir);
            relative_dir.push('/');
        }
        let placement = self.capabilities.catalog_placement(final_path, &relative_dir);

        // The private table always carries the absolute path
        let data = match request.visibility {
            Visibility::Public => placement.data,
            Visibility::Private => Some(path.clone()),
        };

        Ok(NewFileRecord {
            path,
            display_name,
            byte_size,
            mime_type,
            relative_path: placement.relative_path,
            data,
        })
    }
}

/// Final file name for a download
pub fn final_file_name(
    request: &DownloadRequest,
    destination: &Destination,
    mime_type: Option<&str>,
) -> String {
    if destination.explicit_name {
        return destination.temp_name.clone();
    }

    if let Some(extension) = mime_type.and_then(extension_for_mime) {
        return format!("{}.{}", destination.temp_name, extension);
    }

    last_path_segment(&request.source_url).unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// Decoded last non-empty path segment of a URL
fn last_path_segment(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());

    // An encoded slash must not escape the destination directory
    decoded
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
}
