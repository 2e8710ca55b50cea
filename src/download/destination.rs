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


//! Where a transfer writes before finalization

use crate::platform::StorageLayout;
use crate::request::DownloadRequest;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Local time rendered as `yyyy-MM-dd.HH.mm.sss` (seconds padded to three digits)
const TEMP_NAME_FORMAT: &str = "%Y-%m-%d.%H.%M.0%S";

/// Temporary target of one download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub directory: PathBuf,
    pub temp_name: String,
    /// Set when the caller fixed the name; reused verbatim as the final name
    pub explicit_name: bool,
}

impl Destination {
    pub fn resolve(request: &DownloadRequest, layout: &StorageLayout, now: DateTime<Local>) -> Self {
        let directory = layout.directory(request.visibility, &request.target_category);

        match &request.sub_directory_override {
            Some(name) => Self {
                directory,
                temp_name: name.clone(),
                explicit_name: true,
            },
            None => Self {
                directory,
                temp_name: temp_name_at(now),
                explicit_name: false,
            },
        }
    }

    pub fn temp_path(&self) -> PathBuf {
        self.directory.join(&self.temp_name)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Timestamp name for a download started at `now`
pub fn temp_name_at(now: DateTime<Local>) -> String {
    now.format(TEMP_NAME_FORMAT).to_string()
}
