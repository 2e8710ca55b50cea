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


//! Open a downloaded file in an external viewer

use crate::error::{DownloaderError, Result};
use crate::file::mime::mime_for_path;
use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus};
use std::thread::{self, JoinHandle};
use url::Url;

/// Message reported when no viewer handles the file
pub const PREVIEW_UNSUPPORTED: &str = "This file is not supported for previewing";

/// Host facility that can show a file
pub trait ExternalViewer: Send + Sync {
    /// Reference other apps may read (a file provider uri on Android)
    fn shareable_uri(&self, path: &Path) -> Result<String>;

    /// Whether any viewer accepts the reference
    fn has_handler(&self, uri: &str, mime_type: Option<&str>) -> bool;

    fn launch(&self, uri: &str, mime_type: Option<&str>) -> Result<()>;
}

/// Open `path` with whatever viewer the host offers
pub fn open_externally(viewer: &dyn ExternalViewer, path: Option<&str>) -> Result<()> {
    let path = Path::new(path.ok_or_else(|| DownloaderError::required("path"))?);

    let uri = viewer.shareable_uri(path)?;
    let mime_type = mime_for_path(path);

    if !viewer.has_handler(&uri, mime_type) {
        log::info!("No viewer for {} ({:?})", uri, mime_type);
        return Err(DownloaderError::PreviewError(PREVIEW_UNSUPPORTED.to_string()));
    }

    log::debug!("Opening {} as {:?}", uri, mime_type);
    viewer.launch(&uri, mime_type)
}

/// Desktop viewer using the platform opener
#[derive(Debug, Clone, Default)]
pub struct SystemViewer;

impl SystemViewer {
    fn opener() -> &'static str {
        if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        }
    }
}

impl ExternalViewer for SystemViewer {
    fn shareable_uri(&self, path: &Path) -> Result<String> {
        Url::from_file_path(path)
            .map(|url| url.to_string())
            .map_err(|_| {
                DownloaderError::invalid_input(format!(
                    "path must be absolute: {}",
                    path.display()
                ))
            })
    }

    fn has_handler(&self, _uri: &str, mime_type: Option<&str>) -> bool {
        // The desktop opener picks by content; files of unknown type are left alone
        mime_type.is_some()
    }

    fn launch(&self, uri: &str, _mime_type: Option<&str>) -> Result<()> {
        let mut command = Command::new(Self::opener());
        command.arg(uri);
        spawn_detached(command).map_err(|e| {
            DownloaderError::PreviewError(format!("Failed to start {}: {}", Self::opener(), e))
        })?;
        Ok(())
    }
}

/// Start `command` and reap it on a background thread once it exits
fn spawn_detached(mut command: Command) -> io::Result<JoinHandle<io::Result<ExitStatus>>> {
    let mut child = command.spawn()?;
    Ok(thread::spawn(move || {
        let status = child.wait();
        if let Err(ref e) = status {
            log::warn!("Viewer process {} was not reaped: {}", child.id(), e);
        }
        status
    }))
}
