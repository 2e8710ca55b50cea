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


//! Download requests and host method arguments
//!
//! Host arguments arrive as JSON with the plugin's camelCase keys and are
//! turned into an immutable [`DownloadRequest`] before any work starts.

use crate::error::{DownloaderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path};
use url::Url;

/// Where a download ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    /// Shared volume, registered in the platform media catalog
    Public,
    /// App-private area, registered in the private index
    Private,
}

impl Visibility {
    pub fn from_in_public_dir(in_public_dir: bool) -> Self {
        if in_public_dir {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    pub fn is_public(self) -> bool {
        self == Visibility::Public
    }
}

/// Directory category below the public or private root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetCategory {
    Downloads,
    Pictures,
    Dcim,
    Movies,
    /// Raw directory name passed through unchanged
    Custom(String),
}

impl TargetCategory {
    pub const DEFAULT_TOKEN: &'static str = "DIRECTORY_DOWNLOADS";

    /// Parse a host directory token; unknown tokens pass through as-is
    pub fn from_token(token: &str) -> Self {
        match token {
            "DIRECTORY_DOWNLOADS" => TargetCategory::Downloads,
            "DIRECTORY_PICTURES" => TargetCategory::Pictures,
            "DIRECTORY_DCIM" => TargetCategory::Dcim,
            "DIRECTORY_MOVIES" => TargetCategory::Movies,
            other => TargetCategory::Custom(other.to_string()),
        }
    }

    /// Directory name on disk (matches the platform's standard names)
    pub fn directory_name(&self) -> &str {
        match self {
            TargetCategory::Downloads => "Download",
            TargetCategory::Pictures => "Pictures",
            TargetCategory::Dcim => "DCIM",
            TargetCategory::Movies => "Movies",
            TargetCategory::Custom(name) => name,
        }
    }
}

impl Default for TargetCategory {
    fn default() -> Self {
        TargetCategory::Downloads
    }
}

/// One download, fixed at creation
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub source_url: Url,
    pub headers: HashMap<String, String>,
    pub visibility: Visibility,
    pub target_category: TargetCategory,
    /// Fixed temporary name, also used verbatim as the final file name.
    /// May contain sub-directories below the category directory.
    pub sub_directory_override: Option<String>,
    pub mime_type_override: Option<String>,
}

impl DownloadRequest {
    /// Build a request with defaults for everything but the URL
    pub fn new(source_url: Url) -> Self {
        Self {
            source_url,
            headers: HashMap::new(),
            visibility: Visibility::Public,
            target_category: TargetCategory::default(),
            sub_directory_override: None,
            mime_type_override: None,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_category(mut self, category: TargetCategory) -> Self {
        self.target_category = category;
        self
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_sub_directory<S: Into<String>>(mut self, name: S) -> Self {
        self.sub_directory_override = Some(name.into());
        self
    }

    pub fn with_mime_type<S: Into<String>>(mut self, mime_type: S) -> Self {
        self.mime_type_override = Some(mime_type.into());
        self
    }
}

/// Arguments of `downloadImage`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadImageArgs {
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    pub mime_type: Option<String>,
    pub in_public_dir: Option<bool>,
    pub directory: Option<String>,
    pub sub_directory: Option<String>,
}

impl DownloadImageArgs {
    pub fn for_url<S: Into<String>>(url: S) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Visibility requested by the call; anything but an explicit `false` is public
    pub fn visibility(&self) -> Visibility {
        Visibility::from_in_public_dir(self.in_public_dir != Some(false))
    }

    /// Validate and convert into a request
    pub fn into_request(self) -> Result<DownloadRequest> {
        let visibility = self.visibility();
        let url = self.url.ok_or_else(|| DownloaderError::required("url"))?;
        let source_url = Url::parse(&url)?;

        let category = TargetCategory::from_token(
            self.directory.as_deref().unwrap_or(TargetCategory::DEFAULT_TOKEN),
        );

        if let Some(ref name) = self.sub_directory {
            if !is_relative_file_path(name) {
                return Err(DownloaderError::invalid_input(format!(
                    "subDirectory must be a relative file path: {:?}",
                    name
                )));
            }
        }

        Ok(DownloadRequest {
            source_url,
            headers: self.headers.unwrap_or_default(),
            visibility,
            target_category: category,
            sub_directory_override: self.sub_directory,
            mime_type_override: self.mime_type,
        })
    }
}

/// True for `name` or `dir/name`; rejects absolute paths, `.`/`..` and a trailing slash
fn is_relative_file_path(name: &str) -> bool {
    !name.is_empty()
        && !name.ends_with('/')
        && Path::new(name)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

/// Arguments of the `find*` methods
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindArgs {
    pub id: Option<String>,
    pub is_video: Option<bool>,
    /// Overrides the visibility remembered from the last download
    pub in_public_dir: Option<bool>,
}

/// Arguments of `open`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenArgs {
    pub path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_tokens() {
        assert_eq!(
            TargetCategory::from_token("DIRECTORY_PICTURES"),
            TargetCategory::Pictures
        );
        assert_eq!(TargetCategory::from_token("DIRECTORY_DCIM").directory_name(), "DCIM");
        assert_eq!(
            TargetCategory::from_token("Wallpapers"),
            TargetCategory::Custom("Wallpapers".to_string())
        );
        assert_eq!(TargetCategory::from_token("Wallpapers").directory_name(), "Wallpapers");
    }

    #[test]
    fn test_args_defaults() {
        let args: DownloadImageArgs =
            serde_json::from_str(r#"{"url": "https://example.com/photo.jpg"}"#).unwrap();
        let request = args.into_request().unwrap();

        assert_eq!(request.visibility, Visibility::Public);
        assert_eq!(request.target_category, TargetCategory::Downloads);
        assert!(request.headers.is_empty());
        assert!(request.sub_directory_override.is_none());
    }

    #[test]
    fn test_args_camel_case() {
        let args: DownloadImageArgs = serde_json::from_str(
            r#"{
                "url": "https://example.com/clip",
                "headers": {"Authorization": "Bearer x"},
                "mimeType": "video/mp4",
                "inPublicDir": false,
                "directory": "DIRECTORY_MOVIES",
                "subDirectory": "clip.mp4"
            }"#,
        )
        .unwrap();
        let request = args.into_request().unwrap();

        assert_eq!(request.visibility, Visibility::Private);
        assert_eq!(request.target_category, TargetCategory::Movies);
        assert_eq!(request.mime_type_override.as_deref(), Some("video/mp4"));
        assert_eq!(request.sub_directory_override.as_deref(), Some("clip.mp4"));
        assert_eq!(request.headers.get("Authorization").unwrap(), "Bearer x");
    }

    #[test]
    fn test_missing_url() {
        let err = DownloadImageArgs::default().into_request().unwrap_err();
        assert_eq!(err.to_string(), "url is required.");
    }

    #[test]
    fn test_sub_directory_rejects_escapes() {
        for name in ["../escape", "album/../../x", "/etc/passwd", "album/", "", "./a.png"] {
            let args = DownloadImageArgs {
                sub_directory: Some(name.to_string()),
                ..DownloadImageArgs::for_url("https://example.com/a.png")
            };
            assert!(
                matches!(args.into_request(), Err(DownloaderError::InvalidInput(_))),
                "{:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_sub_directory_accepts_nested_path() {
        let args = DownloadImageArgs {
            sub_directory: Some("album/2024/cat.jpg".to_string()),
            ..DownloadImageArgs::for_url("https://example.com/a.png")
        };
        let request = args.into_request().unwrap();
        assert_eq!(
            request.sub_directory_override.as_deref(),
            Some("album/2024/cat.jpg")
        );
    }
}
