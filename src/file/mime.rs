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


//! MIME type detection
//!
//! - [`sniff_mime_type`] looks at the leading bytes of a file
//! - [`extension_for_mime`] / [`mime_for_extension`] map between MIME types
//!   and file extensions

use crate::error::Result;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Bytes read from the head of a file for sniffing
pub const SNIFF_LEN: usize = 64;

/// (MIME type, extension); the first entry for a MIME type is its preferred extension
const EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpeg", "jpeg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/bmp", "bmp"),
    ("image/x-ms-bmp", "bmp"),
    ("image/webp", "webp"),
    ("image/tiff", "tiff"),
    ("image/tiff", "tif"),
    ("image/heif", "heif"),
    ("image/heic", "heic"),
    ("image/svg+xml", "svg"),
    ("video/mp4", "mp4"),
    ("video/quicktime", "mov"),
    ("video/webm", "webm"),
    ("video/x-matroska", "mkv"),
    ("video/3gpp", "3gp"),
    ("audio/mpeg", "mp3"),
    ("audio/x-wav", "wav"),
    ("text/html", "html"),
    ("application/xml", "xml"),
];

/// Guess a MIME type from leading bytes
pub fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some("image/png");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.starts_with(b"BM") && bytes.len() >= 14 {
        return Some("image/bmp");
    }
    if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        return Some("image/tiff");
    }

    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" {
        match &bytes[8..12] {
            b"WEBP" => return Some("image/webp"),
            b"WAVE" => return Some("audio/x-wav"),
            _ => {}
        }
    }

    // ISO base media: size(4) "ftyp" brand(4)
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return Some(match &bytes[8..12] {
            b"qt  " => "video/quicktime",
            b"heic" | b"heix" => "image/heic",
            b"mif1" | b"msf1" => "image/heif",
            b"3gp4" | b"3gp5" | b"3g2a" => "video/3gpp",
            _ => "video/mp4",
        });
    }

    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        let head = String::from_utf8_lossy(bytes);
        return Some(if head.contains("webm") {
            "video/webm"
        } else {
            "video/x-matroska"
        });
    }

    if bytes.starts_with(b"ID3") {
        return Some("audio/mpeg");
    }

    sniff_markup(bytes)
}

fn sniff_markup(bytes: &[u8]) -> Option<&'static str> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    let lower = text.to_ascii_lowercase();

    if lower.starts_with("<?xml") {
        return Some(if lower.contains("<svg") {
            "image/svg+xml"
        } else {
            "application/xml"
        });
    }
    if lower.starts_with("<svg") {
        return Some("image/svg+xml");
    }
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        return Some("text/html");
    }
    None
}

/// Sniff the head of a file
pub async fn sniff_file(path: &Path) -> Result<Option<&'static str>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut head = vec![0u8; SNIFF_LEN];
    let mut filled = 0;

    while filled < SNIFF_LEN {
        let n = file.read(&mut head[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(sniff_mime_type(&head[..filled]))
}

/// Preferred extension for a MIME type
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let mime_type = mime_type.split(';').next().unwrap_or("").trim();
    EXTENSIONS
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(mime_type))
        .map(|(_, ext)| *ext)
}

/// MIME type for a file extension
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    EXTENSIONS
        .iter()
        .find(|(_, ext)| ext.eq_ignore_ascii_case(extension))
        .map(|(mime, _)| *mime)
}

/// MIME type for a path, from its extension
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(mime_for_extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sniff_images() {
        assert_eq!(sniff_mime_type(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10]), Some("image/jpeg"));
        assert_eq!(sniff_mime_type(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"), Some("image/png"));
        assert_eq!(sniff_mime_type(b"GIF89a\x01\0\x01\0"), Some("image/gif"));
        assert_eq!(sniff_mime_type(b"RIFF\x24\0\0\0WEBPVP8 "), Some("image/webp"));
    }

    #[test]
    fn test_sniff_video() {
        assert_eq!(sniff_mime_type(b"\0\0\0\x20ftypisom\0\0\x02\0"), Some("video/mp4"));
        assert_eq!(sniff_mime_type(b"\0\0\0\x14ftypqt  \0\0\0\0"), Some("video/quicktime"));
        assert_eq!(
            sniff_mime_type(b"\x1a\x45\xdf\xa3\x9f\x42\x86\x81\x01\x42\x82\x84webm"),
            Some("video/webm")
        );
    }

    #[test]
    fn test_sniff_markup_and_unknown() {
        assert_eq!(sniff_mime_type(b"  <!DOCTYPE html><html>"), Some("text/html"));
        assert_eq!(sniff_mime_type(b"<?xml version=\"1.0\"?><svg"), Some("image/svg+xml"));
        assert_eq!(sniff_mime_type(b"plain text"), None);
        assert_eq!(sniff_mime_type(&[]), None);
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(extension_for_mime("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for_mime("video/mp4; codecs=avc1"), Some("mp4"));
        assert_eq!(extension_for_mime("application/x-unknown"), None);
        assert_eq!(mime_for_extension("JPEG"), Some("image/jpeg"));
        assert_eq!(mime_for_path(Path::new("/a/clip.mov")), Some("video/quicktime"));
        assert_eq!(mime_for_path(Path::new("/a/noext")), None);
    }

    #[tokio::test]
    async fn test_sniff_short_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tiny");
        std::fs::write(&path, b"GIF87a").unwrap();

        assert_eq!(sniff_file(&path).await.unwrap(), Some("image/gif"));
    }
}
