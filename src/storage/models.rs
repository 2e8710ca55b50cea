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


//! Index records
//!
//! Both index variants share the media column layout:
//! `_id`, `mime_type`, `_data`, `_display_name`, `relative_path`, `_size`.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// RECORDS
// ============================================================================

/// A finalized download as stored in an index
///
/// Records are written once and never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Opaque id, unique within its index
    pub id: String,
    /// Absolute path of the file
    pub path: String,
    pub display_name: String,
    pub byte_size: i64,
    pub mime_type: String,
    /// Relative path hint as written at insert time
    pub relative_path: Option<String>,
}

/// Values for a new record; the index assigns the id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileRecord {
    pub path: String,
    pub display_name: String,
    pub byte_size: i64,
    pub mime_type: String,
    pub relative_path: String,
    /// Absolute path column; None when the platform derives it
    pub data: Option<String>,
}

impl NewFileRecord {
    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video")
    }
}

// ============================================================================
// PROJECTIONS
// ============================================================================

/// Column projected by a `find*` query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    Path,
    DisplayName,
    ByteSize,
    MimeType,
}

impl RecordField {
    /// Pick the field's value out of a record
    pub fn project(self, record: &FileRecord) -> FieldValue {
        match self {
            RecordField::Path => FieldValue::Text(record.path.clone()),
            RecordField::DisplayName => FieldValue::Text(record.display_name.clone()),
            RecordField::ByteSize => FieldValue::Integer(record.byte_size),
            RecordField::MimeType => FieldValue::Text(record.mime_type.clone()),
        }
    }
}

/// Projected value; byte size is the only integer field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Integer(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            FieldValue::Text(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Integer(value) => write!(f, "{}", value),
        }
    }
}
