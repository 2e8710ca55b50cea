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


//! Error types for the downloader core
//!
//! Every failure that reaches the host carries a stable wire code (see
//! [`DownloaderError::code`]) next to its human-readable message. The host
//! bridge forwards both unchanged.
//!
//! # Taxonomy
//!
//! ### Caller errors
//! - Missing required argument → `Precondition`
//! - Malformed argument → `InvalidInput`
//!
//! ### Transfer (from the external engine)
//! - Engine reported failure → `TransferFailed` (reason passed through verbatim)
//! - Status stream ended without a terminal status → `TransferStalled`
//! - Caller cancelled → `Cancelled`
//! - A transfer is already active → `Busy`
//!
//! ### Finalization and indexing
//! - Engine reported success but no artifact → `SaveError`
//! - Rename of the artifact failed → `FileIoError`
//! - Inserted catalog row could not be re-queried → `NotFound`
//!
//! ### Host interaction
//! - No viewer for the artifact → `PreviewError`
//! - Pending permission request replaced by a newer one → `Superseded`
//! - Core used while detached → `InvalidState`
//!
//! Permission denial is not an error: the download call resolves with no id.

use thiserror::Error;

/// Result type alias using our DownloaderError type
pub type Result<T> = std::result::Result<T, DownloaderError>;

/// Main error type for the downloader core
#[derive(Error, Debug)]
pub enum DownloaderError {
    // ===== Caller Errors =====

    /// Required argument missing, or a required channel could not be opened
    #[error("{0}")]
    Precondition(String),

    /// Argument present but malformed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ===== Transfer Errors =====

    /// The external engine reported a failure
    #[error("Download failed: {reason}")]
    TransferFailed {
        reason: String,
        /// Engine reason code if available
        code: Option<i32>,
    },

    /// The engine stopped reporting before reaching a terminal state
    #[error("Download stalled: {0}")]
    TransferStalled(String),

    /// Operation was cancelled by the caller
    #[error("Download cancelled")]
    Cancelled,

    /// Another transfer is already in flight on this instance
    #[error("A download is already in progress")]
    Busy,

    // ===== Finalization Errors =====

    /// Engine reported success but the artifact never materialized
    #[error("Couldn't save {0}")]
    SaveError(String),

    /// Generic file I/O error
    #[error("File I/O error: {0}")]
    FileIoError(String),

    /// Catalog row not recoverable after insert
    #[error("{0} is not found.")]
    NotFound(String),

    // ===== Host Errors =====

    /// No viewer registered for the artifact
    #[error("{0}")]
    PreviewError(String),

    /// A newer permission request replaced this one before it resolved
    #[error("Permission request superseded by a newer download")]
    Superseded,

    /// Core used outside of an attach/detach window, or similar misuse
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Database schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JNI bridge error (Android only)
    #[error("JNI error: {0}")]
    #[cfg(target_os = "android")]
    JniError(String),
}

#[cfg(target_os = "android")]
impl From<jni::errors::Error> for DownloaderError {
    fn from(err: jni::errors::Error) -> Self {
        DownloaderError::JniError(err.to_string())
    }
}

// Helper methods for creating common errors
impl DownloaderError {
    /// Create a Precondition error for a missing argument
    pub fn required<S: AsRef<str>>(argument: S) -> Self {
        DownloaderError::Precondition(format!("{} is required.", argument.as_ref()))
    }

    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        DownloaderError::InvalidInput(message.into())
    }

    /// Create a TransferFailed error
    pub fn transfer_failed<S: Into<String>>(reason: S, code: Option<i32>) -> Self {
        DownloaderError::TransferFailed {
            reason: reason.into(),
            code,
        }
    }

    /// Stable code reported to the host alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            DownloaderError::Precondition(_) => "precondition",
            DownloaderError::InvalidInput(_) => "invalid_input",
            DownloaderError::TransferFailed { .. } => "transfer_failed",
            DownloaderError::TransferStalled(_) => "transfer_stalled",
            DownloaderError::Cancelled => "cancelled",
            DownloaderError::Busy => "busy",
            DownloaderError::SaveError(_) => "save_error",
            DownloaderError::FileIoError(_) | DownloaderError::IoError(_) => "file_error",
            DownloaderError::NotFound(_) => "not_found",
            DownloaderError::PreviewError(_) => "preview_error",
            DownloaderError::Superseded => "superseded",
            DownloaderError::InvalidState(_) => "invalid_state",
            DownloaderError::InvalidConfiguration(_) => "invalid_configuration",
            DownloaderError::MigrationFailed(_) | DownloaderError::SqlxError(_) => "database_error",
            DownloaderError::ReqwestError(_) => "network_error",
            DownloaderError::SerdeJsonError(_) => "invalid_arguments",
            DownloaderError::UrlError(_) => "invalid_url",
            #[cfg(target_os = "android")]
            DownloaderError::JniError(_) => "jni_error",
        }
    }

    /// Check if error came out of the transfer stage
    pub fn is_transfer_error(&self) -> bool {
        matches!(
            self,
            DownloaderError::TransferFailed { .. }
                | DownloaderError::TransferStalled(_)
                | DownloaderError::Cancelled
                | DownloaderError::Busy
                | DownloaderError::ReqwestError(_)
        )
    }

    /// Check if error came out of finalization or indexing
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            DownloaderError::SaveError(_)
                | DownloaderError::FileIoError(_)
                | DownloaderError::NotFound(_)
                | DownloaderError::IoError(_)
                | DownloaderError::SqlxError(_)
                | DownloaderError::MigrationFailed(_)
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            DownloaderError::Busy => {
                "Another download is still running. Cancel it or wait for it to finish.".to_string()
            }
            DownloaderError::TransferFailed { reason, .. } => {
                format!("The download failed: {}.", reason)
            }
            DownloaderError::SaveError(path) => {
                format!("The file was downloaded but could not be saved to {}.", path)
            }
            DownloaderError::Superseded => {
                "This download was replaced by a newer one.".to_string()
            }
            _ => self.to_string(),
        }
    }
}
