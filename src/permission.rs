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


//! Storage-write permission gate
//!
//! The gate is the only place that talks to the host's permission dialog.
//! A request that needs the dialog parks on a oneshot channel until the host
//! reports the result through [`PermissionGate::on_permission_result`].
//!
//! # Rules
//! - Private downloads never need the permission
//! - Platforms where the capability is implicit never need it
//! - At most one request is pending; a newer request replaces it and the
//!   older waiter resolves with [`DownloaderError::Superseded`]
//! - Results arriving while detached, or for another request code, are ignored

use crate::error::{DownloaderError, Result};
use crate::platform::CapabilityProvider;
use crate::request::Visibility;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Request code used for the storage-write prompt
pub const STORAGE_PERMISSION_REQUEST_CODE: i32 = 2;

/// Outcome of a permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    Denied,
}

/// Host side of the permission dialog
pub trait PermissionAuthority: Send + Sync {
    /// Whether the write permission is already held
    fn already_granted(&self) -> bool;

    /// Show the prompt; the answer comes back through the gate
    fn request_write_permission(&self, request_code: i32) -> Result<()>;
}

/// Authority whose answer is fixed up front (desktop hosts, tests)
#[derive(Debug, Clone, Copy)]
pub struct StaticAuthority {
    granted: bool,
}

impl StaticAuthority {
    pub fn granting() -> Self {
        Self { granted: true }
    }

    pub fn denying() -> Self {
        Self { granted: false }
    }
}

impl PermissionAuthority for StaticAuthority {
    fn already_granted(&self) -> bool {
        self.granted
    }

    fn request_write_permission(&self, _request_code: i32) -> Result<()> {
        Err(DownloaderError::InvalidState(
            "static authority cannot prompt".to_string(),
        ))
    }
}

#[derive(Default)]
struct GateState {
    authority: Option<Arc<dyn PermissionAuthority>>,
    pending: Option<oneshot::Sender<PermissionOutcome>>,
}

/// One-shot gate in front of the storage-write permission
pub struct PermissionGate {
    capabilities: Arc<dyn CapabilityProvider>,
    state: Mutex<GateState>,
}

impl PermissionGate {
    pub fn new(capabilities: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            capabilities,
            state: Mutex::new(GateState::default()),
        }
    }

    /// Register as the result listener of a host activity
    pub fn attach(&self, authority: Arc<dyn PermissionAuthority>) {
        let mut state = self.lock();
        state.authority = Some(authority);
    }

    /// Unregister; a pending request is abandoned. Safe to call repeatedly.
    pub fn detach(&self) {
        let mut state = self.lock();
        if state.pending.take().is_some() {
            log::debug!("Dropping pending permission request on detach");
        }
        state.authority = None;
    }

    pub fn is_attached(&self) -> bool {
        self.lock().authority.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Resolve once the download may write to its target
    pub async fn request_if_needed(&self, visibility: Visibility) -> Result<PermissionOutcome> {
        if visibility == Visibility::Private {
            return Ok(PermissionOutcome::Granted);
        }

        if self.capabilities.write_permission_implicit() {
            return Ok(PermissionOutcome::Granted);
        }

        let (authority, rx) = {
            let mut state = self.lock();
            let authority = state.authority.clone().ok_or_else(|| {
                DownloaderError::InvalidState("not attached to a host activity".to_string())
            })?;

            if authority.already_granted() {
                return Ok(PermissionOutcome::Granted);
            }

            let (tx, rx) = oneshot::channel();
            if state.pending.replace(tx).is_some() {
                log::debug!("Replacing pending permission request");
            }
            (authority, rx)
        };

        if let Err(e) = authority.request_write_permission(STORAGE_PERMISSION_REQUEST_CODE) {
            self.lock().pending = None;
            return Err(e);
        }

        rx.await.map_err(|_| DownloaderError::Superseded)
    }

    /// Deliver the host's answer; returns whether the result was consumed
    pub fn on_permission_result(&self, request_code: i32, granted: bool) -> bool {
        if request_code != STORAGE_PERMISSION_REQUEST_CODE {
            return false;
        }

        let pending = {
            let mut state = self.lock();
            if state.authority.is_none() {
                return false;
            }
            state.pending.take()
        };

        match pending {
            Some(tx) => {
                let outcome = if granted {
                    PermissionOutcome::Granted
                } else {
                    PermissionOutcome::Denied
                };
                log::debug!("Permission result: {:?}", outcome);
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        // The state holds no invariants a panic could break
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
