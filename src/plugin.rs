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


//! Plugin handle
//!
//! [`ImageDownloader`] is what a host binds to. It is attached with the
//! host's collaborators, serves the method calls, and is detached on
//! teardown.
//!
//! # Methods
//! - `download_image` - gate, transfer, finalize; resolves to the new id,
//!   or `None` when the permission was denied
//! - `cancel` - cancel the active transfer
//! - `open` - show a file in an external viewer
//! - `find_path` / `find_name` / `find_byte_size` / `find_mime_type`
//!
//! The visibility of the most recent `download_image` call is remembered
//! and used by the `find*` methods unless they pass their own.

use crate::config::DownloaderConfig;
use crate::download::{
    Destination, DownloadEvent, DownloadOrchestrator, EventCallback, TransferEngine,
    TransferEvent, TransferOutcome, TransferTask,
};
use crate::error::{DownloaderError, Result};
use crate::file::CompletionFinalizer;
use crate::permission::{PermissionAuthority, PermissionGate, PermissionOutcome};
use crate::platform::{capabilities_for, CapabilityProvider, StorageLayout};
use crate::query::QueryFacade;
use crate::request::{DownloadImageArgs, FindArgs, OpenArgs, Visibility};
use crate::storage::{Indexes, MediaCatalog, PrivateIndex, SharedIndex};
use crate::viewer::{open_externally, ExternalViewer};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, RwLock};

/// Progress notification forwarded to the host as `onProgressUpdate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub id: String,
    pub progress: u8,
}

/// Host collaborators supplied on attach
pub struct HostContext {
    pub config: DownloaderConfig,
    pub engine: Arc<dyn TransferEngine>,
    pub catalog: Arc<dyn MediaCatalog>,
    pub authority: Arc<dyn PermissionAuthority>,
    pub viewer: Arc<dyn ExternalViewer>,
    /// Overrides the provider derived from `config.sdk_version`
    pub capabilities: Option<Arc<dyn CapabilityProvider>>,
}

impl HostContext {
    pub fn new(
        config: DownloaderConfig,
        engine: Arc<dyn TransferEngine>,
        catalog: Arc<dyn MediaCatalog>,
        authority: Arc<dyn PermissionAuthority>,
        viewer: Arc<dyn ExternalViewer>,
    ) -> Self {
        Self {
            config,
            engine,
            catalog,
            authority,
            viewer,
            capabilities: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Arc<dyn CapabilityProvider>) -> Self {
        self.capabilities = Some(capabilities);
        self
    }
}

/// Everything that lives between attach and detach
struct Session {
    layout: StorageLayout,
    gate: PermissionGate,
    orchestrator: DownloadOrchestrator,
    finalizer: CompletionFinalizer,
    queries: QueryFacade,
    indexes: Indexes,
    viewer: Arc<dyn ExternalViewer>,
}

impl Session {
    async fn open(context: HostContext) -> Result<Self> {
        context.config.validate()?;

        let capabilities = context
            .capabilities
            .unwrap_or_else(|| capabilities_for(context.config.sdk_version));

        let private = PrivateIndex::open(&context.config.database_path).await?;
        let indexes = Indexes::new(
            Arc::new(SharedIndex::new(context.catalog)),
            Arc::new(private),
        );

        let gate = PermissionGate::new(Arc::clone(&capabilities));
        gate.attach(context.authority);

        Ok(Self {
            layout: StorageLayout::from_config(&context.config),
            gate,
            orchestrator: DownloadOrchestrator::new(context.engine),
            finalizer: CompletionFinalizer::new(capabilities, indexes.clone()),
            queries: QueryFacade::new(indexes.clone()),
            indexes,
            viewer: context.viewer,
        })
    }
}

/// Plugin instance
pub struct ImageDownloader {
    session: RwLock<Option<Arc<Session>>>,
    last_visibility: Mutex<Visibility>,
}

impl Default for ImageDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageDownloader {
    pub fn new() -> Self {
        Self {
            session: RwLock::new(None),
            last_visibility: Mutex::new(Visibility::Public),
        }
    }

    /// Bind to a host; replaces any previous binding
    pub async fn attach(&self, context: HostContext) -> Result<()> {
        let session = Arc::new(Session::open(context).await?);

        let previous = {
            let mut slot = self.session.write().unwrap_or_else(|p| p.into_inner());
            slot.replace(session)
        };
        if let Some(previous) = previous {
            log::debug!("Re-attaching; releasing previous host binding");
            previous.gate.detach();
        }

        log::info!("Image downloader attached");
        Ok(())
    }

    /// Unbind from the host. Safe to call repeatedly.
    ///
    /// A transfer already running keeps running; its call still resolves.
    pub fn detach(&self) {
        let previous = self
            .session
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .take();

        if let Some(session) = previous {
            session.gate.detach();
            log::info!("Image downloader detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// Visibility used by `find*` calls that don't pass one
    pub fn last_visibility(&self) -> Visibility {
        *self.last_visibility.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn session(&self) -> Result<Arc<Session>> {
        self.session
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| DownloaderError::InvalidState("not attached to a host".to_string()))
    }

    /// Download, persist and index one file
    ///
    /// Resolves to `None` when the storage permission is denied.
    pub async fn download_image(
        &self,
        args: DownloadImageArgs,
        progress: EventCallback<ProgressUpdate>,
    ) -> Result<Option<String>> {
        let session = self.session()?;

        let visibility = args.visibility();
        *self.last_visibility.lock().unwrap_or_else(|p| p.into_inner()) = visibility;

        let request = args.into_request()?;
        log::debug!("downloadImage {} ({:?})", request.source_url, visibility);

        if session.orchestrator.is_active().await {
            return Err(DownloaderError::Busy);
        }

        if session.gate.request_if_needed(visibility).await? == PermissionOutcome::Denied {
            log::info!("Storage permission denied for {}", request.source_url);
            return Ok(None);
        }

        let destination = Destination::resolve(&request, &session.layout, chrono::Local::now());

        if visibility == Visibility::Private {
            session.indexes.private.reset().await?;
        }

        let task = TransferTask {
            url: request.source_url.clone(),
            headers: request.headers.clone(),
            destination: destination.temp_path(),
        };

        let handle = session
            .orchestrator
            .start(task, running_progress(progress))
            .await?;

        match handle.wait().await {
            TransferOutcome::Completed => session
                .finalizer
                .finalize(&request, &destination)
                .await
                .map(Some),
            TransferOutcome::Failed { reason, code } => {
                Err(DownloaderError::TransferFailed { reason, code })
            }
            TransferOutcome::Cancelled => Err(DownloaderError::Cancelled),
            TransferOutcome::Stalled { last } => {
                Err(DownloaderError::TransferStalled(describe_last(last.as_ref())))
            }
        }
    }

    /// Cancel the active transfer; false when none was running
    pub async fn cancel(&self) -> Result<bool> {
        self.session()?.orchestrator.cancel().await
    }

    pub fn open(&self, args: OpenArgs) -> Result<()> {
        let session = self.session()?;
        open_externally(session.viewer.as_ref(), args.path.as_deref())
    }

    pub async fn find_path(&self, args: FindArgs) -> Result<Option<String>> {
        let visibility = self.query_visibility(&args);
        self.session()?
            .queries
            .find_path(args.id.as_deref(), visibility, args.is_video)
            .await
    }

    pub async fn find_name(&self, args: FindArgs) -> Result<Option<String>> {
        let visibility = self.query_visibility(&args);
        self.session()?
            .queries
            .find_name(args.id.as_deref(), visibility, args.is_video)
            .await
    }

    pub async fn find_byte_size(&self, args: FindArgs) -> Result<Option<i64>> {
        let visibility = self.query_visibility(&args);
        self.session()?
            .queries
            .find_byte_size(args.id.as_deref(), visibility, args.is_video)
            .await
    }

    pub async fn find_mime_type(&self, args: FindArgs) -> Result<Option<String>> {
        let visibility = self.query_visibility(&args);
        self.session()?
            .queries
            .find_mime_type(args.id.as_deref(), visibility, args.is_video)
            .await
    }

    /// Deliver a permission result from the host; false if nobody consumed it
    pub fn on_permission_result(&self, request_code: i32, granted: bool) -> bool {
        match self.session() {
            Ok(session) => session.gate.on_permission_result(request_code, granted),
            Err(_) => false,
        }
    }

    fn query_visibility(&self, args: &FindArgs) -> Visibility {
        args.in_public_dir
            .map(Visibility::from_in_public_dir)
            .unwrap_or_else(|| self.last_visibility())
    }
}

/// Forward determinate `Running` events only; everything else stays in the log
fn running_progress(progress: EventCallback<ProgressUpdate>) -> EventCallback<TransferEvent> {
    Arc::new(move |event: TransferEvent| {
        if let DownloadEvent::Running {
            progress_percent: Some(percent),
        } = event.event
        {
            progress(ProgressUpdate {
                id: event.transfer_id.to_string(),
                progress: percent,
            });
        }
    })
}

fn describe_last(last: Option<&DownloadEvent>) -> String {
    match last {
        None => "no status was reported".to_string(),
        Some(DownloadEvent::Paused { reason }) => format!("last seen paused ({})", reason),
        Some(DownloadEvent::Running {
            progress_percent: Some(percent),
        }) => format!("last seen running at {}%", percent),
        Some(other) => format!("last seen {:?}", other),
    }
}
