//! Shared fixtures for the workflow tests
//!
//! A scripted transfer engine, host stand-ins and a harness that attaches an
//! [`ImageDownloader`] inside a temporary directory.

#![allow(dead_code)]

use async_trait::async_trait;
use image_downloader_core::download::{
    channel_callback, RawStatus, StatusReceiver, TransferEngine, TransferId, TransferTask,
};
use image_downloader_core::error::{DownloaderError, Result};
use image_downloader_core::permission::PermissionAuthority;
use image_downloader_core::platform::{LegacyStorage, ScopedStorage};
use image_downloader_core::storage::{
    CatalogRow, CatalogValues, LocalMediaCatalog, MediaCatalog, MediaCollection, PrivateIndex,
};
use image_downloader_core::viewer::ExternalViewer;
use image_downloader_core::{DownloaderConfig, HostContext, ImageDownloader, ProgressUpdate};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x10\0\0\0\x10";
pub const JPEG: &[u8] = b"\xff\xd8\xff\xe0\0\x10JFIF\0\x01\x01\0\0\x01\0\x01\0\0";

/// What the scripted engine does with the next transfer
#[derive(Debug, Clone)]
pub enum Script {
    /// Write the body and report success
    Succeed(Vec<u8>),
    /// Report failure with a platform reason code
    Fail(i32),
    /// Report success without writing anything
    SucceedWithoutFile,
    /// Report progress and never finish
    Hang,
}

/// Engine that plays back one [`Script`] per enqueued transfer
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: Mutex<VecDeque<Script>>,
    transfers: Mutex<HashMap<TransferId, (TransferTask, Script)>>,
    tasks: Mutex<Vec<TransferTask>>,
    hanging: Mutex<Vec<mpsc::UnboundedSender<RawStatus>>>,
    next_id: AtomicUsize,
    cancelled: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            ..Default::default()
        })
    }

    pub fn tasks(&self) -> Vec<TransferTask> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until `count` transfers were enqueued
    pub async fn wait_for_tasks(&self, count: usize) {
        for _ in 0..500 {
            if self.tasks.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("engine never saw {} transfers", count);
    }
}

#[async_trait]
impl TransferEngine for ScriptedEngine {
    async fn enqueue(&self, task: TransferTask) -> Result<TransferId> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = TransferId::new(format!("t{}", n));
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::Succeed(PNG.to_vec()));

        self.tasks.lock().unwrap().push(task.clone());
        self.transfers
            .lock()
            .unwrap()
            .insert(id.clone(), (task, script));
        Ok(id)
    }

    async fn subscribe(&self, id: &TransferId) -> Result<StatusReceiver> {
        let (task, script) = self
            .transfers
            .lock()
            .unwrap()
            .remove(id)
            .ok_or_else(|| DownloaderError::InvalidState(format!("unknown transfer {}", id)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(RawStatus::pending()).unwrap();

        match script {
            Script::Succeed(body) => {
                if let Some(parent) = task.destination.parent() {
                    std::fs::create_dir_all(parent).unwrap();
                }
                std::fs::write(&task.destination, &body).unwrap();

                let total = body.len() as u64;
                tx.send(RawStatus::running(0, None)).unwrap();
                tx.send(RawStatus::running(total / 2, Some(total))).unwrap();
                tx.send(RawStatus::running(total, Some(total))).unwrap();
                tx.send(RawStatus::successful(total)).unwrap();
            }
            Script::Fail(reason) => {
                tx.send(RawStatus::failed(reason, None)).unwrap();
            }
            Script::SucceedWithoutFile => {
                tx.send(RawStatus::successful(0)).unwrap();
            }
            Script::Hang => {
                tx.send(RawStatus::running(1, Some(10))).unwrap();
                self.hanging.lock().unwrap().push(tx);
            }
        }

        Ok(rx)
    }

    async fn cancel(&self, _id: &TransferId) -> Result<()> {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Authority that prompts and records the request codes it was asked for
#[derive(Default)]
pub struct PromptingAuthority {
    pub requests: Mutex<Vec<i32>>,
}

impl PromptingAuthority {
    pub async fn wait_for_prompt(&self) -> i32 {
        for _ in 0..500 {
            if let Some(code) = self.requests.lock().unwrap().last() {
                return *code;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("permission was never requested");
    }
}

impl PermissionAuthority for PromptingAuthority {
    fn already_granted(&self) -> bool {
        false
    }

    fn request_write_permission(&self, request_code: i32) -> Result<()> {
        self.requests.lock().unwrap().push(request_code);
        Ok(())
    }
}

/// Viewer that accepts a fixed set of MIME types and records launches
#[derive(Default)]
pub struct RecordingViewer {
    pub accepts: Vec<&'static str>,
    pub launched: Mutex<Vec<(String, Option<String>)>>,
}

impl ExternalViewer for RecordingViewer {
    fn shareable_uri(&self, path: &Path) -> Result<String> {
        Ok(format!(
            "content://com.example.image_downloader.provider/root{}",
            path.display()
        ))
    }

    fn has_handler(&self, _uri: &str, mime_type: Option<&str>) -> bool {
        mime_type.map_or(false, |m| self.accepts.iter().any(|a| *a == m))
    }

    fn launch(&self, uri: &str, mime_type: Option<&str>) -> Result<()> {
        self.launched
            .lock()
            .unwrap()
            .push((uri.to_string(), mime_type.map(str::to_string)));
        Ok(())
    }
}

/// Catalog whose query channel can never be opened
pub struct UnreachableCatalog;

#[async_trait]
impl MediaCatalog for UnreachableCatalog {
    async fn insert(&self, _: MediaCollection, _: CatalogValues) -> Result<Option<String>> {
        Ok(None)
    }

    async fn query_by_id(&self, _: MediaCollection, _: &str) -> Result<Option<Vec<CatalogRow>>> {
        Ok(None)
    }

    async fn query_by_path(
        &self,
        _: MediaCollection,
        _: &str,
    ) -> Result<Option<Vec<CatalogRow>>> {
        Ok(None)
    }
}

/// Attached downloader plus the pieces tests inspect
pub struct Harness {
    pub downloader: Arc<ImageDownloader>,
    pub engine: Arc<ScriptedEngine>,
    pub viewer: Arc<RecordingViewer>,
    pub config: DownloaderConfig,
    pub temp_dir: TempDir,
}

pub struct HarnessBuilder {
    scripts: Vec<Script>,
    sdk_version: u32,
    authority: Option<Arc<dyn PermissionAuthority>>,
    catalog: Option<Arc<dyn MediaCatalog>>,
    accepts: Vec<&'static str>,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            scripts: Vec::new(),
            sdk_version: 33,
            authority: None,
            catalog: None,
            accepts: vec!["image/png", "image/jpeg"],
        }
    }

    /// Scoped storage, granting authority, local catalog
    pub async fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self::builder().scripts(scripts).attach().await
    }

    /// Number of rows in the private index database
    pub async fn private_row_count(&self) -> i64 {
        PrivateIndex::open(&self.config.database_path)
            .await
            .unwrap()
            .len()
            .await
            .unwrap()
    }
}

impl HarnessBuilder {
    pub fn scripts(mut self, scripts: impl IntoIterator<Item = Script>) -> Self {
        self.scripts.extend(scripts);
        self
    }

    pub fn legacy(mut self) -> Self {
        self.sdk_version = 28;
        self
    }

    pub fn authority(mut self, authority: Arc<dyn PermissionAuthority>) -> Self {
        self.authority = Some(authority);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn MediaCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub async fn attach(self) -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let mut config = DownloaderConfig::for_base_dir(temp_dir.path());
        config.sdk_version = self.sdk_version;

        let engine = ScriptedEngine::new(self.scripts);
        let viewer = Arc::new(RecordingViewer {
            accepts: self.accepts,
            ..Default::default()
        });

        let catalog: Arc<dyn MediaCatalog> = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(
                LocalMediaCatalog::in_memory(config.public_root.clone())
                    .await
                    .unwrap(),
            ),
        };

        let authority = self.authority.unwrap_or_else(|| {
            Arc::new(image_downloader_core::permission::StaticAuthority::granting())
        });

        let mut context = HostContext::new(
            config.clone(),
            engine.clone(),
            catalog,
            authority,
            viewer.clone(),
        );
        if self.sdk_version >= 30 {
            context = context.with_capabilities(Arc::new(ScopedStorage::new(self.sdk_version)));
        } else {
            context = context.with_capabilities(Arc::new(LegacyStorage::new(self.sdk_version)));
        }

        let downloader = Arc::new(ImageDownloader::new());
        downloader.attach(context).await.unwrap();

        Harness {
            downloader,
            engine,
            viewer,
            config,
            temp_dir,
        }
    }
}

/// Progress sink plus the channel it feeds
pub fn progress_sink() -> (
    image_downloader_core::download::EventCallback<ProgressUpdate>,
    mpsc::UnboundedReceiver<ProgressUpdate>,
) {
    channel_callback()
}

pub fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}
