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


//! JNI bridge for Android - Exposes the downloader to the Kotlin module
//!
//! # Architecture
//! JavaScript / Dart → Kotlin (ImageDownloaderModule) → JNI → Rust
//!
//! The Kotlin module passes itself to `nativeAttach`. Everything the core
//! needs from the platform is called back on that object:
//!
//! | Method | Signature | Used for |
//! |---|---|---|
//! | `hasStoragePermission` | `()Z` | permission gate |
//! | `requestStoragePermission` | `(I)V` | permission gate |
//! | `enqueueDownload` | `(url, headersJson, destination) -> String` | download manager |
//! | `queryDownload` | `(id) -> String?` | download manager snapshot JSON |
//! | `removeDownload` | `(id)V` | download manager |
//! | `catalogInsert` | `(collection, valuesJson) -> String?` | media store |
//! | `catalogQuery` | `(collection, column, value) -> String?` | media store rows JSON |
//! | `shareableUri` | `(path) -> String?` | file provider |
//! | `hasViewer` | `(uri, mime?)Z` | open |
//! | `launchViewer` | `(uri, mime?)V` | open |
//! | `onProgressUpdate` | `(id, progress)V` | progress events |
//!
//! `nativeDownloadImage` blocks until the download finishes, including any
//! permission prompt, so the Kotlin side must call it off the main thread.
//! `onProgressUpdate` is called in order from a single background delivery
//! thread, never the main thread; the host posts it to its main looper
//! before touching UI or emitting events.
//! `nativeOnPermissionResult` is called from the activity result callback.
//!
//! # Response Format
//! All functions except `nativeOnPermissionResult` return JSON strings:
//! ```json
//! { "success": true, "data": ... }
//! ```
//! Or on error:
//! ```json
//! { "success": false, "code": "not_found", "error": "Error message" }
//! ```

use crate::config::DownloaderConfig;
use crate::download::{
    delivery_callback, PolledEngine, PollingBackend, RawState, RawStatus, TransferId, TransferTask,
};
use crate::error::{DownloaderError, Result};
use crate::permission::PermissionAuthority;
use crate::plugin::{HostContext, ImageDownloader, ProgressUpdate};
use crate::request::{DownloadImageArgs, FindArgs, OpenArgs};
use crate::storage::{CatalogRow, CatalogValues, MediaCatalog, MediaCollection};
use crate::viewer::{ExternalViewer, PREVIEW_UNSUPPORTED};
use async_trait::async_trait;
use jni::objects::{GlobalRef, JClass, JObject, JString, JValue, JValueOwned};
use jni::sys::{jboolean, jint, jstring, JNI_FALSE, JNI_TRUE};
use jni::{JNIEnv, JavaVM};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Local references one host call may create
const LOCAL_FRAME_CAPACITY: i32 = 16;

// Android DownloadManager.STATUS_* values
const STATUS_PENDING: i32 = 1;
const STATUS_RUNNING: i32 = 2;
const STATUS_PAUSED: i32 = 4;
const STATUS_SUCCESSFUL: i32 = 8;
const STATUS_FAILED: i32 = 16;

lazy_static::lazy_static! {
    static ref RUNTIME: std::io::Result<tokio::runtime::Runtime> =
        tokio::runtime::Runtime::new();

    static ref DOWNLOADER: ImageDownloader = ImageDownloader::new();

    // Host bound by the last nativeAttach, used for progress delivery
    static ref HOST: RwLock<Option<Arc<JniHost>>> = RwLock::new(None);
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Run a future to completion on the bridge runtime
fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = RUNTIME.as_ref().map_err(|e| {
        DownloaderError::InvalidState(format!("Tokio runtime unavailable: {}", e))
    })?;
    Ok(runtime.block_on(future))
}

/// Convert JString to Rust String
fn jstring_to_string(env: &mut JNIEnv, jstr: JString) -> Result<String> {
    env.get_string(&jstr)
        .map(|s| s.into())
        .map_err(|e| DownloaderError::InvalidInput(format!("JNI string conversion failed: {}", e)))
}

/// Hand a response back to Java; null if the string cannot be created
fn to_jstring(env: &mut JNIEnv, response: String) -> jstring {
    match env.new_string(response) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            log::error!("Failed to create Java string: {}", e);
            std::ptr::null_mut()
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: &str) -> Result<T> {
    serde_json::from_str(params)
        .map_err(|e| DownloaderError::InvalidInput(format!("Invalid JSON: {}", e)))
}

/// Convert Rust result to JSON response string
fn result_to_json<T: Serialize>(result: Result<T>) -> String {
    match result {
        Ok(data) => success_response(data),
        Err(e) => error_response(&e),
    }
}

/// Create success response JSON
fn success_response<T: Serialize>(data: T) -> String {
    serde_json::json!({
        "success": true,
        "data": data
    })
    .to_string()
}

/// Create error response JSON
fn error_response(error: &DownloaderError) -> String {
    serde_json::json!({
        "success": false,
        "code": error.code(),
        "error": error.to_string()
    })
    .to_string()
}

/// Wrap a function call with panic catching
fn catch_panic<F>(f: F) -> String
where
    F: FnOnce() -> String,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic_err) => {
            let panic_msg = if let Some(s) = panic_err.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = panic_err.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "Unknown panic occurred".to_string()
            };
            serde_json::json!({
                "success": false,
                "code": "panic",
                "error": format!("Rust panic: {}", panic_msg)
            })
            .to_string()
        }
    }
}

/// Call a host method, clearing any Java exception it raised
fn call_host<'local>(
    env: &mut JNIEnv<'local>,
    host: &JObject,
    name: &str,
    sig: &str,
    args: &[JValue],
) -> Result<JValueOwned<'local>> {
    env.call_method(host, name, sig, args).map_err(|e| {
        if env.exception_check().unwrap_or(false) {
            let _ = env.exception_describe();
            let _ = env.exception_clear();
        }
        log::warn!("Host call {} failed: {}", name, e);
        DownloaderError::from(e)
    })
}

/// Read a nullable java.lang.String result
fn optional_string(env: &mut JNIEnv, value: JObject) -> Result<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    let value = JString::from(value);
    Ok(Some(env.get_string(&value)?.into()))
}

// ============================================================================
// HOST ADAPTER
// ============================================================================

/// The Kotlin module, seen through the core's collaborator traits
struct JniHost {
    vm: JavaVM,
    host: GlobalRef,
}

impl JniHost {
    fn bind(env: &JNIEnv, host: &JObject) -> Result<Self> {
        Ok(Self {
            vm: env.get_java_vm()?,
            host: env.new_global_ref(host)?,
        })
    }

    /// Run `f` with an attached env inside its own local frame
    fn with_env<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut JNIEnv, &JObject) -> Result<T>,
    {
        let mut env = self.vm.attach_current_thread_permanently()?;
        let host = self.host.as_obj();
        env.with_local_frame(LOCAL_FRAME_CAPACITY, |env| f(env, host))
    }

    fn call_string(&self, name: &str, sig: &str, args: &[&str]) -> Result<Option<String>> {
        self.with_env(|env, host| {
            let strings = args
                .iter()
                .map(|arg| env.new_string(arg))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let values: Vec<JValue> = strings.iter().map(|s| JValue::Object(s)).collect();

            let result = call_host(env, host, name, sig, &values)?.l()?;
            optional_string(env, result)
        })
    }

    fn on_progress_update(&self, update: &ProgressUpdate) {
        let result = self.with_env(|env, host| {
            let id = env.new_string(&update.id)?;
            call_host(
                env,
                host,
                "onProgressUpdate",
                "(Ljava/lang/String;I)V",
                &[JValue::Object(&id), JValue::Int(jint::from(update.progress))],
            )?
            .v()?;
            Ok(())
        });

        if let Err(e) = result {
            log::warn!("Dropped progress update for {}: {}", update.id, e);
        }
    }
}

impl PermissionAuthority for JniHost {
    fn already_granted(&self) -> bool {
        self.with_env(|env, host| {
            Ok(call_host(env, host, "hasStoragePermission", "()Z", &[])?.z()?)
        })
        .unwrap_or_else(|e| {
            log::warn!("Permission check failed, assuming not granted: {}", e);
            false
        })
    }

    fn request_write_permission(&self, request_code: i32) -> Result<()> {
        self.with_env(|env, host| {
            call_host(
                env,
                host,
                "requestStoragePermission",
                "(I)V",
                &[JValue::Int(request_code)],
            )?
            .v()?;
            Ok(())
        })
    }
}

fn collection_name(collection: MediaCollection) -> &'static str {
    match collection {
        MediaCollection::Images => "images",
        MediaCollection::Videos => "video",
    }
}

impl JniHost {
    fn catalog_query(
        &self,
        collection: MediaCollection,
        column: &str,
        value: &str,
    ) -> Result<Option<Vec<CatalogRow>>> {
        let rows = self.call_string(
            "catalogQuery",
            "(Ljava/lang/String;Ljava/lang/String;Ljava/lang/String;)Ljava/lang/String;",
            &[collection_name(collection), column, value],
        )?;

        match rows {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MediaCatalog for JniHost {
    async fn insert(
        &self,
        collection: MediaCollection,
        values: CatalogValues,
    ) -> Result<Option<String>> {
        let values = serde_json::to_string(&values)?;
        self.call_string(
            "catalogInsert",
            "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/String;",
            &[collection_name(collection), &values],
        )
    }

    async fn query_by_id(
        &self,
        collection: MediaCollection,
        id: &str,
    ) -> Result<Option<Vec<CatalogRow>>> {
        self.catalog_query(collection, "_id", id)
    }

    async fn query_by_path(
        &self,
        collection: MediaCollection,
        path: &str,
    ) -> Result<Option<Vec<CatalogRow>>> {
        self.catalog_query(collection, "_data", path)
    }
}

impl ExternalViewer for JniHost {
    fn shareable_uri(&self, path: &Path) -> Result<String> {
        let path = path.to_string_lossy();
        self.call_string(
            "shareableUri",
            "(Ljava/lang/String;)Ljava/lang/String;",
            &[&path],
        )?
        .ok_or_else(|| DownloaderError::PreviewError(PREVIEW_UNSUPPORTED.to_string()))
    }

    fn has_handler(&self, uri: &str, mime_type: Option<&str>) -> bool {
        self.with_env(|env, host| {
            let uri = env.new_string(uri)?;
            let mime = match mime_type {
                Some(mime) => JObject::from(env.new_string(mime)?),
                None => JObject::null(),
            };
            Ok(call_host(
                env,
                host,
                "hasViewer",
                "(Ljava/lang/String;Ljava/lang/String;)Z",
                &[JValue::Object(&uri), JValue::Object(&mime)],
            )?
            .z()?)
        })
        .unwrap_or(false)
    }

    fn launch(&self, uri: &str, mime_type: Option<&str>) -> Result<()> {
        self.with_env(|env, host| {
            let uri = env.new_string(uri)?;
            let mime = match mime_type {
                Some(mime) => JObject::from(env.new_string(mime)?),
                None => JObject::null(),
            };
            call_host(
                env,
                host,
                "launchViewer",
                "(Ljava/lang/String;Ljava/lang/String;)V",
                &[JValue::Object(&uri), JValue::Object(&mime)],
            )?
            .v()?;
            Ok(())
        })
    }
}

/// Row of the platform download manager as reported by `queryDownload`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadSnapshot {
    status: i32,
    #[serde(default)]
    bytes_so_far: i64,
    /// -1 while unknown
    #[serde(default = "unknown_total")]
    total_bytes: i64,
    reason: Option<i32>,
}

fn unknown_total() -> i64 {
    -1
}

impl DownloadSnapshot {
    fn into_raw_status(self) -> RawStatus {
        let state = match self.status {
            STATUS_PENDING => RawState::Pending,
            STATUS_RUNNING => RawState::Running,
            STATUS_PAUSED => RawState::Paused,
            STATUS_SUCCESSFUL => RawState::Successful,
            STATUS_FAILED => RawState::Failed,
            other => {
                log::debug!("Unknown download status {}, treating as pending", other);
                RawState::Pending
            }
        };

        let reason = match state {
            RawState::Paused | RawState::Failed => self.reason,
            _ => None,
        };

        RawStatus {
            state,
            bytes_so_far: self.bytes_so_far.max(0) as u64,
            total_bytes: (self.total_bytes > 0).then_some(self.total_bytes as u64),
            reason,
            message: None,
        }
    }
}

#[async_trait]
impl PollingBackend for JniHost {
    async fn enqueue(&self, task: TransferTask) -> Result<TransferId> {
        let headers = serde_json::to_string(&task.headers)?;
        let destination = task.destination.to_string_lossy();

        let id = self
            .call_string(
                "enqueueDownload",
                "(Ljava/lang/String;Ljava/lang/String;Ljava/lang/String;)Ljava/lang/String;",
                &[task.url.as_str(), &headers, &destination],
            )?
            .ok_or_else(|| {
                DownloaderError::transfer_failed("download manager refused the request", None)
            })?;

        Ok(TransferId::new(id))
    }

    async fn query(&self, id: &TransferId) -> Result<Option<RawStatus>> {
        let snapshot = self.call_string(
            "queryDownload",
            "(Ljava/lang/String;)Ljava/lang/String;",
            &[id.as_str()],
        )?;

        match snapshot {
            Some(json) => {
                let snapshot: DownloadSnapshot = serde_json::from_str(&json)?;
                Ok(Some(snapshot.into_raw_status()))
            }
            None => Ok(None),
        }
    }

    async fn cancel(&self, id: &TransferId) -> Result<()> {
        self.with_env(|env, host| {
            let id = env.new_string(id.as_str())?;
            call_host(
                env,
                host,
                "removeDownload",
                "(Ljava/lang/String;)V",
                &[JValue::Object(&id)],
            )?
            .v()?;
            Ok(())
        })
    }
}

fn current_host() -> Option<Arc<JniHost>> {
    HOST.read().unwrap_or_else(|p| p.into_inner()).clone()
}

// ============================================================================
// LIFECYCLE FUNCTIONS
// ============================================================================

/// Bind the downloader to the Kotlin module
///
/// # Arguments
/// - `host`: the module object implementing the callbacks above
/// - `config_json`: [`DownloaderConfig`] as JSON
///
/// # Returns (JSON)
/// ```json
/// { "success": true, "data": { "fileProviderAuthority": "com.example.image_downloader.provider" } }
/// ```
#[no_mangle]
pub extern "C" fn Java_expo_modules_imagedownloader_ImageDownloaderModule_nativeAttach(
    mut env: JNIEnv,
    _class: JClass,
    host: JObject,
    config_json: JString,
) -> jstring {
    let config_str = jstring_to_string(&mut env, config_json);
    let bound = JniHost::bind(&env, &host);

    let response = catch_panic(move || {
        result_to_json((move || -> Result<serde_json::Value> {
            let config = DownloaderConfig::from_json(&config_str?)?;
            let host = Arc::new(bound?);

            let engine = PolledEngine::new(Arc::clone(&host), config.poll_interval());
            let authority = config.file_provider_authority();

            let context = HostContext::new(
                config,
                Arc::new(engine),
                host.clone(),
                host.clone(),
                host.clone(),
            );
            block_on(DOWNLOADER.attach(context))??;

            *HOST.write().unwrap_or_else(|p| p.into_inner()) = Some(host);

            Ok(serde_json::json!({ "fileProviderAuthority": authority }))
        })())
    });

    to_jstring(&mut env, response)
}

/// Release the Kotlin module; safe to call repeatedly
#[no_mangle]
pub extern "C" fn Java_expo_modules_imagedownloader_ImageDownloaderModule_nativeDetach(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let response = catch_panic(|| {
        DOWNLOADER.detach();
        HOST.write().unwrap_or_else(|p| p.into_inner()).take();
        success_response(serde_json::Value::Null)
    });

    to_jstring(&mut env, response)
}

/// Deliver an activity permission result
///
/// Returns whether the result belonged to this plugin.
#[no_mangle]
pub extern "C" fn Java_expo_modules_imagedownloader_ImageDownloaderModule_nativeOnPermissionResult(
    _env: JNIEnv,
    _class: JClass,
    request_code: jint,
    granted: jboolean,
) -> jboolean {
    let handled = panic::catch_unwind(|| DOWNLOADER.on_permission_result(request_code, granted != 0))
        .unwrap_or(false);

    if handled {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

// ============================================================================
// DOWNLOAD FUNCTIONS
// ============================================================================

/// Download one file
///
/// # Arguments (JSON string)
/// ```json
/// {
///   "url": "https://example.com/cat.png",
///   "headers": { "Authorization": "Bearer ..." },
///   "mimeType": null,
///   "inPublicDir": true,
///   "directory": "DIRECTORY_PICTURES",
///   "subDirectory": null
/// }
/// ```
///
/// # Returns (JSON)
/// The new id, or `null` when the storage permission was denied.
/// ```json
/// { "success": true, "data": "1042" }
/// ```
#[no_mangle]
pub extern "C" fn Java_expo_modules_imagedownloader_ImageDownloaderModule_nativeDownloadImage(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    let params_str = jstring_to_string(&mut env, params_json);

    let response = catch_panic(move || {
        result_to_json((move || -> Result<Option<String>> {
            let args: DownloadImageArgs = parse_params(&params_str?)?;

            let host = current_host();

            block_on(async move {
                // Updates reach the host in order on one delivery thread
                let (progress, _delivery) = delivery_callback(move |update: ProgressUpdate| {
                    if let Some(host) = &host {
                        host.on_progress_update(&update);
                    }
                });
                DOWNLOADER.download_image(args, progress).await
            })?
        })())
    });

    to_jstring(&mut env, response)
}

/// Cancel the running download
///
/// # Returns (JSON)
/// ```json
/// { "success": true, "data": { "cancelled": true } }
/// ```
#[no_mangle]
pub extern "C" fn Java_expo_modules_imagedownloader_ImageDownloaderModule_nativeCancel(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let response = catch_panic(|| {
        result_to_json((|| -> Result<serde_json::Value> {
            let cancelled = block_on(DOWNLOADER.cancel())??;
            Ok(serde_json::json!({ "cancelled": cancelled }))
        })())
    });

    to_jstring(&mut env, response)
}

/// Open a file in an external viewer
///
/// # Arguments (JSON string)
/// ```json
/// { "path": "/storage/emulated/0/Download/cat.png" }
/// ```
#[no_mangle]
pub extern "C" fn Java_expo_modules_imagedownloader_ImageDownloaderModule_nativeOpen(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    let params_str = jstring_to_string(&mut env, params_json);

    let response = catch_panic(move || {
        result_to_json((move || -> Result<serde_json::Value> {
            let args: OpenArgs = parse_params(&params_str?)?;
            DOWNLOADER.open(args)?;
            Ok(serde_json::Value::Null)
        })())
    });

    to_jstring(&mut env, response)
}

// ============================================================================
// QUERY FUNCTIONS
// ============================================================================
//
// All take the same arguments:
// ```json
// { "id": "1042", "isVideo": false, "inPublicDir": null }
// ```
// and return the field, or `null` when the id is unknown.

#[no_mangle]
pub extern "C" fn Java_expo_modules_imagedownloader_ImageDownloaderModule_nativeFindPath(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    let params_str = jstring_to_string(&mut env, params_json);

    let response = catch_panic(move || {
        result_to_json((move || -> Result<Option<String>> {
            let args: FindArgs = parse_params(&params_str?)?;
            block_on(DOWNLOADER.find_path(args))?
        })())
    });

    to_jstring(&mut env, response)
}

#[no_mangle]
pub extern "C" fn Java_expo_modules_imagedownloader_ImageDownloaderModule_nativeFindName(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    let params_str = jstring_to_string(&mut env, params_json);

    let response = catch_panic(move || {
        result_to_json((move || -> Result<Option<String>> {
            let args: FindArgs = parse_params(&params_str?)?;
            block_on(DOWNLOADER.find_name(args))?
        })())
    });

    to_jstring(&mut env, response)
}

#[no_mangle]
pub extern "C" fn Java_expo_modules_imagedownloader_ImageDownloaderModule_nativeFindByteSize(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    let params_str = jstring_to_string(&mut env, params_json);

    let response = catch_panic(move || {
        result_to_json((move || -> Result<Option<i64>> {
            let args: FindArgs = parse_params(&params_str?)?;
            block_on(DOWNLOADER.find_byte_size(args))?
        })())
    });

    to_jstring(&mut env, response)
}

#[no_mangle]
pub extern "C" fn Java_expo_modules_imagedownloader_ImageDownloaderModule_nativeFindMimeType(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    let params_str = jstring_to_string(&mut env, params_json);

    let response = catch_panic(move || {
        result_to_json((move || -> Result<Option<String>> {
            let args: FindArgs = parse_params(&params_str?)?;
            block_on(DOWNLOADER.find_mime_type(args))?
        })())
    });

    to_jstring(&mut env, response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_carries_code() {
        let json: serde_json::Value =
            serde_json::from_str(&error_response(&DownloaderError::required("url"))).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "precondition");
        assert_eq!(json["error"], "url is required.");
    }

    #[test]
    fn test_snapshot_mapping() {
        let snapshot: DownloadSnapshot =
            serde_json::from_str(r#"{"status":2,"bytesSoFar":50,"totalBytes":200}"#).unwrap();
        let status = snapshot.into_raw_status();
        assert_eq!(status.state, RawState::Running);
        assert_eq!(status.progress_percent(), Some(25));

        let snapshot: DownloadSnapshot =
            serde_json::from_str(r#"{"status":16,"reason":1006}"#).unwrap();
        let status = snapshot.into_raw_status();
        assert_eq!(status.state, RawState::Failed);
        assert_eq!(status.reason, Some(1006));
        assert_eq!(status.total_bytes, None);
    }
}
