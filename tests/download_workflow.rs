//! End-to-end download workflow through the plugin handle
//!
//! Runs against a scripted engine, a local media catalog and a temporary
//! directory; no network access.

mod common;

use common::{drain, progress_sink, Harness, PromptingAuthority, Script, UnreachableCatalog, JPEG, PNG};
use image_downloader_core::permission::STORAGE_PERMISSION_REQUEST_CODE;
use image_downloader_core::storage::private_index::PRIVATE_ID_LENGTH;
use image_downloader_core::{DownloadImageArgs, DownloaderError, FindArgs, OpenArgs, Visibility};
use std::path::Path;
use std::sync::Arc;

fn private_args(url: &str) -> DownloadImageArgs {
    DownloadImageArgs {
        in_public_dir: Some(false),
        ..DownloadImageArgs::for_url(url)
    }
}

fn find(id: &str) -> FindArgs {
    FindArgs {
        id: Some(id.to_string()),
        ..Default::default()
    }
}

fn find_image(id: &str) -> FindArgs {
    FindArgs {
        is_video: Some(false),
        ..find(id)
    }
}

#[tokio::test]
async fn test_private_download_is_indexed() {
    let harness = Harness::new([Script::Succeed(PNG.to_vec())]).await;
    let (progress, mut updates) = progress_sink();

    let id = harness
        .downloader
        .download_image(private_args("https://cdn.example.com/cat"), progress)
        .await
        .unwrap()
        .expect("permission is implicit for private downloads");

    assert_eq!(id.len(), PRIVATE_ID_LENGTH);
    assert_eq!(harness.downloader.last_visibility(), Visibility::Private);

    // The find* calls inherit the private visibility of the download
    let path = harness.downloader.find_path(find(&id)).await.unwrap().unwrap();
    let name = harness.downloader.find_name(find(&id)).await.unwrap().unwrap();
    let size = harness.downloader.find_byte_size(find(&id)).await.unwrap();
    let mime = harness.downloader.find_mime_type(find(&id)).await.unwrap();

    assert!(name.ends_with(".png"));
    assert_eq!(
        Path::new(&path),
        harness.config.private_root.join("Download").join(&name)
    );
    assert!(Path::new(&path).exists());
    assert_eq!(size, Some(PNG.len() as i64));
    assert_eq!(mime.as_deref(), Some("image/png"));

    let progress: Vec<u8> = drain(&mut updates).into_iter().map(|u| u.progress).collect();
    assert_eq!(progress, vec![50, 100]);
}

#[tokio::test]
async fn test_private_index_keeps_only_latest() {
    let harness = Harness::new([Script::Succeed(PNG.to_vec()), Script::Succeed(JPEG.to_vec())]).await;

    let (progress, _updates) = progress_sink();
    let first = harness
        .downloader
        .download_image(private_args("https://cdn.example.com/a"), progress.clone())
        .await
        .unwrap()
        .unwrap();
    let second = harness
        .downloader
        .download_image(private_args("https://cdn.example.com/b"), progress)
        .await
        .unwrap()
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(harness.downloader.find_path(find(&first)).await.unwrap(), None);
    assert_eq!(
        harness.downloader.find_mime_type(find(&second)).await.unwrap().as_deref(),
        Some("image/jpeg")
    );
}

#[tokio::test]
async fn test_public_download_goes_to_catalog() {
    let harness = Harness::new([Script::Succeed(JPEG.to_vec())]).await;
    let (progress, mut updates) = progress_sink();

    let args = DownloadImageArgs {
        directory: Some("DIRECTORY_PICTURES".to_string()),
        ..DownloadImageArgs::for_url("https://cdn.example.com/photos/42")
    };
    let id = harness
        .downloader
        .download_image(args, progress)
        .await
        .unwrap()
        .unwrap();

    assert!(id.parse::<i64>().is_ok(), "catalog ids are numeric: {}", id);

    let name = harness.downloader.find_name(find_image(&id)).await.unwrap().unwrap();
    let path = harness.downloader.find_path(find_image(&id)).await.unwrap().unwrap();
    assert!(name.ends_with(".jpg"), "unexpected name {}", name);
    assert_eq!(
        Path::new(&path),
        harness.config.public_root.join("Pictures").join(&name)
    );

    // Repeated lookups are stable
    assert_eq!(
        harness.downloader.find_name(find_image(&id)).await.unwrap().as_deref(),
        Some(name.as_str())
    );

    // Images are not visible in the video collection
    assert_eq!(harness.downloader.find_path(find(&id)).await.unwrap(), None);

    assert!(drain(&mut updates).iter().all(|u| u.id == "t1"));
}

#[tokio::test]
async fn test_explicit_name_is_kept() {
    let harness = Harness::new([Script::Succeed(PNG.to_vec())]).await;
    let (progress, _updates) = progress_sink();

    let args = DownloadImageArgs {
        sub_directory: Some("cover.webp".to_string()),
        ..private_args("https://cdn.example.com/cover")
    };
    let id = harness.downloader.download_image(args, progress).await.unwrap().unwrap();

    assert_eq!(
        harness.downloader.find_name(find(&id)).await.unwrap().as_deref(),
        Some("cover.webp")
    );
    // The sniffed type still wins over the extension
    assert_eq!(
        harness.downloader.find_mime_type(find(&id)).await.unwrap().as_deref(),
        Some("image/png")
    );
}

#[tokio::test]
async fn test_nested_name_lands_in_sub_directory() {
    let harness = Harness::new([Script::Succeed(PNG.to_vec())]).await;
    let (progress, _updates) = progress_sink();

    let args = DownloadImageArgs {
        directory: Some("DIRECTORY_PICTURES".to_string()),
        sub_directory: Some("album/cat.png".to_string()),
        ..DownloadImageArgs::for_url("https://cdn.example.com/cat")
    };
    let id = harness.downloader.download_image(args, progress).await.unwrap().unwrap();

    let path = harness.downloader.find_path(find_image(&id)).await.unwrap().unwrap();
    assert_eq!(
        Path::new(&path),
        harness.config.public_root.join("Pictures/album/cat.png")
    );
    assert!(Path::new(&path).exists());
    assert_eq!(
        harness.downloader.find_name(find_image(&id)).await.unwrap().as_deref(),
        Some("cat.png")
    );
}

#[tokio::test]
async fn test_failed_transfer_reports_reason() {
    let harness = Harness::new([Script::Fail(1006)]).await;
    let (progress, _updates) = progress_sink();

    let err = harness
        .downloader
        .download_image(private_args("https://cdn.example.com/big"), progress)
        .await
        .unwrap_err();

    match err {
        DownloaderError::TransferFailed { reason, code } => {
            assert_eq!(reason, "Insufficient space");
            assert_eq!(code, Some(1006));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_artifact_is_save_error() {
    let harness = Harness::new([Script::SucceedWithoutFile]).await;
    let (progress, _updates) = progress_sink();

    let err = harness
        .downloader
        .download_image(private_args("https://cdn.example.com/ghost"), progress)
        .await
        .unwrap_err();

    assert!(matches!(err, DownloaderError::SaveError(_)));
    assert_eq!(err.code(), "save_error");
}

#[tokio::test]
async fn test_denied_permission_resolves_empty() {
    let authority = Arc::new(PromptingAuthority::default());
    let harness = Harness::builder()
        .legacy()
        .authority(authority.clone())
        .attach()
        .await;

    let downloader = harness.downloader.clone();
    let download = tokio::spawn(async move {
        let (progress, _updates) = progress_sink();
        downloader
            .download_image(DownloadImageArgs::for_url("https://cdn.example.com/a"), progress)
            .await
    });

    let code = authority.wait_for_prompt().await;
    assert_eq!(code, STORAGE_PERMISSION_REQUEST_CODE);

    // Results for other request codes are not ours
    assert!(!harness.downloader.on_permission_result(code + 1, true));
    assert!(harness.downloader.on_permission_result(code, false));

    assert_eq!(download.await.unwrap().unwrap(), None);
    assert!(harness.engine.tasks().is_empty());
}

#[tokio::test]
async fn test_granted_permission_continues_download() {
    let authority = Arc::new(PromptingAuthority::default());
    let harness = Harness::builder()
        .legacy()
        .authority(authority.clone())
        .scripts([Script::Succeed(PNG.to_vec())])
        .attach()
        .await;

    let downloader = harness.downloader.clone();
    let download = tokio::spawn(async move {
        let (progress, _updates) = progress_sink();
        downloader
            .download_image(DownloadImageArgs::for_url("https://cdn.example.com/a"), progress)
            .await
    });

    let code = authority.wait_for_prompt().await;
    assert!(harness.downloader.on_permission_result(code, true));

    let id = download.await.unwrap().unwrap().unwrap();
    let path = harness.downloader.find_path(find_image(&id)).await.unwrap().unwrap();
    assert!(path.starts_with(harness.config.public_root.to_str().unwrap()));
}

#[tokio::test]
async fn test_second_download_is_busy_and_cancel_resolves_first() {
    let harness = Harness::new([Script::Hang]).await;

    let downloader = harness.downloader.clone();
    let first = tokio::spawn(async move {
        let (progress, _updates) = progress_sink();
        downloader
            .download_image(private_args("https://cdn.example.com/slow"), progress)
            .await
    });
    harness.engine.wait_for_tasks(1).await;

    let (progress, _updates) = progress_sink();
    let err = harness
        .downloader
        .download_image(private_args("https://cdn.example.com/other"), progress)
        .await
        .unwrap_err();
    assert!(matches!(err, DownloaderError::Busy));

    assert!(harness.downloader.cancel().await.unwrap());
    assert!(matches!(first.await.unwrap(), Err(DownloaderError::Cancelled)));
    assert_eq!(harness.engine.cancelled(), 1);
    assert_eq!(harness.engine.tasks().len(), 1);

    // Nothing was finalized: no renamed file and no private record
    let download_dir = harness.config.private_root.join("Download");
    let files: Vec<_> = std::fs::read_dir(&download_dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    assert!(files.is_empty(), "unexpected files {:?}", files);
    assert_eq!(harness.private_row_count().await, 0);

    // Nothing left to cancel
    assert!(!harness.downloader.cancel().await.unwrap());
}

#[tokio::test]
async fn test_missing_arguments_are_preconditions() {
    let harness = Harness::new([]).await;
    let (progress, _updates) = progress_sink();

    let err = harness
        .downloader
        .download_image(DownloadImageArgs::default(), progress)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "url is required.");

    let err = harness.downloader.find_path(FindArgs::default()).await.unwrap_err();
    assert_eq!(err.to_string(), "id is required.");
    assert_eq!(err.code(), "precondition");

    let err = harness.downloader.open(OpenArgs::default()).unwrap_err();
    assert_eq!(err.to_string(), "path is required.");
}

#[tokio::test]
async fn test_unreachable_catalog() {
    let harness = Harness::builder()
        .catalog(Arc::new(UnreachableCatalog))
        .scripts([Script::Succeed(PNG.to_vec())])
        .attach()
        .await;

    let err = harness.downloader.find_path(find("17")).await.unwrap_err();
    assert!(matches!(err, DownloaderError::Precondition(_)));
    assert_eq!(err.to_string(), "17 is an id that does not exist.");

    let (progress, _updates) = progress_sink();
    let err = harness
        .downloader
        .download_image(DownloadImageArgs::for_url("https://cdn.example.com/a"), progress)
        .await
        .unwrap_err();
    assert!(matches!(err, DownloaderError::NotFound(_)));
    assert!(err.to_string().ends_with(" is not found."));
}

#[tokio::test]
async fn test_open_in_viewer() {
    let harness = Harness::new([]).await;

    harness
        .downloader
        .open(OpenArgs {
            path: Some("/sdcard/Download/cat.png".to_string()),
        })
        .unwrap();
    let launched = harness.viewer.launched.lock().unwrap().clone();
    assert_eq!(launched.len(), 1);
    assert_eq!(launched[0].1.as_deref(), Some("image/png"));

    let err = harness
        .downloader
        .open(OpenArgs {
            path: Some("/sdcard/Download/notes.bin".to_string()),
        })
        .unwrap_err();
    assert!(matches!(err, DownloaderError::PreviewError(_)));
    assert_eq!(err.to_string(), "This file is not supported for previewing");
}

#[tokio::test]
async fn test_detach_is_idempotent() {
    let harness = Harness::new([]).await;

    harness.downloader.detach();
    harness.downloader.detach();
    assert!(!harness.downloader.is_attached());

    let (progress, _updates) = progress_sink();
    let err = harness
        .downloader
        .download_image(DownloadImageArgs::for_url("https://cdn.example.com/a"), progress)
        .await
        .unwrap_err();
    assert!(matches!(err, DownloaderError::InvalidState(_)));
}
