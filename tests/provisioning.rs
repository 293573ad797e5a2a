use std::{
    io::Write,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use httpmock::prelude::*;
use mdpdf::application::provision::{
    BrowserFetcher, Platform, ProvisioningError, ProvisioningState, Provisioner,
};
use mdpdf::domain::RenderConfig;
use mdpdf::infra::download::{
    ArchiveDownloader, DownloadError, DownloadProgress, HttpDownloader, TransportConfig,
};
use reqwest::Url;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

fn chromium_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o755);
    writer
        .start_file("chrome-linux/chrome", options)
        .expect("start executable");
    writer.write_all(b"#!/bin/sh\nexit 0\n").expect("write executable");
    writer
        .start_file("chrome-linux/resources.pak", options)
        .expect("start resource");
    writer.write_all(b"pak").expect("write resource");
    writer.finish().expect("finish zip").into_inner()
}

#[derive(Default)]
struct CountingDownloader {
    calls: AtomicUsize,
    urls: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl ArchiveDownloader for CountingDownloader {
    async fn fetch(
        &self,
        url: &Url,
        _transport: &TransportConfig,
        destination: &Path,
        progress: &mut (dyn FnMut(DownloadProgress) + Send),
    ) -> Result<u64, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls
            .lock()
            .expect("urls lock")
            .push(url.to_string());
        let bytes = chromium_zip();
        std::fs::write(destination, &bytes).map_err(|source| DownloadError::Write {
            path: destination.to_path_buf(),
            source,
        })?;
        progress(DownloadProgress {
            received: bytes.len() as u64,
            total: Some(bytes.len() as u64),
        });
        Ok(bytes.len() as u64)
    }
}

fn linux_provisioner(
    root: &Path,
    revision: &str,
    downloader: Arc<dyn ArchiveDownloader>,
) -> Provisioner {
    let fetcher = BrowserFetcher::new(root.to_path_buf(), Platform::Linux, "https://snapshots.test");
    Provisioner::new(fetcher, revision, downloader)
}

#[tokio::test]
async fn existing_executable_short_circuits_provisioning() {
    let dir = TempDir::new().expect("temp dir");
    let executable = dir.path().join("chromium");
    std::fs::write(&executable, b"").expect("write executable");

    let downloader = Arc::new(CountingDownloader::default());
    let mut provisioner = linux_provisioner(&dir.path().join("browsers"), "R2", downloader.clone());
    let config = RenderConfig {
        executable_path: Some(executable.clone()),
        ..RenderConfig::default()
    };

    assert!(provisioner.is_satisfied(&config));
    let report = provisioner.provision(&config).await;

    assert!(report.is_satisfied());
    assert_eq!(report.executable.as_deref(), Some(executable.as_path()));
    assert!(report.installed.is_none());
    assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("browsers").exists());
}

#[tokio::test]
async fn missing_configured_executable_falls_back_to_download() {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path().join("browsers");
    let downloader = Arc::new(CountingDownloader::default());
    let mut provisioner = linux_provisioner(&root, "R2", downloader.clone());
    let config = RenderConfig {
        executable_path: Some(dir.path().join("not-there")),
        ..RenderConfig::default()
    };

    assert!(!provisioner.is_satisfied(&config));
    let report = provisioner.provision(&config).await;

    assert!(report.is_satisfied(), "{:?}", report.error);
    assert_eq!(
        report.executable,
        Some(root.join("linux-R2/chrome-linux/chrome"))
    );
    assert_eq!(
        downloader.urls.lock().expect("urls lock").as_slice(),
        ["https://snapshots.test/chromium-browser-snapshots/Linux_x64/R2/chrome-linux.zip"]
    );
}

#[tokio::test]
async fn upgrade_leaves_only_the_pinned_revision_on_disk() {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path().join("browsers");
    let downloader = Arc::new(CountingDownloader::default());

    let mut first = linux_provisioner(&root, "R1", downloader.clone());
    assert!(first.provision(&RenderConfig::default()).await.is_satisfied());
    assert!(root.join("linux-R1/chrome-linux/chrome").is_file());

    let mut second = linux_provisioner(&root, "R2", downloader.clone());
    let report = second.provision(&RenderConfig::default()).await;

    assert_eq!(report.state, ProvisioningState::Satisfied);
    assert_eq!(
        report.installed.as_ref().map(|installed| installed.revision.as_str()),
        Some("R2")
    );
    assert_eq!(report.removals.len(), 1);
    assert!(report.removals[0].succeeded());
    assert!(!root.join("linux-R1").exists());
    assert!(root.join("linux-R2/chrome-linux/resources.pak").is_file());

    let entries: Vec<String> = std::fs::read_dir(&root)
        .expect("read root")
        .map(|entry| {
            entry
                .expect("entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    assert_eq!(entries, ["linux-R2"]);
    assert_eq!(downloader.calls.load(Ordering::SeqCst), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn installed_executable_keeps_its_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().expect("temp dir");
    let root = dir.path().join("browsers");
    let mut provisioner = linux_provisioner(&root, "R2", Arc::new(CountingDownloader::default()));

    let report = provisioner.provision(&RenderConfig::default()).await;
    let executable = report.executable.expect("executable");
    let mode = std::fs::metadata(&executable)
        .expect("metadata")
        .permissions()
        .mode();
    assert_eq!(mode & 0o111, 0o111);
}

#[tokio::test]
async fn http_download_installs_revision_end_to_end() {
    let server = MockServer::start_async().await;
    let archive = chromium_zip();
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/chromium-browser-snapshots/Linux_x64/R9/chrome-linux.zip");
            then.status(200)
                .header("content-type", "application/zip")
                .body(archive.clone());
        })
        .await;

    let dir = TempDir::new().expect("temp dir");
    let root = dir.path().join("browsers");
    let fetcher = BrowserFetcher::new(root.clone(), Platform::Linux, server.base_url());
    let mut provisioner = Provisioner::new(fetcher, "R9", Arc::new(HttpDownloader));

    let report = provisioner.provision(&RenderConfig::default()).await;

    mock.assert_async().await;
    assert!(report.is_satisfied(), "{:?}", report.error);
    assert!(root.join("linux-R9/chrome-linux/chrome").is_file());
    // Temporary archive and staging directory are gone.
    let leftovers = std::fs::read_dir(&root)
        .expect("read root")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with('.'))
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn http_error_marks_provisioning_failed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(404);
        })
        .await;

    let dir = TempDir::new().expect("temp dir");
    let root = dir.path().join("browsers");
    let fetcher = BrowserFetcher::new(root.clone(), Platform::Linux, server.base_url());
    let mut provisioner = Provisioner::new(fetcher, "R9", Arc::new(HttpDownloader));

    let report = provisioner.provision(&RenderConfig::default()).await;

    assert_eq!(report.state, ProvisioningState::Failed);
    assert_eq!(provisioner.state(), ProvisioningState::Failed);
    assert!(matches!(
        report.error,
        Some(ProvisioningError::Download(DownloadError::Http(_)))
    ));
    assert!(!root.join("linux-R9").exists());
}

#[tokio::test]
async fn archive_without_executable_is_rejected() {
    struct EmptyArchive;

    #[async_trait]
    impl ArchiveDownloader for EmptyArchive {
        async fn fetch(
            &self,
            _url: &Url,
            _transport: &TransportConfig,
            destination: &Path,
            _progress: &mut (dyn FnMut(DownloadProgress) + Send),
        ) -> Result<u64, DownloadError> {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
            writer
                .start_file("README", SimpleFileOptions::default())
                .expect("start file");
            let bytes = writer.finish().expect("finish zip").into_inner();
            std::fs::write(destination, &bytes).expect("write archive");
            Ok(bytes.len() as u64)
        }
    }

    let dir = TempDir::new().expect("temp dir");
    let mut provisioner = linux_provisioner(dir.path(), "R3", Arc::new(EmptyArchive));

    let report = provisioner.provision(&RenderConfig::default()).await;

    assert_eq!(report.state, ProvisioningState::Failed);
    assert!(matches!(
        report.error,
        Some(ProvisioningError::BinaryMissing { .. })
    ));
}
