//! HTTP transport for browser archive downloads.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::{Client, Proxy, Url};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid proxy `{proxy}`: {source}")]
    InvalidProxy {
        proxy: String,
        source: reqwest::Error,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Network settings for one download, passed explicitly instead of through
/// process environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportConfig {
    pub proxy: Option<String>,
}

impl TransportConfig {
    /// Blank proxy strings count as "no proxy".
    pub fn new(proxy: Option<String>) -> Self {
        Self {
            proxy: proxy.filter(|value| !value.trim().is_empty()),
        }
    }

    pub fn build_client(&self) -> Result<Client, DownloadError> {
        let builder = Client::builder().user_agent(user_agent());
        let builder = match self.proxy.as_deref() {
            Some(proxy) => {
                builder.proxy(Proxy::all(proxy).map_err(|source| DownloadError::InvalidProxy {
                    proxy: proxy.to_string(),
                    source,
                })?)
            }
            None => builder.no_proxy(),
        };
        Ok(builder.build()?)
    }
}

pub fn user_agent() -> &'static str {
    concat!("mdpdf/", env!("CARGO_PKG_VERSION"))
}

/// Bytes received so far and the announced size, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub received: u64,
    pub total: Option<u64>,
}

impl DownloadProgress {
    /// Whole percent completed; `None` while the size is unknown.
    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(0) => Some(100),
            Some(total) => Some(((self.received.min(total) * 100) / total) as u8),
            None => None,
        }
    }
}

/// Fetches an archive to a local file, reporting progress per chunk.
#[async_trait]
pub trait ArchiveDownloader: Send + Sync {
    /// Returns the number of bytes written to `destination`.
    async fn fetch(
        &self,
        url: &Url,
        transport: &TransportConfig,
        destination: &Path,
        progress: &mut (dyn FnMut(DownloadProgress) + Send),
    ) -> Result<u64, DownloadError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HttpDownloader;

#[async_trait]
impl ArchiveDownloader for HttpDownloader {
    async fn fetch(
        &self,
        url: &Url,
        transport: &TransportConfig,
        destination: &Path,
        progress: &mut (dyn FnMut(DownloadProgress) + Send),
    ) -> Result<u64, DownloadError> {
        let client = transport.build_client()?;
        let mut response = client.get(url.clone()).send().await?.error_for_status()?;
        let total = response.content_length();

        debug!(
            target = "infra::download",
            url = %url,
            total_bytes = total.unwrap_or(0),
            proxied = transport.proxy.is_some(),
            "Download started"
        );

        let write_error = |source| DownloadError::Write {
            path: destination.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(write_error)?;

        let mut received = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await.map_err(write_error)?;
            received += chunk.len() as u64;
            progress(DownloadProgress { received, total });
        }
        file.flush().await.map_err(write_error)?;

        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn percent_is_clamped_and_unknown_without_total() {
        let half = DownloadProgress {
            received: 50,
            total: Some(100),
        };
        assert_eq!(half.percent(), Some(50));

        let over = DownloadProgress {
            received: 150,
            total: Some(100),
        };
        assert_eq!(over.percent(), Some(100));

        let unknown = DownloadProgress {
            received: 10,
            total: None,
        };
        assert_eq!(unknown.percent(), None);
    }

    #[test]
    fn blank_proxy_means_direct_connection() {
        assert_eq!(TransportConfig::new(Some("  ".into())).proxy, None);
        assert!(TransportConfig::new(None).build_client().is_ok());
    }

    #[test]
    fn malformed_proxy_is_rejected() {
        let err = TransportConfig::new(Some("http://[::1".into()))
            .build_client()
            .expect_err("invalid proxy");
        assert!(matches!(err, DownloadError::InvalidProxy { .. }));
    }

    #[tokio::test]
    async fn streams_body_to_disk_with_progress() {
        let server = MockServer::start_async().await;
        let body = vec![7u8; 64 * 1024];
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/archive.zip");
                then.status(200).body(body.clone());
            })
            .await;

        let dir = TempDir::new().expect("temp dir");
        let destination = dir.path().join("archive.zip");
        let url = Url::parse(&server.url("/archive.zip")).expect("url");

        let mut updates = Vec::new();
        let written = HttpDownloader
            .fetch(
                &url,
                &TransportConfig::default(),
                &destination,
                &mut |update| updates.push(update),
            )
            .await
            .expect("download");

        mock.assert_async().await;
        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&destination).expect("read").len(), body.len());
        let last = updates.last().expect("progress reported");
        assert_eq!(last.percent(), Some(100));
    }

    #[tokio::test]
    async fn http_errors_are_surfaced() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing.zip");
                then.status(404);
            })
            .await;

        let dir = TempDir::new().expect("temp dir");
        let url = Url::parse(&server.url("/missing.zip")).expect("url");
        let result = HttpDownloader
            .fetch(
                &url,
                &TransportConfig::default(),
                &dir.path().join("missing.zip"),
                &mut |_| {},
            )
            .await;

        assert!(matches!(result, Err(DownloadError::Http(_))));
    }
}
