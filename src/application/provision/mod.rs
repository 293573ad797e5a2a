//! Makes sure a headless Chromium is available before browser exports.
//!
//! The provisioner is a small state machine:
//!
//! ```text
//! Unchecked ──(configured or pinned binary present)──▶ Satisfied
//!     │
//!     └──▶ Downloading ──▶ Reconciling ──▶ Satisfied
//!              │                │
//!              └──────┬─────────┘
//!                     ▼
//!                   Failed
//! ```
//!
//! Failures are reported, never raised: callers decide through
//! [`crate::domain::ProvisioningPolicy`] whether a failed provisioning
//! aborts the export.

mod revision;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use futures::future::join_all;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::RenderConfig;
use crate::infra::download::{
    ArchiveDownloader, DownloadError, DownloadProgress, HttpDownloader, TransportConfig,
};

pub use revision::{BinaryRevision, BrowserFetcher, Platform, RevisionManifest};

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("browser manifest error: {message}")]
    Manifest { message: String },
    #[error("no Chromium snapshots are published for this platform")]
    UnsupportedPlatform,
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to extract browser archive: {message}")]
    Extract { message: String },
    #[error("browser executable missing after install: {path}")]
    BinaryMissing { path: PathBuf },
}

impl ProvisioningError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisioningState {
    #[default]
    Unchecked,
    Satisfied,
    Downloading,
    Reconciling,
    Failed,
}

impl ProvisioningState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProvisioningState::Unchecked => "unchecked",
            ProvisioningState::Satisfied => "satisfied",
            ProvisioningState::Downloading => "downloading",
            ProvisioningState::Reconciling => "reconciling",
            ProvisioningState::Failed => "failed",
        }
    }
}

/// Result of removing one stale revision during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub revision: String,
    pub error: Option<String>,
}

impl RemovalOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug)]
pub struct ProvisioningReport {
    pub state: ProvisioningState,
    /// Executable the backend should launch, when one is available.
    pub executable: Option<PathBuf>,
    /// Revision installed by this run; `None` when nothing was downloaded.
    pub installed: Option<BinaryRevision>,
    pub removals: Vec<RemovalOutcome>,
    pub error: Option<ProvisioningError>,
    /// Stale revisions could not be listed; the install itself is usable.
    pub reconcile_error: Option<ProvisioningError>,
}

impl ProvisioningReport {
    pub fn is_satisfied(&self) -> bool {
        self.state == ProvisioningState::Satisfied
    }

    /// Report for a platform without Chromium snapshots: only a configured
    /// executable that exists can satisfy the export.
    pub fn without_provisioner(config: &RenderConfig) -> Self {
        let executable = config
            .executable_path
            .clone()
            .filter(|path| path.is_file());
        let (state, error) = match executable {
            Some(_) => (ProvisioningState::Satisfied, None),
            None => (
                ProvisioningState::Failed,
                Some(ProvisioningError::UnsupportedPlatform),
            ),
        };
        Self {
            state,
            executable,
            installed: None,
            removals: Vec::new(),
            error,
            reconcile_error: None,
        }
    }
}

pub struct Provisioner {
    fetcher: BrowserFetcher,
    revision: String,
    downloader: Arc<dyn ArchiveDownloader>,
    state: ProvisioningState,
}

impl Provisioner {
    pub fn new(
        fetcher: BrowserFetcher,
        revision: impl Into<String>,
        downloader: Arc<dyn ArchiveDownloader>,
    ) -> Self {
        Self {
            fetcher,
            revision: revision.into(),
            downloader,
            state: ProvisioningState::Unchecked,
        }
    }

    /// Provisioner for the current platform downloading over HTTP.
    pub fn for_current_platform(
        install_root: PathBuf,
        manifest: RevisionManifest,
    ) -> Result<Self, ProvisioningError> {
        let platform = Platform::current().ok_or(ProvisioningError::UnsupportedPlatform)?;
        let fetcher = BrowserFetcher::new(install_root, platform, manifest.download_host);
        Ok(Self::new(
            fetcher,
            manifest.revision,
            Arc::new(HttpDownloader),
        ))
    }

    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    /// The pinned revision's location under the install root.
    pub fn pinned(&self) -> BinaryRevision {
        self.fetcher.revision_info(&self.revision)
    }

    /// Whether a usable executable already exists: the configured one, or
    /// the pinned revision.
    pub fn is_satisfied(&self, config: &RenderConfig) -> bool {
        self.available_executable(config).is_some()
    }

    fn available_executable(&self, config: &RenderConfig) -> Option<PathBuf> {
        if let Some(path) = config.executable_path.as_ref().filter(|path| path.is_file()) {
            return Some(path.clone());
        }
        let pinned = self.pinned();
        pinned.is_installed().then_some(pinned.executable_path)
    }

    pub async fn provision(&mut self, config: &RenderConfig) -> ProvisioningReport {
        let started_at = Instant::now();

        if let Some(executable) = self.available_executable(config) {
            self.transition(ProvisioningState::Satisfied);
            return ProvisioningReport {
                state: self.state,
                executable: Some(executable),
                installed: None,
                removals: Vec::new(),
                error: None,
                reconcile_error: None,
            };
        }

        let installed = match self.download(config).await {
            Ok(installed) => installed,
            Err(err) => {
                self.transition(ProvisioningState::Failed);
                warn!(
                    target = "application::provision",
                    op = "provision",
                    result = "error",
                    revision = %self.revision,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    "Browser provisioning failed"
                );
                return ProvisioningReport {
                    state: self.state,
                    executable: None,
                    installed: None,
                    removals: Vec::new(),
                    error: Some(err),
                    reconcile_error: None,
                };
            }
        };

        self.transition(ProvisioningState::Reconciling);
        let reconciled = self.remove_stale_revisions().await;
        let report = self.complete_install(installed, reconciled);

        info!(
            target = "application::provision",
            op = "provision",
            result = "ok",
            revision = %self.revision,
            removed = report.removals.iter().filter(|r| r.succeeded()).count(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Browser provisioned"
        );
        report
    }

    async fn download(
        &mut self,
        config: &RenderConfig,
    ) -> Result<BinaryRevision, ProvisioningError> {
        self.transition(ProvisioningState::Downloading);
        let transport = TransportConfig::new(config.proxy.clone());

        let revision = self.revision.clone();
        let mut last_percent = None;
        let mut report_progress = |progress: DownloadProgress| {
            let Some(percent) = progress.percent() else {
                return;
            };
            if last_percent != Some(percent) {
                last_percent = Some(percent);
                info!(
                    target = "application::provision",
                    revision = %revision,
                    percent,
                    received_bytes = progress.received,
                    "Downloading Chromium"
                );
            }
        };

        self.fetcher
            .install(
                &self.revision,
                self.downloader.as_ref(),
                &transport,
                &mut report_progress,
            )
            .await
    }

    /// A fresh install is usable whatever reconciliation found; a failed
    /// listing only leaves stale revisions behind.
    fn complete_install(
        &mut self,
        installed: BinaryRevision,
        reconciled: Result<Vec<RemovalOutcome>, ProvisioningError>,
    ) -> ProvisioningReport {
        let (removals, reconcile_error) = match reconciled {
            Ok(removals) => (removals, None),
            Err(err) => {
                warn!(
                    target = "application::provision",
                    revision = %self.revision,
                    error = %err,
                    "Failed to list stale browser revisions"
                );
                (Vec::new(), Some(err))
            }
        };

        self.transition(ProvisioningState::Satisfied);
        ProvisioningReport {
            state: self.state,
            executable: Some(installed.executable_path.clone()),
            installed: Some(installed),
            removals,
            error: None,
            reconcile_error,
        }
    }

    /// Remove every installed revision except the pinned one. Removals run
    /// concurrently; one failing does not stop the others.
    async fn remove_stale_revisions(&self) -> Result<Vec<RemovalOutcome>, ProvisioningError> {
        let stale: Vec<String> = self
            .fetcher
            .local_revisions()
            .await?
            .into_iter()
            .filter(|revision| *revision != self.revision)
            .collect();

        let removals = stale.into_iter().map(|revision| async move {
            let result = self.fetcher.remove(&revision).await;
            if let Err(err) = &result {
                warn!(
                    target = "application::provision",
                    revision = %revision,
                    error = %err,
                    "Failed to remove stale browser revision"
                );
            }
            RemovalOutcome {
                revision,
                error: result.err().map(|err| err.to_string()),
            }
        });

        Ok(join_all(removals).await)
    }

    fn transition(&mut self, next: ProvisioningState) {
        tracing::debug!(
            target = "application::provision",
            from = self.state.as_str(),
            to = next.as_str(),
            "Provisioning state change"
        );
        self.state = next;
    }
}
