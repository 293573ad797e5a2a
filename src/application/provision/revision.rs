//! Chromium snapshot layout: platforms, download URLs and install
//! directories.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use reqwest::Url;
use serde::Deserialize;

use crate::infra::{
    assets::{MANIFEST_PATH, bundled_text},
    download::{ArchiveDownloader, DownloadProgress, TransportConfig},
};

use super::ProvisioningError;

/// Platforms Chromium snapshots are published for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    Mac,
    MacArm,
    Win32,
    Win64,
}

impl Platform {
    /// The platform this binary was built for, if snapshots exist for it.
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
            Some(Platform::MacArm)
        } else if cfg!(target_os = "macos") {
            Some(Platform::Mac)
        } else if cfg!(all(target_os = "windows", target_pointer_width = "64")) {
            Some(Platform::Win64)
        } else if cfg!(target_os = "windows") {
            Some(Platform::Win32)
        } else {
            None
        }
    }

    /// Prefix of install directories (`linux-1095492`).
    pub fn tag(self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Mac => "mac",
            Platform::MacArm => "mac_arm",
            Platform::Win32 => "win32",
            Platform::Win64 => "win64",
        }
    }

    fn snapshot_folder(self) -> &'static str {
        match self {
            Platform::Linux => "Linux_x64",
            Platform::Mac => "Mac",
            Platform::MacArm => "Mac_Arm",
            Platform::Win32 => "Win",
            Platform::Win64 => "Win_x64",
        }
    }

    fn archive_name(self) -> &'static str {
        match self {
            Platform::Linux => "chrome-linux",
            Platform::Mac | Platform::MacArm => "chrome-mac",
            Platform::Win32 | Platform::Win64 => "chrome-win",
        }
    }

    fn executable_relative(self) -> &'static str {
        match self {
            Platform::Linux => "chrome-linux/chrome",
            Platform::Mac | Platform::MacArm => "chrome-mac/Chromium.app/Contents/MacOS/Chromium",
            Platform::Win32 | Platform::Win64 => "chrome-win/chrome.exe",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Pinned browser revision and the host serving its snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RevisionManifest {
    pub revision: String,
    pub download_host: String,
}

impl RevisionManifest {
    /// The manifest compiled into the binary.
    pub fn bundled() -> Result<Self, ProvisioningError> {
        let text = bundled_text(MANIFEST_PATH).ok_or_else(|| ProvisioningError::Manifest {
            message: format!("{MANIFEST_PATH} is not bundled"),
        })?;
        Self::parse(text)
    }

    pub fn parse(text: &str) -> Result<Self, ProvisioningError> {
        let manifest: Self = toml::from_str(text).map_err(|err| ProvisioningError::Manifest {
            message: err.to_string(),
        })?;
        if manifest.revision.trim().is_empty() {
            return Err(ProvisioningError::Manifest {
                message: "revision must not be empty".to_string(),
            });
        }
        Ok(manifest)
    }
}

/// Where one revision lives (or would live) on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRevision {
    pub revision: String,
    pub platform: Platform,
    pub install_path: PathBuf,
    pub executable_path: PathBuf,
}

impl BinaryRevision {
    pub fn is_installed(&self) -> bool {
        self.executable_path.is_file()
    }
}

/// Installs, lists and removes Chromium revisions under one install root.
#[derive(Debug, Clone)]
pub struct BrowserFetcher {
    install_root: PathBuf,
    platform: Platform,
    download_host: String,
}

impl BrowserFetcher {
    pub fn new(install_root: PathBuf, platform: Platform, download_host: impl Into<String>) -> Self {
        Self {
            install_root,
            platform,
            download_host: download_host.into(),
        }
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn revision_info(&self, revision: &str) -> BinaryRevision {
        let install_path = self
            .install_root
            .join(format!("{}-{revision}", self.platform.tag()));
        let executable_path = install_path.join(self.platform.executable_relative());
        BinaryRevision {
            revision: revision.to_string(),
            platform: self.platform,
            install_path,
            executable_path,
        }
    }

    pub fn download_url(&self, revision: &str) -> Result<Url, ProvisioningError> {
        let raw = format!(
            "{}/chromium-browser-snapshots/{}/{revision}/{}.zip",
            self.download_host.trim_end_matches('/'),
            self.platform.snapshot_folder(),
            self.platform.archive_name(),
        );
        Url::parse(&raw).map_err(|err| ProvisioningError::Manifest {
            message: format!("invalid download URL `{raw}`: {err}"),
        })
    }

    /// Revisions installed for this platform, sorted. A missing install root
    /// means nothing is installed.
    pub async fn local_revisions(&self) -> Result<Vec<String>, ProvisioningError> {
        let mut entries = match tokio::fs::read_dir(&self.install_root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(ProvisioningError::io(&self.install_root, err)),
        };

        let prefix = format!("{}-", self.platform.tag());
        let mut revisions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| ProvisioningError::io(&self.install_root, err))?
        {
            let name = entry.file_name();
            let Some(revision) = name.to_str().and_then(|name| name.strip_prefix(&prefix)) else {
                continue;
            };
            if !revision.is_empty() && entry.path().is_dir() {
                revisions.push(revision.to_string());
            }
        }
        revisions.sort();
        Ok(revisions)
    }

    pub async fn remove(&self, revision: &str) -> Result<(), ProvisioningError> {
        let path = self.revision_info(revision).install_path;
        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|err| ProvisioningError::io(&path, err))
    }

    /// Download and unpack `revision`. The archive is extracted into a
    /// staging directory which is renamed into place only once complete.
    pub async fn install(
        &self,
        revision: &str,
        downloader: &dyn ArchiveDownloader,
        transport: &TransportConfig,
        progress: &mut (dyn FnMut(DownloadProgress) + Send),
    ) -> Result<BinaryRevision, ProvisioningError> {
        let info = self.revision_info(revision);
        let url = self.download_url(revision)?;

        tokio::fs::create_dir_all(&self.install_root)
            .await
            .map_err(|err| ProvisioningError::io(&self.install_root, err))?;

        let archive = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".zip")
            .tempfile_in(&self.install_root)
            .map_err(|err| ProvisioningError::io(&self.install_root, err))?;
        downloader
            .fetch(&url, transport, archive.path(), progress)
            .await?;

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.install_root)
            .map_err(|err| ProvisioningError::io(&self.install_root, err))?;

        let archive_path = archive.path().to_path_buf();
        let staging_path = staging.path().to_path_buf();
        tokio::task::spawn_blocking(move || extract_archive(&archive_path, &staging_path))
            .await
            .map_err(|err| ProvisioningError::Extract {
                message: format!("extraction task failed: {err}"),
            })??;

        if tokio::fs::try_exists(&info.install_path)
            .await
            .unwrap_or(false)
        {
            // Leftover from an interrupted install without a usable binary.
            tokio::fs::remove_dir_all(&info.install_path)
                .await
                .map_err(|err| ProvisioningError::io(&info.install_path, err))?;
        }

        let staged = staging.keep();
        if let Err(err) = tokio::fs::rename(&staged, &info.install_path).await {
            let _ = tokio::fs::remove_dir_all(&staged).await;
            return Err(ProvisioningError::io(&info.install_path, err));
        }

        if !info.is_installed() {
            return Err(ProvisioningError::BinaryMissing {
                path: info.executable_path.clone(),
            });
        }

        Ok(info)
    }
}

fn extract_archive(archive: &Path, destination: &Path) -> Result<(), ProvisioningError> {
    let file = std::fs::File::open(archive).map_err(|err| ProvisioningError::io(archive, err))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|err| ProvisioningError::Extract {
        message: err.to_string(),
    })?;
    zip.extract(destination)
        .map_err(|err| ProvisioningError::Extract {
            message: err.to_string(),
        })
}
