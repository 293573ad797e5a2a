use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Instant,
};

use async_trait::async_trait;
use reqwest::Url;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::{ExportType, RenderConfig};

use super::ExportError;

/// Turns a composed HTML page into the requested artifact.
#[async_trait]
pub trait ExportBackend: Send + Sync {
    /// Returns the path of the written artifact.
    async fn export_by_type(
        &self,
        source_path: &Path,
        html: &str,
        export_type: ExportType,
        config: &RenderConfig,
    ) -> Result<PathBuf, ExportError>;
}

/// `<stem>.<ext>` in `output_dir`, or beside the source.
pub fn output_path(source_path: &Path, export_type: ExportType, output_dir: Option<&Path>) -> PathBuf {
    let stem = source_path
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_else(|| "document".into());
    let mut file_name = stem;
    file_name.push(".");
    file_name.push(export_type.extension());

    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| source_path.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(file_name)
}

/// Drives a headless Chromium through its command line switches.
#[derive(Debug, Clone)]
pub struct ChromiumCliBackend {
    window_size: (u32, u32),
    virtual_time_budget_ms: u32,
}

impl Default for ChromiumCliBackend {
    fn default() -> Self {
        Self {
            window_size: (1280, 1696),
            virtual_time_budget_ms: 10_000,
        }
    }
}

impl ChromiumCliBackend {
    /// Viewport used for PNG and JPEG screenshots.
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = (width, height);
        self
    }

    fn browser_args(&self, export_type: ExportType, output: &Path, page_url: &Url) -> Vec<String> {
        let mut args = vec![
            "--headless".to_string(),
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            "--allow-file-access-from-files".to_string(),
            format!("--virtual-time-budget={}", self.virtual_time_budget_ms),
        ];
        if export_type.is_image() {
            args.push("--hide-scrollbars".to_string());
            args.push(format!("--screenshot={}", output.display()));
            args.push(format!(
                "--window-size={},{}",
                self.window_size.0, self.window_size.1
            ));
        } else {
            args.push("--no-pdf-header-footer".to_string());
            args.push(format!("--print-to-pdf={}", output.display()));
        }
        args.push(page_url.to_string());
        args
    }
}

#[async_trait]
impl ExportBackend for ChromiumCliBackend {
    async fn export_by_type(
        &self,
        source_path: &Path,
        html: &str,
        export_type: ExportType,
        config: &RenderConfig,
    ) -> Result<PathBuf, ExportError> {
        let output = output_path(source_path, export_type, config.output_dir.as_deref());
        if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ExportError::io(parent, source))?;
        }

        if export_type == ExportType::Html {
            tokio::fs::write(&output, html)
                .await
                .map_err(|source| ExportError::io(&output, source))?;
            return Ok(output);
        }

        let executable = config
            .executable_path
            .clone()
            .ok_or(ExportError::MissingExecutable)?;

        let page = tempfile::Builder::new()
            .prefix("mdpdf-")
            .suffix(".html")
            .tempfile()
            .map_err(|source| ExportError::io(&std::env::temp_dir(), source))?;
        tokio::fs::write(page.path(), html)
            .await
            .map_err(|source| ExportError::io(page.path(), source))?;
        let page_url = Url::from_file_path(page.path()).map_err(|()| ExportError::Backend {
            message: format!("cannot address {} as a file URL", page.path().display()),
        })?;

        let args = self.browser_args(export_type, &output, &page_url);
        debug!(
            target = "application::export::backend",
            executable = %executable.display(),
            args = ?args,
            "Launching browser"
        );

        let started_at = Instant::now();
        let result = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| ExportError::Backend {
                message: format!("failed to launch {}: {err}", executable.display()),
            })?;

        if !result.status.success() {
            return Err(ExportError::Backend {
                message: format!(
                    "browser exited with {}: {}",
                    result.status,
                    String::from_utf8_lossy(&result.stderr).trim()
                ),
            });
        }

        if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return Err(ExportError::Backend {
                message: format!("browser produced no output at {}", output.display()),
            });
        }

        info!(
            target = "application::export::backend",
            export_type = %export_type,
            output = %output.display(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Browser export finished"
        );
        Ok(output)
    }
}
