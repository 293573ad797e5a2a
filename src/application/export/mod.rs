//! One conversion from a markdown file to an artifact: provisioning,
//! reading, rendering, composing and handing off to the backend.

mod backend;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::application::{
    provision::{ProvisioningError, ProvisioningReport, ProvisioningState, Provisioner},
    render::{MarkdownRenderer, RenderError},
    template::TemplateComposer,
};
use crate::domain::{Document, ExportType, ProvisioningPolicy, RenderConfig};

pub use backend::{ChromiumCliBackend, ExportBackend, output_path};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("browser provisioning failed: {0}")]
    Provisioning(#[from] ProvisioningError),
    #[error("no browser executable configured or provisioned")]
    MissingExecutable,
    #[error("export backend failed: {message}")]
    Backend { message: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ExportError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub export_type: ExportType,
    /// Provisioning state after this run; `None` for HTML exports.
    pub provisioning: Option<ProvisioningState>,
}

pub struct ExportOrchestrator {
    renderer: MarkdownRenderer,
    composer: TemplateComposer,
    /// `None` on platforms without Chromium snapshots.
    provisioner: Option<Mutex<Provisioner>>,
    backend: Arc<dyn ExportBackend>,
}

impl ExportOrchestrator {
    pub fn new(
        renderer: MarkdownRenderer,
        composer: TemplateComposer,
        provisioner: Option<Provisioner>,
        backend: Arc<dyn ExportBackend>,
    ) -> Self {
        Self {
            renderer,
            composer,
            provisioner: provisioner.map(Mutex::new),
            backend,
        }
    }

    pub async fn run(
        &self,
        source_path: &Path,
        config: &RenderConfig,
    ) -> Result<ExportOutcome, ExportError> {
        let started_at = Instant::now();
        let export_type = config.export_type;

        let (effective, provisioning) = if export_type.needs_browser() {
            let (effective, state) = self.ensure_browser(config).await?;
            (effective, Some(state))
        } else {
            (config.clone(), None)
        };

        let document = read_document(source_path).await?;
        let rendered = self
            .renderer
            .render(&document.raw_text, &document.source_path, &effective)?;
        let composed = self.composer.compose_default(&rendered.html, &document.title());

        let output_path = self
            .backend
            .export_by_type(
                &document.source_path,
                &composed.final_html,
                export_type,
                &effective,
            )
            .await
            .inspect_err(|err| {
                warn!(
                    target = "application::export",
                    op = "export",
                    result = "error",
                    source = %document.source_path.display(),
                    error = %err,
                    "Export backend failed"
                );
            })?;

        info!(
            target = "application::export",
            op = "export",
            result = "ok",
            source = %document.source_path.display(),
            output = %output_path.display(),
            export_type = %export_type,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Export finished"
        );

        Ok(ExportOutcome {
            source_path: document.source_path,
            output_path,
            export_type,
            provisioning,
        })
    }

    /// Provision a browser and return the config the backend should see.
    async fn ensure_browser(
        &self,
        config: &RenderConfig,
    ) -> Result<(RenderConfig, ProvisioningState), ExportError> {
        let report = match &self.provisioner {
            Some(provisioner) => provisioner.lock().await.provision(config).await,
            None => ProvisioningReport::without_provisioner(config),
        };

        let mut effective = config.clone();
        if let Some(executable) = report.executable {
            effective.executable_path = Some(executable);
        }

        if let Some(err) = report.error {
            match config.provisioning_policy {
                ProvisioningPolicy::FailFast => return Err(ExportError::Provisioning(err)),
                ProvisioningPolicy::BestEffort => {
                    warn!(
                        target = "application::export",
                        op = "provision",
                        error = %err,
                        "Continuing without a provisioned browser"
                    );
                }
            }
        }

        Ok((effective, report.state))
    }
}

async fn read_document(source_path: &Path) -> Result<Document, ExportError> {
    let read_error = |source| ExportError::Read {
        path: source_path.to_path_buf(),
        source,
    };
    let source_path = tokio::fs::canonicalize(source_path)
        .await
        .map_err(read_error)?;
    let raw_text = tokio::fs::read_to_string(&source_path)
        .await
        .map_err(read_error)?;
    Ok(Document {
        source_path,
        raw_text,
    })
}
