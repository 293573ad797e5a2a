use std::{fmt, path::PathBuf, str::FromStr};

use thiserror::Error;

/// Artifact produced at the end of a conversion.
///
/// The same value decides whether asset references are rewritten to absolute
/// `file:` URIs (everything except [`ExportType::Html`]) and which backend
/// path produces the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExportType {
    Html,
    #[default]
    Pdf,
    Png,
    Jpeg,
}

impl ExportType {
    /// File extension used for artifacts of this type.
    pub fn extension(self) -> &'static str {
        match self {
            ExportType::Html => "html",
            ExportType::Pdf => "pdf",
            ExportType::Png => "png",
            ExportType::Jpeg => "jpeg",
        }
    }

    /// Whether producing the artifact requires a browser binary.
    pub fn needs_browser(self) -> bool {
        !matches!(self, ExportType::Html)
    }

    pub fn is_image(self) -> bool {
        matches!(self, ExportType::Png | ExportType::Jpeg)
    }
}

impl fmt::Display for ExportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported export type `{0}` (expected html, pdf, png or jpeg)")]
pub struct UnknownExportType(pub String);

impl FromStr for ExportType {
    type Err = UnknownExportType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(ExportType::Html),
            "pdf" => Ok(ExportType::Pdf),
            "png" => Ok(ExportType::Png),
            "jpeg" | "jpg" => Ok(ExportType::Jpeg),
            other => Err(UnknownExportType(other.to_string())),
        }
    }
}

/// What the orchestrator does when browser provisioning ends in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisioningPolicy {
    /// Log the failure and continue; the backend fails later if no binary exists.
    #[default]
    BestEffort,
    /// Abort the conversion before rendering.
    FailFast,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported provisioning policy `{0}` (expected best-effort or fail-fast)")]
pub struct UnknownProvisioningPolicy(pub String);

impl FromStr for ProvisioningPolicy {
    type Err = UnknownProvisioningPolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "best-effort" => Ok(ProvisioningPolicy::BestEffort),
            "fail-fast" => Ok(ProvisioningPolicy::FailFast),
            other => Err(UnknownProvisioningPolicy(other.to_string())),
        }
    }
}

/// Per-conversion settings handed to the pipeline by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderConfig {
    pub export_type: ExportType,
    /// Render single newlines inside paragraphs as `<br>`.
    pub breaks: bool,
    /// Browser executable supplied by the user; wins over any provisioned binary.
    pub executable_path: Option<PathBuf>,
    /// Proxy URL used for browser downloads.
    pub proxy: Option<String>,
    /// Directory receiving the artifact; defaults to the source directory.
    pub output_dir: Option<PathBuf>,
    pub provisioning_policy: ProvisioningPolicy,
}

impl RenderConfig {
    pub fn new(export_type: ExportType) -> Self {
        Self {
            export_type,
            ..Self::default()
        }
    }
}

/// A markdown source read from disk. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source_path: PathBuf,
    pub raw_text: String,
}

impl Document {
    /// Title shown in the composed document: the source file name.
    pub fn title(&self) -> String {
        self.source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
