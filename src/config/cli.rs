use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the mdpdf binary.
#[derive(Debug, Parser)]
#[command(
    name = "mdpdf",
    version,
    about = "Convert markdown to PDF, PNG, JPEG or HTML",
    arg_required_else_help = true
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MDPDF_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Convert one markdown file.
    Export(ExportArgs),
    /// Download the pinned Chromium revision and remove older ones.
    #[command(name = "install-browser")]
    InstallBrowser(InstallBrowserArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub overrides: ExportOverrides,

    /// Markdown file to convert.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}

#[derive(Debug, Args, Default, Clone)]
pub struct InstallBrowserArgs {
    #[command(flatten)]
    pub browser: BrowserOverrides,

    #[command(flatten)]
    pub logging: LoggingOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ExportOverrides {
    /// Artifact type (html|pdf|png|jpeg).
    #[arg(long = "type", value_name = "TYPE")]
    pub export_type: Option<String>,

    /// Render single newlines as line breaks.
    #[arg(long = "breaks", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub breaks: Option<bool>,

    /// Directory receiving the artifact (default: beside the source).
    #[arg(long = "output-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// Directory holding `template.html` and `styles/` (default: bundled assets).
    #[arg(long = "assets-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub assets_dir: Option<PathBuf>,

    /// What to do when the browser cannot be provisioned (best-effort|fail-fast).
    #[arg(long = "on-provision-failure", value_name = "POLICY")]
    pub provisioning_policy: Option<String>,

    #[command(flatten)]
    pub browser: BrowserOverrides,

    #[command(flatten)]
    pub diagrams: DiagramOverrides,

    #[command(flatten)]
    pub logging: LoggingOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct BrowserOverrides {
    /// Browser executable to use instead of a provisioned Chromium.
    #[arg(long = "executable-path", value_name = "PATH", value_hint = ValueHint::ExecutablePath)]
    pub executable_path: Option<PathBuf>,

    /// Proxy URL for browser downloads.
    #[arg(long = "proxy", value_name = "URL")]
    pub proxy: Option<String>,

    /// Directory holding provisioned browser revisions.
    #[arg(long = "browser-install-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub install_dir: Option<PathBuf>,

    /// Override the snapshot download host.
    #[arg(long = "browser-download-host", value_name = "URL")]
    pub download_host: Option<String>,

    /// Override the pinned Chromium revision.
    #[arg(long = "browser-revision", value_name = "REVISION")]
    pub revision: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DiagramOverrides {
    /// PlantUML executable used for `plantuml` fences.
    #[arg(long = "plantuml-cli-path", value_name = "PATH")]
    pub plantuml_cli_path: Option<PathBuf>,

    /// Mermaid CLI (`mmdc`) used for `mermaid` fences.
    #[arg(long = "mermaid-cli-path", value_name = "PATH")]
    pub mermaid_cli_path: Option<PathBuf>,

    /// Directory caching rendered diagrams.
    #[arg(long = "diagram-cache-dir", value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}
