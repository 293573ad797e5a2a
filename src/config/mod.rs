//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::{ExportType, ProvisioningPolicy, RenderConfig};

pub use cli::{
    BrowserOverrides, CliArgs, Command, DiagramOverrides, ExportArgs, ExportOverrides,
    InstallBrowserArgs, LoggingOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "mdpdf";
const ENV_PREFIX: &str = "MDPDF";
const CACHE_SUBDIR: &str = "mdpdf";
const DEFAULT_BROWSER_SUBDIR: &str = "chromium";
const DEFAULT_DIAGRAM_SUBDIR: &str = "diagrams";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub browser: BrowserSettings,
    pub assets: AssetSettings,
    pub diagrams: DiagramSettings,
}

impl Settings {
    /// Per-conversion configuration handed to the export pipeline.
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            export_type: self.render.export_type,
            breaks: self.render.breaks,
            executable_path: self.browser.executable_path.clone(),
            proxy: self.browser.proxy.clone(),
            output_dir: self.render.output_dir.clone(),
            provisioning_policy: self.render.provisioning_policy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub export_type: ExportType,
    pub breaks: bool,
    pub output_dir: Option<PathBuf>,
    pub provisioning_policy: ProvisioningPolicy,
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub executable_path: Option<PathBuf>,
    pub proxy: Option<String>,
    pub install_dir: PathBuf,
    /// Overrides the host named in the bundled manifest.
    pub download_host: Option<String>,
    /// Overrides the revision pinned in the bundled manifest.
    pub revision: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AssetSettings {
    /// `None` selects the assets bundled into the binary.
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DiagramSettings {
    pub plantuml_cli_path: Option<PathBuf>,
    pub mermaid_cli_path: Option<PathBuf>,
    pub cache_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    load_with_environment(cli, Environment::with_prefix(ENV_PREFIX).separator("__"))
}

fn load_with_environment(cli: &CliArgs, environment: Environment) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(environment);

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Export(args)) => raw.apply_export_overrides(&args.overrides),
        Some(Command::InstallBrowser(args)) => {
            raw.apply_browser_overrides(&args.browser);
            raw.apply_logging_overrides(&args.logging);
        }
        None => {}
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    browser: RawBrowserSettings,
    assets: RawAssetSettings,
    diagrams: RawDiagramSettings,
}

impl RawSettings {
    fn apply_export_overrides(&mut self, overrides: &ExportOverrides) {
        if let Some(export_type) = overrides.export_type.as_ref() {
            self.render.export_type = Some(export_type.clone());
        }
        if let Some(breaks) = overrides.breaks {
            self.render.breaks = Some(breaks);
        }
        if let Some(dir) = overrides.output_dir.as_ref() {
            self.render.output_dir = Some(dir.clone());
        }
        if let Some(policy) = overrides.provisioning_policy.as_ref() {
            self.render.provisioning_policy = Some(policy.clone());
        }
        if let Some(dir) = overrides.assets_dir.as_ref() {
            self.assets.directory = Some(dir.clone());
        }

        self.apply_browser_overrides(&overrides.browser);
        self.apply_diagram_overrides(&overrides.diagrams);
        self.apply_logging_overrides(&overrides.logging);
    }

    fn apply_browser_overrides(&mut self, overrides: &BrowserOverrides) {
        if let Some(path) = overrides.executable_path.as_ref() {
            self.browser.executable_path = Some(path.clone());
        }
        if let Some(proxy) = overrides.proxy.as_ref() {
            self.browser.proxy = Some(proxy.clone());
        }
        if let Some(dir) = overrides.install_dir.as_ref() {
            self.browser.install_dir = Some(dir.clone());
        }
        if let Some(host) = overrides.download_host.as_ref() {
            self.browser.download_host = Some(host.clone());
        }
        if let Some(revision) = overrides.revision.as_ref() {
            self.browser.revision = Some(revision.clone());
        }
    }

    fn apply_diagram_overrides(&mut self, overrides: &DiagramOverrides) {
        if let Some(path) = overrides.plantuml_cli_path.as_ref() {
            self.diagrams.plantuml_cli_path = Some(path.clone());
        }
        if let Some(path) = overrides.mermaid_cli_path.as_ref() {
            self.diagrams.mermaid_cli_path = Some(path.clone());
        }
        if let Some(dir) = overrides.cache_dir.as_ref() {
            self.diagrams.cache_dir = Some(dir.clone());
        }
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            render,
            browser,
            assets,
            diagrams,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let render = build_render_settings(render)?;
        let browser = build_browser_settings(browser)?;
        let assets = build_asset_settings(assets);
        let diagrams = build_diagram_settings(diagrams)?;

        Ok(Self {
            logging,
            render,
            browser,
            assets,
            diagrams,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let export_type = match render.export_type {
        Some(value) => ExportType::from_str(&value)
            .map_err(|err| LoadError::invalid("render.export_type", err.to_string()))?,
        None => ExportType::default(),
    };

    let provisioning_policy = match render.provisioning_policy {
        Some(value) => ProvisioningPolicy::from_str(&value)
            .map_err(|err| LoadError::invalid("render.provisioning_policy", err.to_string()))?,
        None => ProvisioningPolicy::default(),
    };

    Ok(RenderSettings {
        export_type,
        breaks: render.breaks.unwrap_or(false),
        output_dir: non_empty_path(render.output_dir),
        provisioning_policy,
    })
}

fn build_browser_settings(browser: RawBrowserSettings) -> Result<BrowserSettings, LoadError> {
    let install_dir = browser
        .install_dir
        .unwrap_or_else(|| default_cache_dir().join(DEFAULT_BROWSER_SUBDIR));
    if install_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "browser.install_dir",
            "path must not be empty",
        ));
    }

    let download_host = non_empty_string(browser.download_host);
    if let Some(host) = download_host.as_deref() {
        url::Url::parse(host)
            .map_err(|err| LoadError::invalid("browser.download_host", err.to_string()))?;
    }

    let revision = match browser.revision {
        Some(value) if value.trim().is_empty() => {
            return Err(LoadError::invalid(
                "browser.revision",
                "revision must not be empty",
            ));
        }
        other => other.map(|value| value.trim().to_string()),
    };

    Ok(BrowserSettings {
        executable_path: non_empty_path(browser.executable_path),
        proxy: non_empty_string(browser.proxy),
        install_dir,
        download_host,
        revision,
    })
}

fn build_asset_settings(assets: RawAssetSettings) -> AssetSettings {
    AssetSettings {
        directory: non_empty_path(assets.directory),
    }
}

fn build_diagram_settings(diagrams: RawDiagramSettings) -> Result<DiagramSettings, LoadError> {
    let cache_dir = diagrams
        .cache_dir
        .unwrap_or_else(|| default_cache_dir().join(DEFAULT_DIAGRAM_SUBDIR));
    if cache_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "diagrams.cache_dir",
            "path must not be empty",
        ));
    }

    Ok(DiagramSettings {
        plantuml_cli_path: non_empty_path(diagrams.plantuml_cli_path),
        mermaid_cli_path: non_empty_path(diagrams.mermaid_cli_path),
        cache_dir,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    export_type: Option<String>,
    breaks: Option<bool>,
    output_dir: Option<PathBuf>,
    provisioning_policy: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBrowserSettings {
    executable_path: Option<PathBuf>,
    proxy: Option<String>,
    install_dir: Option<PathBuf>,
    download_host: Option<String>,
    revision: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAssetSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDiagramSettings {
    plantuml_cli_path: Option<PathBuf>,
    mermaid_cli_path: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_SUBDIR)
}

fn non_empty_path(value: Option<PathBuf>) -> Option<PathBuf> {
    value.filter(|path| !path.as_os_str().is_empty())
}

fn non_empty_string(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
