use std::{process, sync::Arc};

use mdpdf::{
    application::{
        error::AppError,
        export::{ChromiumCliBackend, ExportOrchestrator},
        provision::{Provisioner, ProvisioningError, RevisionManifest},
        render::{MarkdownRenderer, RenderPipelineConfig},
        template::{AssetRoot, TemplateComposer},
    },
    config::{self, Command, Settings},
    infra::telemetry,
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let messages = error.messages();
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?messages, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?messages, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Some(Command::Export(args)) => run_export(&settings, &args.file).await,
        Some(Command::InstallBrowser(_)) => run_install_browser(&settings).await,
        None => Err(AppError::unexpected("no command given")),
    }
}

async fn run_export(settings: &Settings, file: &std::path::Path) -> Result<(), AppError> {
    let renderer = MarkdownRenderer::from_config(&RenderPipelineConfig::from(&settings.diagrams));
    let asset_root = settings
        .assets
        .directory
        .clone()
        .map_or(AssetRoot::Bundled, AssetRoot::Directory);
    let composer = TemplateComposer::new(asset_root)?;
    let provisioner = match build_provisioner(settings) {
        Ok(provisioner) => Some(provisioner),
        Err(ProvisioningError::UnsupportedPlatform) => {
            warn!(
                target = "mdpdf::export",
                "No Chromium snapshots for this platform; only a configured executable can be used"
            );
            None
        }
        Err(err) => return Err(err.into()),
    };

    let orchestrator = ExportOrchestrator::new(
        renderer,
        composer,
        provisioner,
        Arc::new(ChromiumCliBackend::default()),
    );

    let outcome = orchestrator.run(file, &settings.render_config()).await?;
    println!("{}", outcome.output_path.display());
    Ok(())
}

async fn run_install_browser(settings: &Settings) -> Result<(), AppError> {
    let mut provisioner = build_provisioner(settings)?;
    let report = provisioner.provision(&settings.render_config()).await;

    for removal in &report.removals {
        info!(
            target = "mdpdf::install_browser",
            revision = %removal.revision,
            removed = removal.succeeded(),
            "Stale revision processed"
        );
    }

    if let Some(err) = report.error {
        return Err(err.into());
    }
    if let Some(err) = report.reconcile_error {
        warn!(
            target = "mdpdf::install_browser",
            error = %err,
            "Stale revisions were left in place"
        );
    }
    if let Some(executable) = report.executable {
        println!("{}", executable.display());
    }
    Ok(())
}

fn build_provisioner(settings: &Settings) -> Result<Provisioner, ProvisioningError> {
    let mut manifest = RevisionManifest::bundled()?;
    if let Some(revision) = settings.browser.revision.as_ref() {
        manifest.revision = revision.clone();
    }
    if let Some(host) = settings.browser.download_host.as_ref() {
        manifest.download_host = host.clone();
    }

    Provisioner::for_current_platform(settings.browser.install_dir.clone(), manifest)
}
