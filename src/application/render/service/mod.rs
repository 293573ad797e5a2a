mod anchors;
mod config;
mod diagram;
mod highlight;
mod images;
mod math;
mod stage;
mod tasklist;
mod toc;

use std::{path::Path, path::PathBuf, time::Instant};

use comrak::{Arena, format_html, parse_document};
use tracing::{info, warn};

use crate::application::render::types::{RenderError, RenderedContent};
use crate::domain::{ExportType, RenderConfig};

pub use diagram::{DiagramKind, DiagramRenderError, DiagramRenderer};
pub use highlight::{Highlighter, SyntectHighlighter};
pub use toc::ensure_toc_marker;

use anchors::HeadingAnchorStage;
use config::default_options;
use diagram::DiagramStage;
use highlight::CodeBlockStage;
use images::{ImageSourceStage, RawHtmlImageStage};
use math::MathStage;
use stage::{RenderContext, TransformStage, walk};
use tasklist::CheckboxStage;
use toc::TocStage;

/// External diagram tooling. A CLI left unset disables that diagram kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderPipelineConfig {
    pub plantuml_cli_path: Option<PathBuf>,
    pub mermaid_cli_path: Option<PathBuf>,
    pub diagram_cache_dir: PathBuf,
}

impl From<&crate::config::DiagramSettings> for RenderPipelineConfig {
    fn from(settings: &crate::config::DiagramSettings) -> Self {
        Self {
            plantuml_cli_path: settings.plantuml_cli_path.clone(),
            mermaid_cli_path: settings.mermaid_cli_path.clone(),
            diagram_cache_dir: settings.cache_dir.clone(),
        }
    }
}

/// Markdown to HTML conversion: comrak parsing, a fixed chain of AST
/// stages, then HTML formatting and per-stage post-processing.
pub struct MarkdownRenderer {
    highlighter: Box<dyn Highlighter>,
    diagrams: Vec<DiagramRenderer>,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    /// Renderer with Syntect highlighting and no diagram CLIs.
    pub fn new() -> Self {
        Self {
            highlighter: Box::new(SyntectHighlighter::default()),
            diagrams: Vec::new(),
        }
    }

    /// Renderer with the diagram CLIs named in `config`. A CLI whose cache
    /// directory cannot be prepared is disabled with a warning.
    pub fn from_config(config: &RenderPipelineConfig) -> Self {
        let mut renderer = Self::new();
        let candidates = [
            (DiagramKind::PlantUml, config.plantuml_cli_path.as_ref()),
            (DiagramKind::Mermaid, config.mermaid_cli_path.as_ref()),
        ];
        for (kind, cli_path) in candidates {
            let Some(cli_path) = cli_path else { continue };
            match DiagramRenderer::new(kind, cli_path.clone(), config.diagram_cache_dir.clone()) {
                Ok(diagram) => renderer.diagrams.push(diagram),
                Err(err) => log_diagram_init_error(kind, &err, cli_path, config),
            }
        }
        renderer
    }

    pub fn with_highlighter(mut self, highlighter: impl Highlighter + 'static) -> Self {
        self.highlighter = Box::new(highlighter);
        self
    }

    pub fn with_diagram_renderer(mut self, renderer: DiagramRenderer) -> Self {
        self.diagrams.retain(|existing| existing.kind() != renderer.kind());
        self.diagrams.push(renderer);
        self
    }

    pub fn render(
        &self,
        source_text: &str,
        document_path: &Path,
        config: &RenderConfig,
    ) -> Result<RenderedContent, RenderError> {
        let started_at = Instant::now();
        let text = ensure_toc_marker(source_text);

        let stages = self.stages(config.export_type);
        let mut options = default_options(config.breaks);
        for stage in &stages {
            stage.extend_options(&mut options);
        }

        let arena = Arena::new();
        let root = parse_document(&arena, &text, &options);

        let mut ctx = RenderContext::new(document_path, config.export_type);
        walk(root, &stages, &mut ctx)?;

        let mut html = String::new();
        format_html(root, &options, &mut html).map_err(|err| RenderError::Markdown {
            message: err.to_string(),
        })?;

        for stage in &stages {
            html = stage.finish(html, &ctx).inspect_err(|err| {
                warn!(
                    target = "application::render",
                    op = "render",
                    stage = stage.name(),
                    result = "error",
                    document = %document_path.display(),
                    error = %err,
                    "Render stage failed"
                );
            })?;
        }

        info!(
            target = "application::render",
            op = "render",
            result = "ok",
            document = %document_path.display(),
            export_type = %config.export_type,
            headings = ctx.headings.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Markdown rendered"
        );

        Ok(RenderedContent {
            html,
            headings: ctx.headings,
            contains_code: ctx.contains_code,
            contains_math: ctx.contains_math,
            contains_diagram: ctx.contains_diagram,
        })
    }

    /// The transform chain in execution order. Raw HTML image rewriting only
    /// applies to exports rendered from a temporary file.
    fn stages(&self, export_type: ExportType) -> Vec<Box<dyn TransformStage + '_>> {
        let highlighter = self.highlighter.as_ref();
        let mut stages: Vec<Box<dyn TransformStage + '_>> = vec![
            Box::new(CheckboxStage),
            Box::new(HeadingAnchorStage),
            Box::new(TocStage),
            Box::new(MathStage),
            Box::new(DiagramStage::new(&self.diagrams, highlighter)),
            Box::new(CodeBlockStage::new(highlighter)),
            Box::new(ImageSourceStage),
        ];
        if export_type != ExportType::Html {
            stages.push(Box::new(RawHtmlImageStage));
        }
        stages
    }
}

fn log_diagram_init_error(
    kind: DiagramKind,
    error: &DiagramRenderError,
    cli_path: &Path,
    config: &RenderPipelineConfig,
) {
    warn!(
        target = "application::render::diagram",
        kind = %kind,
        cli_path = %cli_path.display(),
        cache_dir = %config.diagram_cache_dir.display(),
        error = %error,
        "Diagram renderer disabled"
    );
}
