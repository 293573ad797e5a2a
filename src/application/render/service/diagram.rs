use std::{
    fs,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::Instant,
};

use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::render::types::RenderError;

use super::highlight::{Highlighter, code_block_parts, render_code_block};
use super::stage::{Flow, RenderContext, TransformStage};

#[derive(Debug, Error)]
pub enum DiagramRenderError {
    #[error("failed to prepare cache directory: {0}")]
    CacheInit(io::Error),
    #[error("failed to write temporary file: {0}")]
    Io(io::Error),
    #[error("{kind} CLI invocation failed (exit {exit_code:?}): {stderr}")]
    Cli {
        kind: DiagramKind,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("{kind} CLI unavailable: {source}")]
    NotFound {
        kind: DiagramKind,
        source: io::Error,
    },
    #[error("failed to read rendered SVG: {0}")]
    Read(io::Error),
}

/// Diagram languages recognised in fenced code blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagramKind {
    PlantUml,
    Mermaid,
}

impl DiagramKind {
    pub fn from_language(language: &str) -> Option<Self> {
        match language.to_ascii_lowercase().as_str() {
            "plantuml" | "puml" | "uml" => Some(DiagramKind::PlantUml),
            "mermaid" => Some(DiagramKind::Mermaid),
            _ => None,
        }
    }

    fn cache_prefix(self) -> &'static str {
        match self {
            DiagramKind::PlantUml => "plantuml",
            DiagramKind::Mermaid => "mermaid",
        }
    }
}

impl std::fmt::Display for DiagramKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DiagramKind::PlantUml => "PlantUML",
            DiagramKind::Mermaid => "Mermaid",
        })
    }
}

/// Renders diagram sources to SVG through an external CLI (`plantuml` or
/// `mmdc`), caching results by content hash.
#[derive(Debug, Clone)]
pub struct DiagramRenderer {
    kind: DiagramKind,
    cli_path: PathBuf,
    cache_dir: PathBuf,
}

impl DiagramRenderer {
    pub fn new(
        kind: DiagramKind,
        cli_path: PathBuf,
        cache_dir: PathBuf,
    ) -> Result<Self, DiagramRenderError> {
        fs::create_dir_all(&cache_dir).map_err(DiagramRenderError::CacheInit)?;
        Ok(Self {
            kind,
            cli_path,
            cache_dir,
        })
    }

    pub fn kind(&self) -> DiagramKind {
        self.kind
    }

    pub fn render_svg(&self, source: &str) -> Result<String, DiagramRenderError> {
        let started_at = Instant::now();
        let cache_key = hash_source(source);
        let cache_path = self
            .cache_dir
            .join(format!("{}-{cache_key}.svg", self.kind.cache_prefix()));
        match fs::read_to_string(&cache_path) {
            Ok(svg) => {
                info!(
                    target = "application::render::diagram",
                    op = "diagram::render_svg",
                    kind = %self.kind,
                    result = "cache_hit",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    cache_path = %cache_path.display(),
                    "Diagram served from cache"
                );
                return Ok(svg);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!(
                    target = "application::render::diagram",
                    op = "diagram::render_svg",
                    kind = %self.kind,
                    result = "cache_read_error",
                    cache_path = %cache_path.display(),
                    error = %err,
                    "Failed to read cached diagram; re-rendering"
                );
            }
        }

        let mut input_file = NamedTempFile::new().map_err(DiagramRenderError::Io)?;
        input_file
            .write_all(source.as_bytes())
            .map_err(DiagramRenderError::Io)?;
        input_file.flush().map_err(DiagramRenderError::Io)?;

        let output_file = tempfile::Builder::new()
            .suffix(".svg")
            .tempfile_in(&self.cache_dir)
            .map_err(DiagramRenderError::Io)?;
        let output_path = output_file.path().to_path_buf();

        let cli_started_at = Instant::now();
        let output = self
            .command(input_file.path(), &output_path)
            .map_err(DiagramRenderError::Io)?
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| {
                warn!(
                    target = "application::render::diagram",
                    op = "diagram::render_svg",
                    kind = %self.kind,
                    result = "error",
                    error_code = "spawn_cli",
                    error = %err,
                    "Failed to spawn diagram CLI"
                );
                if err.kind() == ErrorKind::NotFound {
                    DiagramRenderError::NotFound {
                        kind: self.kind,
                        source: err,
                    }
                } else {
                    DiagramRenderError::Io(err)
                }
            })?;

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                target = "application::render::diagram",
                op = "diagram::render_svg",
                kind = %self.kind,
                result = "error",
                cli_elapsed_ms = cli_started_at.elapsed().as_millis() as u64,
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                error_code = "diagram_cli",
                stderr = %stderr,
                "Diagram CLI invocation failed"
            );
            return Err(DiagramRenderError::Cli {
                kind: self.kind,
                exit_code,
                stderr,
            });
        }

        if self.kind == DiagramKind::PlantUml {
            // `plantuml -pipe` answers on stdout.
            fs::write(&output_path, &output.stdout).map_err(DiagramRenderError::Io)?;
        }

        match output_file.persist(&cache_path) {
            Ok(_) => {}
            // Another conversion persisted the same diagram concurrently.
            Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(DiagramRenderError::Io(err.error)),
        }

        let svg = fs::read_to_string(&cache_path).map_err(DiagramRenderError::Read)?;

        info!(
            target = "application::render::diagram",
            op = "diagram::render_svg",
            kind = %self.kind,
            result = "cache_miss",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            cli_elapsed_ms = cli_started_at.elapsed().as_millis() as u64,
            svg_bytes = svg.len(),
            "Diagram rendered via CLI"
        );

        Ok(svg)
    }

    fn command(&self, input: &Path, output: &Path) -> io::Result<Command> {
        let mut command = Command::new(&self.cli_path);
        match self.kind {
            DiagramKind::Mermaid => {
                command
                    .arg("--input")
                    .arg(input)
                    .arg("--output")
                    .arg(output)
                    .arg("--outputFormat")
                    .arg("svg")
                    .arg("--quiet")
                    .stdin(Stdio::null())
                    .stdout(Stdio::null());
            }
            DiagramKind::PlantUml => {
                // -pipe reads the diagram from stdin.
                command
                    .arg("-tsvg")
                    .arg("-pipe")
                    .arg("-charset")
                    .arg("UTF-8")
                    .stdin(fs::File::open(input)?)
                    .stdout(Stdio::piped());
            }
        }
        Ok(command)
    }
}

fn hash_source(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}

/// Replaces diagram fences with inline SVG. A missing renderer or a CLI
/// failure degrades to a plain code block.
pub(crate) struct DiagramStage<'r> {
    renderers: &'r [DiagramRenderer],
    highlighter: &'r dyn Highlighter,
}

impl<'r> DiagramStage<'r> {
    pub(crate) fn new(renderers: &'r [DiagramRenderer], highlighter: &'r dyn Highlighter) -> Self {
        Self {
            renderers,
            highlighter,
        }
    }
}

impl TransformStage for DiagramStage<'_> {
    fn name(&self) -> &'static str {
        "diagram"
    }

    fn transform<'a>(
        &self,
        node: &'a AstNode<'a>,
        ctx: &mut RenderContext<'_>,
    ) -> Result<Flow, RenderError> {
        let Some((Some(language), literal)) = code_block_parts(node) else {
            return Ok(Flow::Continue);
        };
        let Some(kind) = DiagramKind::from_language(&language) else {
            return Ok(Flow::Continue);
        };

        let rendered = match self.renderers.iter().find(|r| r.kind() == kind) {
            Some(renderer) => renderer
                .render_svg(&literal)
                .inspect_err(|err| {
                    warn!(
                        target = "application::render::diagram",
                        document = %ctx.document_path.display(),
                        "{err}; falling back to code block"
                    );
                })
                .ok(),
            None => {
                warn!(
                    target = "application::render::diagram",
                    document = %ctx.document_path.display(),
                    kind = %kind,
                    "No renderer configured; falling back to code block"
                );
                None
            }
        };

        let html = match rendered {
            Some(svg) => {
                ctx.contains_diagram = true;
                format!("<figure class=\"diagram diagram-{}\">{svg}</figure>", kind.cache_prefix())
            }
            None => {
                ctx.contains_code = true;
                render_code_block(self.highlighter, Some(&language), &literal)
            }
        };

        node.data.borrow_mut().value = NodeValue::HtmlBlock(NodeHtmlBlock {
            block_type: 0,
            literal: html,
        });
        Ok(Flow::Handled)
    }
}
