//! The contract every step of the markdown-to-HTML chain implements.
//!
//! A stage may enable parser extensions before parsing, rewrite AST nodes
//! during the single pre-order walk, and post-process the formatted HTML.
//! Stages hold no per-document state; whatever a stage needs to remember
//! while walking lives in [`RenderContext`].

use std::path::Path;

use comrak::{nodes::AstNode, options::Options};

use crate::application::render::types::{RenderError, RenderedHeading};
use crate::domain::{ExportType, slug::AnchorSlugger};

/// What the walker does after a stage has seen a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Offer the node to the next stage and walk its children.
    Continue,
    /// The node was replaced; skip the remaining stages and its children.
    Handled,
}

pub(crate) trait TransformStage {
    fn name(&self) -> &'static str;

    fn extend_options(&self, _options: &mut Options<'static>) {}

    fn transform<'a>(
        &self,
        _node: &'a AstNode<'a>,
        _ctx: &mut RenderContext<'_>,
    ) -> Result<Flow, RenderError> {
        Ok(Flow::Continue)
    }

    fn finish(&self, html: String, _ctx: &RenderContext<'_>) -> Result<String, RenderError> {
        Ok(html)
    }
}

/// Mutable state for rendering one document.
pub(crate) struct RenderContext<'a> {
    pub(crate) document_path: &'a Path,
    pub(crate) export_type: ExportType,
    pub(crate) slugger: AnchorSlugger,
    pub(crate) headings: Vec<RenderedHeading>,
    pub(crate) contains_code: bool,
    pub(crate) contains_math: bool,
    pub(crate) contains_diagram: bool,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(document_path: &'a Path, export_type: ExportType) -> Self {
        Self {
            document_path,
            export_type,
            slugger: AnchorSlugger::new(),
            headings: Vec::new(),
            contains_code: false,
            contains_math: false,
            contains_diagram: false,
        }
    }
}

/// Walk `node` and its descendants in document order, offering each node to
/// the stages in sequence.
pub(crate) fn walk<'a>(
    node: &'a AstNode<'a>,
    stages: &[Box<dyn TransformStage + '_>],
    ctx: &mut RenderContext<'_>,
) -> Result<(), RenderError> {
    for stage in stages {
        if stage.transform(node, ctx)? == Flow::Handled {
            return Ok(());
        }
    }

    let mut child = node.first_child();
    while let Some(next) = child {
        // Read the sibling first: a stage may detach `next`.
        child = next.next_sibling();
        walk(next, stages, ctx)?;
    }

    Ok(())
}
