//! Markdown rendering.
//!
//! The renderer is pure apart from diagram CLI invocations and their cache:
//! it accepts markdown text plus the path it was read from, produces HTML
//! and surfaces structured errors. Writing artifacts happens in the caller.

mod service;
mod types;

pub use service::{
    DiagramKind, DiagramRenderError, DiagramRenderer, Highlighter, MarkdownRenderer,
    RenderPipelineConfig, SyntectHighlighter, ensure_toc_marker,
};
pub use types::{RenderError, RenderedContent, RenderedHeading};
