use thiserror::Error;

/// HTML produced for one document, consumed once by the template composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedContent {
    pub html: String,
    /// Anchors assigned to headings, in document order.
    pub headings: Vec<RenderedHeading>,
    pub contains_code: bool,
    pub contains_math: bool,
    pub contains_diagram: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedHeading {
    pub level: u8,
    pub anchor: String,
    pub text: String,
}

/// Errors that abort the conversion of the current document. Recoverable
/// problems (unresolvable asset paths, highlighter or KaTeX failures,
/// diagram CLI failures) degrade the output instead and never surface here.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("markdown formatting failed: {message}")]
    Markdown { message: String },
    #[error("syntax highlighting failed: {language}: {message}")]
    Highlighting { language: String, message: String },
    #[error("html rewriting failed in stage `{stage}`: {message}")]
    Rewrite { stage: &'static str, message: String },
    #[error("document processing failed: {message}")]
    Document { message: String },
}

impl RenderError {
    pub(crate) fn rewrite(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Rewrite {
            stage,
            message: err.to_string(),
        }
    }
}
