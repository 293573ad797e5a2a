use once_cell::sync::Lazy;
use syntect::{
    html::{ClassStyle, ClassedHTMLGenerator},
    parsing::{SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};

use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};

use crate::application::render::types::RenderError;

use super::stage::{Flow, RenderContext, TransformStage};

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(two_face::syntax::extra_newlines);

/// Turns source code in a known language into highlighted HTML.
pub trait Highlighter: Send + Sync {
    /// Whether `language` is recognised. Unknown languages are escaped
    /// verbatim without calling [`Highlighter::highlight`].
    fn supports(&self, language: &str) -> bool;

    fn highlight(&self, language: &str, code: &str) -> Result<String, RenderError>;
}

/// Syntect highlighter emitting `syntax-` prefixed CSS classes, matched by
/// the bundled `arduino-light.css`.
pub struct SyntectHighlighter {
    syntax_set: &'static SyntaxSet,
    class_style: ClassStyle,
}

impl Default for SyntectHighlighter {
    fn default() -> Self {
        Self {
            syntax_set: &SYNTAX_SET,
            class_style: ClassStyle::SpacedPrefixed { prefix: "syntax-" },
        }
    }
}

impl Highlighter for SyntectHighlighter {
    fn supports(&self, language: &str) -> bool {
        find_syntax(self.syntax_set, language).is_some()
    }

    fn highlight(&self, language: &str, code: &str) -> Result<String, RenderError> {
        let syntax = find_syntax(self.syntax_set, language).ok_or_else(|| {
            RenderError::Highlighting {
                language: language.to_string(),
                message: "unknown language".to_string(),
            }
        })?;

        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, self.syntax_set, self.class_style);

        for line in LinesWithEndings::from(code) {
            generator
                .parse_html_for_line_which_includes_newline(line)
                .map_err(|err| RenderError::Highlighting {
                    language: language.to_string(),
                    message: err.to_string(),
                })?;
        }

        Ok(generator.finalize())
    }
}

fn find_syntax<'a>(syntax_set: &'a SyntaxSet, token: &str) -> Option<&'a SyntaxReference> {
    let lowercase = token.to_ascii_lowercase();
    syntax_set
        .find_syntax_by_token(&lowercase)
        .or_else(|| syntax_set.find_syntax_by_name(token))
        .or_else(|| syntax_set.find_syntax_by_extension(&lowercase))
}

/// Render a code block inside the fixed highlighting container.
///
/// A highlighter failure is logged and degrades to escaped text; it never
/// aborts the document.
pub(crate) fn render_code_block(
    highlighter: &dyn Highlighter,
    language: Option<&str>,
    code: &str,
) -> String {
    let mut code_with_newline = code.to_string();
    if !code_with_newline.ends_with('\n') {
        code_with_newline.push('\n');
    }

    let body = match language.filter(|lang| highlighter.supports(lang)) {
        Some(lang) => match highlighter.highlight(lang, &code_with_newline) {
            Ok(html) => html,
            Err(err) => {
                tracing::warn!(
                    target = "application::render::highlight",
                    language = lang,
                    error = %err,
                    "Highlighting failed; emitting escaped source"
                );
                ammonia::clean_text(&code_with_newline)
            }
        },
        None => ammonia::clean_text(&code_with_newline),
    };

    format!("<pre class=\"hljs\"><code><div>{body}</div></code></pre>")
}

/// Replaces fenced and indented code blocks with highlighted HTML.
pub(crate) struct CodeBlockStage<'h> {
    highlighter: &'h dyn Highlighter,
}

impl<'h> CodeBlockStage<'h> {
    pub(crate) fn new(highlighter: &'h dyn Highlighter) -> Self {
        Self { highlighter }
    }
}

impl TransformStage for CodeBlockStage<'_> {
    fn name(&self) -> &'static str {
        "code-block"
    }

    fn transform<'a>(
        &self,
        node: &'a AstNode<'a>,
        ctx: &mut RenderContext<'_>,
    ) -> Result<Flow, RenderError> {
        let Some((language, literal)) = code_block_parts(node) else {
            return Ok(Flow::Continue);
        };

        let html = render_code_block(self.highlighter, language.as_deref(), &literal);
        node.data.borrow_mut().value = NodeValue::HtmlBlock(NodeHtmlBlock {
            block_type: 0,
            literal: html,
        });
        ctx.contains_code = true;
        Ok(Flow::Handled)
    }
}

/// Language token (first word of the info string) and literal of a code block.
pub(crate) fn code_block_parts(node: &AstNode<'_>) -> Option<(Option<String>, String)> {
    let data = node.data.borrow();
    if let NodeValue::CodeBlock(block) = &data.value {
        let language = block
            .info
            .split_whitespace()
            .next()
            .map(|lang| lang.to_string());
        Some((language, block.literal.clone()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingHighlighter;

    impl Highlighter for FailingHighlighter {
        fn supports(&self, _language: &str) -> bool {
            true
        }

        fn highlight(&self, language: &str, _code: &str) -> Result<String, RenderError> {
            Err(RenderError::Highlighting {
                language: language.to_string(),
                message: "boom".to_string(),
            })
        }
    }

    #[test]
    fn known_language_is_highlighted() {
        let html = render_code_block(
            &SyntectHighlighter::default(),
            Some("rust"),
            "fn main() {}",
        );
        assert!(html.starts_with("<pre class=\"hljs\"><code><div>"));
        assert!(html.ends_with("</div></code></pre>"));
        assert!(html.contains("syntax-"));
    }

    #[test]
    fn highlighter_failure_falls_back_to_escaped_text() {
        let html = render_code_block(&FailingHighlighter, Some("rust"), "<script>x</script>");
        assert!(html.starts_with("<pre class=\"hljs\"><code><div>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn unknown_language_is_escaped_without_highlighting() {
        let html = render_code_block(
            &SyntectHighlighter::default(),
            Some("no-such-language"),
            "a < b",
        );
        assert!(html.contains("&lt;"));
        assert!(!html.contains("syntax-"));
    }
}
