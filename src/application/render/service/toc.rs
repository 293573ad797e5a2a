use std::borrow::Cow;

use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};

use crate::application::render::types::{RenderError, RenderedHeading};

use super::anchors::collect_inline_text;
use super::config::FRONT_MATTER_DELIMITER;
use super::stage::{Flow, RenderContext, TransformStage};

const TOC_PLACEHOLDER: &str = "<!--mdpdf:table-of-contents-->";

/// Insert a `[toc]` marker at the top of the body unless the document
/// already carries one (case-insensitive). A leading front-matter block
/// stays first so the parser still recognises it.
pub fn ensure_toc_marker(text: &str) -> Cow<'_, str> {
    let (front_matter, body) = split_front_matter(text);
    if body.to_ascii_lowercase().contains("[toc]") {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("{front_matter}[toc]\n\n{body}"))
    }
}

/// Split off a front-matter block delimited by lines of exactly
/// [`FRONT_MATTER_DELIMITER`]. Unterminated blocks are body text.
fn split_front_matter(text: &str) -> (&str, &str) {
    let mut lines = text.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return ("", text);
    };
    if first.trim_end() != FRONT_MATTER_DELIMITER {
        return ("", text);
    }

    let mut end = first.len();
    for line in lines {
        end += line.len();
        if line.trim_end() == FRONT_MATTER_DELIMITER {
            return text.split_at(end);
        }
    }
    ("", text)
}

/// Swaps `[toc]` / `[[toc]]` paragraphs for a navigation list of the
/// document's headings.
pub(crate) struct TocStage;

impl TransformStage for TocStage {
    fn name(&self) -> &'static str {
        "table-of-contents"
    }

    fn transform<'a>(
        &self,
        node: &'a AstNode<'a>,
        _ctx: &mut RenderContext<'_>,
    ) -> Result<Flow, RenderError> {
        if !matches!(node.data.borrow().value, NodeValue::Paragraph) {
            return Ok(Flow::Continue);
        }
        if !is_toc_marker(&collect_inline_text(node)) {
            return Ok(Flow::Continue);
        }

        let mut child = node.first_child();
        while let Some(next) = child {
            child = next.next_sibling();
            next.detach();
        }
        node.data.borrow_mut().value = NodeValue::HtmlBlock(NodeHtmlBlock {
            block_type: 0,
            literal: format!("{TOC_PLACEHOLDER}\n"),
        });
        Ok(Flow::Handled)
    }

    fn finish(&self, html: String, ctx: &RenderContext<'_>) -> Result<String, RenderError> {
        if !html.contains(TOC_PLACEHOLDER) {
            return Ok(html);
        }
        Ok(html.replace(TOC_PLACEHOLDER, &build_toc(&ctx.headings)))
    }
}

fn is_toc_marker(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.eq_ignore_ascii_case("[toc]") || trimmed.eq_ignore_ascii_case("[[toc]]")
}

/// Nested ordered list mirroring the heading hierarchy. A heading shallower
/// than the first one closes back to the top level.
fn build_toc(headings: &[RenderedHeading]) -> String {
    let mut html = String::from("<nav class=\"table-of-contents\">");
    let mut open_levels: Vec<u8> = Vec::new();

    for heading in headings {
        match open_levels.last() {
            Some(&top) if heading.level <= top => {
                html.push_str("</li>");
                while open_levels.len() > 1 && open_levels.last().is_some_and(|&l| l > heading.level)
                {
                    html.push_str("</ol></li>");
                    open_levels.pop();
                }
            }
            _ => {
                html.push_str("<ol>");
                open_levels.push(heading.level);
            }
        }
        html.push_str(&format!(
            "<li><a href=\"#{}\">{}</a>",
            heading.anchor,
            ammonia::clean_text(&heading.text)
        ));
    }

    if !open_levels.is_empty() {
        html.push_str("</li>");
        for _ in 1..open_levels.len() {
            html.push_str("</ol></li>");
        }
        html.push_str("</ol>");
    }

    html.push_str("</nav>");
    html
}
