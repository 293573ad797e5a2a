use std::{cell::RefCell, rc::Rc};

use comrak::{
    nodes::{AstNode, NodeValue},
    options::Options,
};
use lol_html::{RewriteStrSettings, element, rewrite_str};

use crate::application::render::types::{RenderError, RenderedHeading};

use super::stage::{Flow, RenderContext, TransformStage};

const MARKDOWN_HEADINGS: &str = "h1[data-sourcepos], h2[data-sourcepos], h3[data-sourcepos], \
     h4[data-sourcepos], h5[data-sourcepos], h6[data-sourcepos]";

/// Gives every markdown heading a unique anchor id.
///
/// Source positions are switched on so markdown headings can be told apart
/// from headings written as raw HTML, which keep whatever id they carry.
pub(crate) struct HeadingAnchorStage;

impl TransformStage for HeadingAnchorStage {
    fn name(&self) -> &'static str {
        "heading-anchor"
    }

    fn extend_options(&self, options: &mut Options<'static>) {
        options.render.sourcepos = true;
    }

    fn transform<'a>(
        &self,
        node: &'a AstNode<'a>,
        ctx: &mut RenderContext<'_>,
    ) -> Result<Flow, RenderError> {
        let level = match &node.data.borrow().value {
            NodeValue::Heading(heading) => heading.level,
            _ => return Ok(Flow::Continue),
        };

        let text = collect_inline_text(node);
        let anchor = ctx.slugger.anchor_for(&text);
        ctx.headings.push(RenderedHeading {
            level,
            anchor,
            text,
        });
        Ok(Flow::Continue)
    }

    fn finish(&self, html: String, ctx: &RenderContext<'_>) -> Result<String, RenderError> {
        apply_heading_ids(&html, &ctx.headings)
    }
}

fn apply_heading_ids(html: &str, headings: &[RenderedHeading]) -> Result<String, RenderError> {
    let headings_shared = Rc::new(headings.to_vec());
    let index = Rc::new(RefCell::new(0usize));
    let error_slot = Rc::new(RefCell::new(None));

    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(MARKDOWN_HEADINGS, {
                    let headings_shared = Rc::clone(&headings_shared);
                    let index = Rc::clone(&index);
                    let error_slot = Rc::clone(&error_slot);
                    move |el| {
                        let mut idx = index.borrow_mut();
                        let Some(info) = headings_shared.get(*idx) else {
                            *error_slot.borrow_mut() = Some(RenderError::Rewrite {
                                stage: "heading-anchor",
                                message: "more headings in output than in source".to_string(),
                            });
                            return Ok(());
                        };
                        *idx += 1;

                        let tag_name = el.tag_name();
                        if tag_name != format!("h{}", info.level) {
                            *error_slot.borrow_mut() = Some(RenderError::Rewrite {
                                stage: "heading-anchor",
                                message: format!(
                                    "heading level mismatch: expected h{}, found {tag_name}",
                                    info.level
                                ),
                            });
                            return Ok(());
                        }

                        el.set_attribute("id", &info.anchor)?;
                        Ok(())
                    }
                }),
                element!("[data-sourcepos]", |el| {
                    el.remove_attribute("data-sourcepos");
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::rewrite("heading-anchor", err))?;

    if let Some(err) = error_slot.borrow_mut().take() {
        return Err(err);
    }

    Ok(rewritten)
}

/// Plain text of a node's inline children, with line breaks collapsed to
/// spaces.
pub(crate) fn collect_inline_text(node: &AstNode<'_>) -> String {
    fn walk(node: &AstNode<'_>, buffer: &mut String) {
        {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::Text(text) => buffer.push_str(text),
                NodeValue::Code(code) => buffer.push_str(&code.literal),
                NodeValue::LineBreak | NodeValue::SoftBreak => buffer.push(' '),
                _ => {}
            }
        }
        let mut child = node.first_child();
        while let Some(next) = child {
            walk(next, buffer);
            child = next.next_sibling();
        }
    }

    let mut text = String::new();
    let mut child = node.first_child();
    while let Some(next) = child {
        walk(next, &mut text);
        child = next.next_sibling();
    }
    text
}
