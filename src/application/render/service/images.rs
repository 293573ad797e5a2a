use std::{cell::RefCell, path::Path, rc::Rc};

use comrak::nodes::{AstNode, NodeValue};
use lol_html::{RewriteStrSettings, element, rewrite_str};
use tracing::warn;

use crate::application::{assets, render::types::RenderError};
use crate::domain::ExportType;

use super::stage::{Flow, RenderContext, TransformStage};

/// Routes the URL of every markdown image through the asset resolver.
pub(crate) struct ImageSourceStage;

impl TransformStage for ImageSourceStage {
    fn name(&self) -> &'static str {
        "image-source"
    }

    fn transform<'a>(
        &self,
        node: &'a AstNode<'a>,
        ctx: &mut RenderContext<'_>,
    ) -> Result<Flow, RenderError> {
        let mut data = node.data.borrow_mut();
        if let NodeValue::Image(link) = &mut data.value {
            if let Some(resolved) = resolve_or_keep(&link.url, ctx.document_path, ctx.export_type)
            {
                link.url = resolved;
            }
        }
        Ok(Flow::Continue)
    }
}

/// Rewrites `<img src>` inside raw HTML. Only installed for exports that
/// are opened from a temporary location, where relative paths would break.
pub(crate) struct RawHtmlImageStage;

impl TransformStage for RawHtmlImageStage {
    fn name(&self) -> &'static str {
        "raw-html-image"
    }

    fn transform<'a>(
        &self,
        node: &'a AstNode<'a>,
        ctx: &mut RenderContext<'_>,
    ) -> Result<Flow, RenderError> {
        let mut data = node.data.borrow_mut();
        let literal = match &mut data.value {
            NodeValue::HtmlBlock(block) => &mut block.literal,
            NodeValue::HtmlInline(literal) => literal,
            _ => return Ok(Flow::Continue),
        };
        if !literal.to_ascii_lowercase().contains("<img") {
            return Ok(Flow::Continue);
        }

        *literal = rewrite_img_sources(literal, ctx.document_path, ctx.export_type)?;
        Ok(Flow::Handled)
    }
}

fn rewrite_img_sources(
    html: &str,
    document_path: &Path,
    export_type: ExportType,
) -> Result<String, RenderError> {
    let rewritten = Rc::new(RefCell::new(0usize));

    let output = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img[src]", {
                let rewritten = Rc::clone(&rewritten);
                move |el| {
                    let Some(src) = el.get_attribute("src") else {
                        return Ok(());
                    };
                    if let Some(resolved) = resolve_or_keep(&src, document_path, export_type) {
                        el.set_attribute("src", &resolved)?;
                        *rewritten.borrow_mut() += 1;
                    }
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::rewrite("raw-html-image", err))?;

    tracing::debug!(
        target = "application::render::images",
        document = %document_path.display(),
        rewritten = *rewritten.borrow(),
        "Rewrote raw HTML image sources"
    );

    Ok(output)
}

fn resolve_or_keep(raw: &str, document_path: &Path, export_type: ExportType) -> Option<String> {
    match assets::resolve(raw, document_path, export_type) {
        Ok(resolved) => Some(resolved),
        Err(err) => {
            warn!(
                target = "application::render::images",
                document = %document_path.display(),
                src = raw,
                error = %err,
                "Failed to resolve asset path; keeping original"
            );
            None
        }
    }
}
