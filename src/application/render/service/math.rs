use comrak::{
    nodes::{AstNode, NodeHtmlBlock, NodeValue},
    options::Options,
};
use katex::{OptsBuilder, OutputType};
use tracing::warn;

use crate::application::render::types::RenderError;

use super::highlight::code_block_parts;
use super::stage::{Flow, RenderContext, TransformStage};

/// Render a KaTeX expression to HTML.
pub(crate) fn render_math_html(literal: &str, display_mode: bool) -> Result<String, RenderError> {
    let mut builder = OptsBuilder::default();
    builder.display_mode(display_mode);
    builder.output_type(OutputType::Html);
    builder.throw_on_error(true);

    let opts = builder.build().map_err(|err| RenderError::Document {
        message: format!("failed to build KaTeX options: {err}"),
    })?;

    katex::render_with_opts(literal, opts).map_err(|err| RenderError::Document {
        message: format!("KaTeX rendering failed: {err}"),
    })
}

/// `$inline$`, `$$display$$` and ```` ```math ```` fences rendered with
/// KaTeX. Expressions KaTeX rejects are kept as escaped source so the author
/// can spot them.
pub(crate) struct MathStage;

impl TransformStage for MathStage {
    fn name(&self) -> &'static str {
        "math"
    }

    fn extend_options(&self, options: &mut Options<'static>) {
        options.extension.math_dollars = true;
        options.extension.math_code = true;
    }

    fn transform<'a>(
        &self,
        node: &'a AstNode<'a>,
        ctx: &mut RenderContext<'_>,
    ) -> Result<Flow, RenderError> {
        let math = {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::Math(math) => Some((math.literal.clone(), math.display_math)),
                _ => None,
            }
        };
        let Some((literal, display_mode)) = math.or_else(|| math_fence(node)) else {
            return Ok(Flow::Continue);
        };

        let html = match render_math_html(&literal, display_mode) {
            Ok(html) if display_mode => format!("<div class=\"katex-block\">{html}</div>"),
            Ok(html) => html,
            Err(err) => {
                warn!(
                    target = "application::render::math",
                    document = %ctx.document_path.display(),
                    "KaTeX rendering failed: {err}"
                );
                let escaped = ammonia::clean_text(&literal);
                format!("<code class=\"katex-error\">{escaped}</code>")
            }
        };

        let mut data = node.data.borrow_mut();
        data.value = if display_mode {
            NodeValue::HtmlBlock(NodeHtmlBlock {
                block_type: 0,
                literal: html,
            })
        } else {
            NodeValue::HtmlInline(html)
        };
        ctx.contains_math = true;
        Ok(Flow::Handled)
    }
}

/// Literal of a fenced block tagged `math`, always display mode.
fn math_fence(node: &AstNode<'_>) -> Option<(String, bool)> {
    match code_block_parts(node)? {
        (Some(language), literal) if language == "math" => Some((literal, true)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_inline_expression() {
        let html = render_math_html("a^2", false).expect("katex");
        assert!(html.contains("class=\"katex"));
    }

    #[test]
    fn rejects_invalid_expression() {
        assert!(render_math_html("\\frac{", true).is_err());
    }
}
