//! Wraps rendered markdown in the page template with inlined stylesheets.

use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};

use crate::infra::assets::{self, STYLES_DIR, TEMPLATE_PATH};

/// Stylesheets inlined into every page, in cascade order.
pub const DEFAULT_STYLES: [&str; 4] = [
    "arduino-light.css",
    "katex.min.css",
    "markdown.css",
    "markdown-pdf.css",
];

const TITLE_TOKEN: &str = "{{title}}";
const STYLE_TOKEN: &str = "{{{style}}}";
const CONTENT_TOKEN: &str = "{{{content}}}";

/// Where the template and stylesheets are read from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AssetRoot {
    /// The copy compiled into the binary.
    #[default]
    Bundled,
    /// A directory laid out like the bundled assets (`template.html`,
    /// `styles/*.css`).
    Directory(PathBuf),
}

impl AssetRoot {
    /// Read a file relative to the root. Absent or unreadable files yield
    /// `None`.
    pub fn read_text(&self, relative: &str) -> Option<String> {
        match self {
            AssetRoot::Bundled => assets::bundled_text(relative).map(str::to_string),
            AssetRoot::Directory(dir) => read_optional(&dir.join(relative)),
        }
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("no page template found under {root:?}")]
    MissingTemplate { root: AssetRoot },
}

/// A complete HTML page, ready for the export backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedDocument {
    pub title: String,
    /// Concatenated `<style>` elements; empty when no stylesheet was found.
    pub style_block: String,
    pub body_html: String,
    pub final_html: String,
}

#[derive(Debug, Clone)]
pub struct TemplateComposer {
    root: AssetRoot,
    template: String,
}

impl TemplateComposer {
    /// Load the page template from `root`. A directory without
    /// `template.html` falls back to the bundled template.
    pub fn new(root: AssetRoot) -> Result<Self, TemplateError> {
        let template = match root.read_text(TEMPLATE_PATH) {
            Some(template) => template,
            None => {
                if let AssetRoot::Directory(dir) = &root {
                    info!(
                        target = "application::template",
                        assets_dir = %dir.display(),
                        "No template in asset directory; using bundled template"
                    );
                }
                assets::bundled_text(TEMPLATE_PATH)
                    .map(str::to_string)
                    .ok_or_else(|| TemplateError::MissingTemplate { root: root.clone() })?
            }
        };

        Ok(Self { root, template })
    }

    pub fn root(&self) -> &AssetRoot {
        &self.root
    }

    /// Fill the template. Style sources are names under `styles/` or
    /// absolute paths; missing ones contribute nothing.
    pub fn compose(&self, body_html: &str, title: &str, style_sources: &[&str]) -> ComposedDocument {
        let style_block: String = style_sources
            .iter()
            .map(|source| make_css(self.read_style(source)))
            .collect();
        let escaped_title = ammonia::clean_text(title);
        let final_html = substitute(&self.template, &escaped_title, &style_block, body_html);

        ComposedDocument {
            title: title.to_string(),
            style_block,
            body_html: body_html.to_string(),
            final_html,
        }
    }

    /// [`Self::compose`] with [`DEFAULT_STYLES`].
    pub fn compose_default(&self, body_html: &str, title: &str) -> ComposedDocument {
        self.compose(body_html, title, &DEFAULT_STYLES)
    }

    fn read_style(&self, source: &str) -> Option<String> {
        let path = Path::new(source);
        if path.is_absolute() {
            return read_optional(path);
        }
        self.root.read_text(&format!("{STYLES_DIR}/{source}"))
    }
}

fn make_css(css: Option<String>) -> String {
    match css {
        Some(css) if !css.is_empty() => format!("\n<style>\n{css}\n</style>\n"),
        _ => String::new(),
    }
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(err) => {
            debug!(
                target = "application::template",
                path = %path.display(),
                error = %err,
                "Asset not readable; skipping"
            );
            None
        }
    }
}

/// Single pass over the template so token-like text inside the inserted
/// values is never substituted again.
fn substitute(template: &str, title: &str, style: &str, content: &str) -> String {
    let tokens = [
        (STYLE_TOKEN, style),
        (CONTENT_TOKEN, content),
        (TITLE_TOKEN, title),
    ];

    let mut output = String::with_capacity(template.len() + style.len() + content.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tokens.iter().find(|(token, _)| tail.starts_with(token)) {
            Some((token, value)) => {
                output.push_str(value);
                rest = &tail[token.len()..];
            }
            None => {
                output.push_str("{{");
                rest = &tail[2..];
            }
        }
    }
    output.push_str(rest);
    output
}
