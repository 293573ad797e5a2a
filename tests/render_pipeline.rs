use std::path::{Path, PathBuf};

use mdpdf::application::{
    assets,
    render::{Highlighter, MarkdownRenderer, RenderError, RenderedContent},
    template::{AssetRoot, DEFAULT_STYLES, TemplateComposer},
};
use mdpdf::domain::{ExportType, RenderConfig};

fn fixture_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/docs/showcase.md")
}

fn render_fixture(export_type: ExportType) -> RenderedContent {
    let path = fixture_path();
    let markdown = std::fs::read_to_string(&path).expect("read fixture");
    MarkdownRenderer::new()
        .render(&markdown, &path, &RenderConfig::new(export_type))
        .expect("render fixture")
}

fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

#[test]
fn pdf_render_points_images_at_absolute_file_uris() {
    let content = render_fixture(ExportType::Pdf);
    let logo = fixture_path().with_file_name("img").join("logo.png");
    let expected = format!("src=\"{}\"", file_uri(&logo));

    // Markdown image and raw HTML image.
    assert_eq!(content.html.matches(&expected).count(), 2, "{}", content.html);
    assert!(content.html.contains("width=\"64\""));
}

#[test]
fn html_render_keeps_relative_sources() {
    let content = render_fixture(ExportType::Html);
    assert_eq!(content.html.matches("src=\"img/logo.png\"").count(), 2);
    assert!(!content.html.contains("file://"));
}

#[test]
fn headings_get_unique_anchors_linked_from_toc() {
    let content = render_fixture(ExportType::Html);
    let anchors: Vec<&str> = content
        .headings
        .iter()
        .map(|heading| heading.anchor.as_str())
        .collect();

    assert_eq!(
        anchors,
        [
            "release-notes",
            "tasks",
            "code",
            "math",
            "raw-html",
            "ji-xian-dui-qi",
            "tasks-2",
        ]
    );
    for anchor in anchors {
        assert!(content.html.contains(&format!("id=\"{anchor}\"")));
        assert!(content.html.contains(&format!("href=\"#{anchor}\"")));
    }
    assert_eq!(content.html.matches("table-of-contents").count(), 1);
}

#[test]
fn fixture_features_survive_rendering() {
    let content = render_fixture(ExportType::Pdf);

    assert!(content.contains_code);
    assert!(content.contains_math);
    assert!(!content.contains_diagram);
    assert!(content.html.contains("type=\"checkbox\""));
    assert!(content.html.contains("<table"));
    assert!(content.html.contains("<div class=\"page-break\"></div>"));
    assert!(content.html.contains("class=\"katex-error\""));
    assert!(content.html.contains("&lt;raw&gt;"));
    assert!(content.html.contains("Intro paragraph"));
}

#[test]
fn breaks_flag_turns_soft_breaks_into_br() {
    let path = fixture_path();
    let markdown = std::fs::read_to_string(&path).expect("read fixture");
    let config = RenderConfig {
        breaks: true,
        ..RenderConfig::new(ExportType::Html)
    };

    let content = MarkdownRenderer::new()
        .render(&markdown, &path, &config)
        .expect("render");
    assert!(content.html.contains("<br />"));
}

#[test]
fn existing_toc_marker_is_not_duplicated() {
    let content = MarkdownRenderer::new()
        .render(
            "# One\n\n[[TOC]]\n\n## Two\n",
            Path::new("/docs/readme.md"),
            &RenderConfig::new(ExportType::Html),
        )
        .expect("render");

    assert_eq!(content.html.matches("table-of-contents").count(), 1);
    let heading = content.html.find("<h1").expect("h1");
    let toc = content.html.find("table-of-contents").expect("toc");
    assert!(heading < toc);
}

struct AlwaysFails;

impl Highlighter for AlwaysFails {
    fn supports(&self, _language: &str) -> bool {
        true
    }

    fn highlight(&self, language: &str, _code: &str) -> Result<String, RenderError> {
        Err(RenderError::Highlighting {
            language: language.to_string(),
            message: "highlighter unavailable".to_string(),
        })
    }
}

#[test]
fn highlighter_failure_degrades_to_escaped_code() {
    let content = MarkdownRenderer::new()
        .with_highlighter(AlwaysFails)
        .render(
            "```rust\nlet x = 1 < 2;\n```\n",
            Path::new("/docs/readme.md"),
            &RenderConfig::new(ExportType::Pdf),
        )
        .expect("render does not abort");

    assert!(content.html.contains("<pre class=\"hljs\"><code><div>"));
    assert!(content.html.contains("&lt;"));
    assert!(content.html.contains("</div></code></pre>"));
}

#[test]
fn windows_document_paths_resolve_to_triple_slash_uris() {
    let resolved = assets::resolve(
        "C:\\temp\\a.png",
        Path::new("C:\\docs\\readme.md"),
        ExportType::Pdf,
    )
    .expect("resolve");
    assert_eq!(resolved, "file:///C:/temp/a.png");
    assert_eq!(
        assets::resolve(&resolved, Path::new("C:\\docs\\readme.md"), ExportType::Pdf)
            .expect("resolve again"),
        resolved
    );
}

#[test]
fn composed_page_wraps_rendered_fixture() {
    let content = render_fixture(ExportType::Pdf);
    let composer = TemplateComposer::new(AssetRoot::Bundled).expect("composer");

    let page = composer.compose(&content.html, "showcase.md", &DEFAULT_STYLES);
    assert!(page.final_html.starts_with("<!DOCTYPE html>"));
    assert!(page.final_html.contains("<title>showcase.md</title>"));
    assert!(page.final_html.contains(&content.html));
    assert_eq!(page.final_html.matches("<style>").count(), DEFAULT_STYLES.len());

    let bare = composer.compose("<p>body</p>", "t", &[]);
    assert!(bare.final_html.contains("<p>body</p>"));
    assert!(!bare.final_html.contains("<style>"));
    assert!(bare.style_block.is_empty());
    assert_eq!(bare.body_html, "<p>body</p>");
}
