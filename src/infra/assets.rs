//! Files compiled into the binary: the HTML template, the stylesheets and
//! the browser revision manifest.

use include_dir::{Dir, include_dir};

static BUNDLED_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/assets");

/// Relative path of the page template inside an asset root.
pub const TEMPLATE_PATH: &str = "template.html";
/// Relative path of the Chromium revision manifest.
pub const MANIFEST_PATH: &str = "browser-manifest.toml";
/// Directory holding the stylesheets inside an asset root.
pub const STYLES_DIR: &str = "styles";

/// Bytes of a bundled asset, addressed relative to the asset root.
pub fn bundled_file(path: &str) -> Option<&'static [u8]> {
    let candidate = path.trim_start_matches('/');
    if candidate.is_empty() || candidate.ends_with('/') || candidate.contains("..") {
        // No directory traversal and no directory listings.
        return None;
    }

    BUNDLED_ASSETS.get_file(candidate).map(|file| file.contents())
}

/// A bundled asset decoded as UTF-8.
pub fn bundled_text(path: &str) -> Option<&'static str> {
    bundled_file(path).and_then(|bytes| std::str::from_utf8(bytes).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_and_manifest_are_bundled() {
        let template = bundled_text(TEMPLATE_PATH).expect("template");
        assert!(template.contains("{{{content}}}"));
        assert!(bundled_text(MANIFEST_PATH).is_some());
        assert!(bundled_text("styles/markdown.css").is_some());
    }

    #[test]
    fn traversal_and_directories_are_rejected() {
        assert!(bundled_file("../Cargo.toml").is_none());
        assert!(bundled_file("styles/").is_none());
        assert!(bundled_file("").is_none());
    }
}
