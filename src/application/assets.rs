//! Normalisation of image and asset references found in rendered markup.
//!
//! Markdown authors write asset paths in many shapes: relative paths,
//! Windows paths with backslashes, percent-encoded names, `file:` URIs with
//! two or three slashes, values wrapped in stray smart quotes. The browser
//! that prints the document only understands absolute `file:` URIs, so every
//! export type other than HTML has its local references rewritten here.
//!
//! Path arithmetic is done on `/`-separated strings rather than
//! [`std::path::Path`]: a document authored on Windows must resolve the same
//! way regardless of the host running the conversion.

use std::path::Path;

use percent_encoding::percent_decode_str;
use thiserror::Error;

use crate::domain::ExportType;

const FILE_SCHEME: &str = "file:";
const FILE_ROOT: &str = "file:///";
const QUOTE_CHARS: [char; 3] = ['"', '\u{201C}', '\u{201D}'];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("asset reference `{raw}` is not valid percent-encoded UTF-8")]
    Decode { raw: String },
    #[error("asset reference `{raw}` is not a valid URI: {message}")]
    MalformedUri { raw: String, message: String },
}

/// Resolve `raw_src` into the reference the export should embed.
///
/// HTML exports only get the cleaning pass. Every other export type turns
/// local paths into absolute `file:` URIs relative to `document_path`, and
/// leaves remote URLs alone. Applying the function to its own `file:///`
/// output returns the same value.
pub fn resolve(
    raw_src: &str,
    document_path: &Path,
    export_type: ExportType,
) -> Result<String, ResolutionError> {
    let cleaned = clean(raw_src)?;

    if export_type == ExportType::Html {
        return Ok(cleaned);
    }

    match scheme_of(&cleaned) {
        Some(scheme) if scheme.eq_ignore_ascii_case("file") => {
            if starts_with_ignore_case(&cleaned, FILE_ROOT) {
                Ok(cleaned)
            } else {
                Ok(to_triple_slash(&cleaned))
            }
        }
        None => Ok(resolve_local(&cleaned, document_path)),
        Some(_) => url::Url::parse(&cleaned)
            .map(|_| cleaned.clone())
            .map_err(|err| ResolutionError::MalformedUri {
                raw: raw_src.to_string(),
                message: err.to_string(),
            }),
    }
}

/// Decode, drop quote characters, unify separators and guard `#`.
fn clean(raw_src: &str) -> Result<String, ResolutionError> {
    let decoded = percent_decode_str(raw_src)
        .decode_utf8()
        .map_err(|_| ResolutionError::Decode {
            raw: raw_src.to_string(),
        })?;

    let cleaned: String = decoded
        .chars()
        .filter(|ch| !QUOTE_CHARS.contains(ch))
        .map(|ch| if ch == '\\' { '/' } else { ch })
        .collect();

    Ok(guard_fragment(&cleaned))
}

/// `#` would otherwise start a URI fragment and truncate the file name.
fn guard_fragment(value: &str) -> String {
    value.replace('#', "%23")
}

/// The URI scheme of `value`, if any. A lone drive letter (`C:/…`) is a
/// Windows path, not a scheme.
fn scheme_of(value: &str) -> Option<&str> {
    let (candidate, rest) = value.split_once(':')?;
    let mut chars = candidate.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic()
        || !chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
    {
        return None;
    }
    if candidate.len() == 1 && (rest.is_empty() || rest.starts_with('/')) {
        return None;
    }
    Some(candidate)
}

fn to_triple_slash(value: &str) -> String {
    let rest = &value[FILE_SCHEME.len()..];
    let path = rest.trim_start_matches('/');
    format!("{FILE_ROOT}{path}")
}

fn resolve_local(cleaned: &str, document_path: &Path) -> String {
    let document = document_path.to_string_lossy().replace('\\', "/");
    let base_dir = match document.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => document[..idx].to_string(),
        None => String::new(),
    };

    let joined = if is_absolute(cleaned) || base_dir.is_empty() {
        cleaned.to_string()
    } else {
        format!("{}/{cleaned}", base_dir.trim_end_matches('/'))
    };

    let resolved = guard_fragment(&normalize(&joined));

    if resolved.starts_with("//") {
        format!("{FILE_SCHEME}{resolved}")
    } else if resolved.starts_with('/') {
        format!("file://{resolved}")
    } else {
        format!("{FILE_ROOT}{resolved}")
    }
}

fn is_absolute(path: &str) -> bool {
    path.starts_with('/') || has_drive_prefix(path)
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'/')
}

/// Fold `.` and `..` segments and repeated separators. A leading `//` (UNC
/// share) and a drive prefix are kept as roots that `..` cannot climb past.
fn normalize(path: &str) -> String {
    let (root, rest) = if let Some(rest) = path.strip_prefix("//") {
        ("//", rest)
    } else if let Some(rest) = path.strip_prefix('/') {
        ("/", rest)
    } else if has_drive_prefix(path) {
        (&path[..2], path[2..].trim_start_matches('/'))
    } else {
        ("", path)
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else if root.is_empty() {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let body = segments.join("/");
    if has_drive_prefix(root) {
        format!("{root}/{body}")
    } else {
        format!("{root}{body}")
    }
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn posix_doc() -> PathBuf {
        PathBuf::from("/docs/readme.md")
    }

    #[test]
    fn relative_path_becomes_absolute_file_uri() {
        let resolved = resolve("img/a.png", &posix_doc(), ExportType::Pdf).expect("resolve");
        assert_eq!(resolved, "file:///docs/img/a.png");
    }

    #[test]
    fn parent_segments_are_folded() {
        let resolved =
            resolve("../assets/./logo.svg", &posix_doc(), ExportType::Png).expect("resolve");
        assert_eq!(resolved, "file:///assets/logo.svg");
    }

    #[test]
    fn windows_drive_path_is_normalised() {
        let doc = PathBuf::from(r"C:\docs\readme.md");
        let resolved = resolve(r"C:\temp\a.png", &doc, ExportType::Pdf).expect("resolve");
        assert_eq!(resolved, "file:///C:/temp/a.png");
    }

    #[test]
    fn relative_path_under_windows_document() {
        let doc = PathBuf::from(r"C:\docs\readme.md");
        let resolved = resolve(r"img\a.png", &doc, ExportType::Pdf).expect("resolve");
        assert_eq!(resolved, "file:///C:/docs/img/a.png");
    }

    #[test]
    fn unc_path_gets_bare_file_prefix() {
        let resolved =
            resolve(r"\\server\share\a.png", &posix_doc(), ExportType::Pdf).expect("resolve");
        assert_eq!(resolved, "file://server/share/a.png");
    }

    #[test]
    fn double_slash_file_uri_is_rewritten() {
        let resolved =
            resolve("file://C:/temp/a.png", &posix_doc(), ExportType::Pdf).expect("resolve");
        assert_eq!(resolved, "file:///C:/temp/a.png");
    }

    #[test]
    fn resolved_values_are_stable() {
        for raw in ["img/a.png", "/abs/b.png", r"C:\x\c.png", "file:///already/d.png"] {
            let once = resolve(raw, &posix_doc(), ExportType::Pdf).expect("first pass");
            let twice = resolve(&once, &posix_doc(), ExportType::Pdf).expect("second pass");
            assert_eq!(once, twice, "not idempotent for {raw}");
        }
    }

    #[test]
    fn percent_encoding_and_smart_quotes_are_cleaned() {
        let resolved = resolve(
            "\u{201C}my%20image.png\u{201D}",
            &posix_doc(),
            ExportType::Pdf,
        )
        .expect("resolve");
        assert_eq!(resolved, "file:///docs/my image.png");
    }

    #[test]
    fn hash_is_guarded() {
        let resolved = resolve("c#/notes.png", &posix_doc(), ExportType::Pdf).expect("resolve");
        assert_eq!(resolved, "file:///docs/c%23/notes.png");
    }

    #[test]
    fn html_export_only_cleans() {
        let resolved =
            resolve(r"img\a%20b.png", &posix_doc(), ExportType::Html).expect("resolve");
        assert_eq!(resolved, "img/a b.png");
    }

    #[test]
    fn remote_urls_pass_through() {
        let raw = "https://example.com/logo.png";
        let resolved = resolve(raw, &posix_doc(), ExportType::Pdf).expect("resolve");
        assert_eq!(resolved, raw);
    }

    #[test]
    fn data_uris_pass_through() {
        let raw = "data:image/png;base64,AAAA";
        let resolved = resolve(raw, &posix_doc(), ExportType::Jpeg).expect("resolve");
        assert_eq!(resolved, raw);
    }

    #[test]
    fn invalid_utf8_sequence_is_reported() {
        let err = resolve("%FF%FE.png", &posix_doc(), ExportType::Pdf).expect_err("error");
        assert!(matches!(err, ResolutionError::Decode { .. }));
    }

    #[test]
    fn scheme_detection_ignores_drive_letters() {
        assert_eq!(scheme_of("C:/temp"), None);
        assert_eq!(scheme_of("file:///x"), Some("file"));
        assert_eq!(scheme_of("img/a.png"), None);
        assert_eq!(scheme_of("mailto:x@example.com"), Some("mailto"));
    }
}
