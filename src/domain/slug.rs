//! Heading anchor generation.
//!
//! Anchors are ASCII slugs (`slug` crate). Chinese characters are
//! transliterated first (`pinyin` crate) so a heading like “基线对齐” still
//! produces a readable anchor (`ji-xian-dui-qi`) instead of an empty one.

use std::collections::{HashMap, HashSet};

use pinyin::{Pinyin, ToPinyin};
use slug::slugify;
use thiserror::Error;

/// Anchor used when a heading yields no slug characters at all.
pub const FALLBACK_ANCHOR: &str = "section";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
}

/// Derive a slug from human-readable text.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(transliterate_to_ascii(input));
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Hands out anchors that are unique within one document.
///
/// Repeated headings receive monotonic suffixes in document order
/// (`overview`, `overview-2`, `overview-3`). A suffix already taken by
/// another heading is skipped. Headings that cannot be slugified share the
/// [`FALLBACK_ANCHOR`] sequence.
#[derive(Default, Debug)]
pub struct AnchorSlugger {
    occurrences: HashMap<String, usize>,
    issued: HashSet<String>,
}

impl AnchorSlugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anchor_for(&mut self, heading: &str) -> String {
        let base = derive_slug(heading).unwrap_or_else(|_| FALLBACK_ANCHOR.to_string());
        let count = self.occurrences.entry(base.clone()).or_insert(0);
        loop {
            *count += 1;
            let candidate = if *count == 1 {
                base.clone()
            } else {
                format!("{base}-{count}")
            };
            if self.issued.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

fn transliterate_to_ascii(input: &str) -> String {
    let mut output = String::with_capacity(input.len());

    for ch in input.chars() {
        if ch.is_ascii() {
            output.push(ch);
            continue;
        }

        match ch.to_pinyin() {
            Some(py) => append_pinyin(&mut output, py),
            None if ch.is_whitespace() => output.push(' '),
            // Leave it to slugify, which folds accents and drops the rest.
            None => output.push(ch),
        }
    }

    output
}

fn append_pinyin(buffer: &mut String, pinyin: Pinyin) {
    if !buffer.is_empty() && !buffer.ends_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(pinyin.plain());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_slug_transliterates_chinese() {
        let slug = derive_slug("Rust 基础教程").expect("slug");
        assert_eq!(slug, "rust-ji-chu-jiao-cheng");
    }

    #[test]
    fn derive_slug_rejects_blank_input() {
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
    }

    #[test]
    fn anchor_slugger_suffixes_duplicates() {
        let mut slugger = AnchorSlugger::new();

        assert_eq!(slugger.anchor_for("Overview"), "overview");
        assert_eq!(slugger.anchor_for("Overview"), "overview-2");
        assert_eq!(slugger.anchor_for("深入理解"), "shen-ru-li-jie");
    }

    #[test]
    fn anchor_slugger_skips_suffixes_taken_by_other_headings() {
        let mut slugger = AnchorSlugger::new();

        assert_eq!(slugger.anchor_for("Overview"), "overview");
        assert_eq!(slugger.anchor_for("Overview"), "overview-2");
        assert_eq!(slugger.anchor_for("Overview 2"), "overview-2-2");
        assert_eq!(slugger.anchor_for("Overview"), "overview-3");
    }

    #[test]
    fn anchor_slugger_falls_back_for_symbol_headings() {
        let mut slugger = AnchorSlugger::new();

        assert_eq!(slugger.anchor_for("???"), FALLBACK_ANCHOR);
        assert_eq!(slugger.anchor_for(""), "section-2");
    }
}
