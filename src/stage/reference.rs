//! Scanner for `asset://` references in text content.
//!
//! A reference is the case-insensitive marker `asset://` (or `asset:/`) followed by an optional
//! path-like token. The token stops at whitespace, quotes, angle brackets and parentheses, and
//! must end in a word character, `.`, `+`, `/`, or a single parenthesised word group such as
//! `(2x)`, so trailing punctuation in prose (`asset://a.png,`) stays outside the match.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

static REFERENCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\basset:/{1,2}(?P<path>[^'"\s()<>]*(?:\(\w+\)|[.\w+/]))?"#)
        .expect("asset reference pattern compiles")
});

/// One occurrence of a reference in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReference<'t> {
    /// Full matched text, marker included.
    pub raw: &'t str,
    /// Token after the marker; empty for a bare marker.
    pub suffix: &'t str,
    pub range: Range<usize>,
}

impl AssetReference<'_> {
    /// A marker with nothing after it, used to build asset URLs programmatically.
    pub fn is_bare(&self) -> bool {
        self.suffix.is_empty()
    }

    pub fn logical_path(&self, asset_path: &str) -> String {
        format!("{asset_path}{}", self.suffix)
    }
}

/// All references in `text`, in order of appearance.
pub fn scan(text: &str) -> impl Iterator<Item = AssetReference<'_>> {
    REFERENCE_PATTERN.captures_iter(text).filter_map(|caps| {
        let whole = caps.get(0)?;
        Some(AssetReference {
            raw: whole.as_str(),
            suffix: caps.name("path").map(|m| m.as_str()).unwrap_or(""),
            range: whole.range(),
        })
    })
}
