//! Write-path text normalization helpers.
//!
//! # Responsibility
//! - Strip markup from free-text fields before persistence.
//! - Normalize entity names to a canonical stored form.
//!
//! # Invariants
//! - Stored names are trimmed and lowercase; display capitalizes the first
//!   character only.

use once_cell::sync::Lazy;
use regex::Regex;

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Removes markup tags and collapses whitespace in free-text input.
pub fn sanitize_text(value: &str) -> String {
    let without_tags = HTML_TAG_RE.replace_all(value, " ");
    WHITESPACE_RE
        .replace_all(&without_tags, " ")
        .trim()
        .to_string()
}

/// Canonical stored form for principal/team/project/task names.
pub fn normalize_name(value: &str) -> String {
    value.trim().to_lowercase()
}

/// User-facing rendering of a stored name.
pub fn display_name(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
