//! Turning untrusted attachment names into safe, unique file names.

use chrono::{DateTime, Utc};

/// Characters that are illegal on at least one common filesystem.
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Longest stem (name without extension) we keep, in characters.
const MAX_STEM_CHARS: usize = 150;

/// Stem used when nothing usable survives sanitization.
const DEFAULT_STEM: &str = "attachment";

/// Sanitize a declared attachment filename.
///
/// - `<>:"/\|?*`, control characters and whitespace become `_`
/// - runs of `_` collapse to one, leading/trailing `_` are trimmed
/// - with `extension`, the name is forced to end in `.{extension}` (lower-case)
/// - an empty result falls back to `attachment[.{extension}]`
pub fn sanitize_filename(name: &str, extension: Option<&str>) -> String {
    let mut cleaned = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if ILLEGAL_CHARS.contains(&c) || c.is_control() || c.is_whitespace() {
            '_'
        } else {
            c
        };
        if c == '_' && cleaned.ends_with('_') {
            continue;
        }
        cleaned.push(c);
    }
    let cleaned = cleaned.trim_matches('_');

    let ext = extension
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty());

    let stem = match &ext {
        Some(ext) => strip_suffix_ignore_case(cleaned, &format!(".{ext}")).unwrap_or(cleaned),
        None => cleaned,
    };
    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
    let stem = stem.trim_end_matches('_');
    let stem = if stem.chars().all(|c| c == '.') {
        DEFAULT_STEM
    } else {
        stem
    };

    match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

/// Name under which an attachment is stored:
/// `{prefix}-{UTC timestamp with microseconds}-{sanitized}`.
pub fn stored_name(prefix: &str, at: DateTime<Utc>, sanitized: &str) -> String {
    format!("{prefix}-{}-{sanitized}", at.format("%Y-%m-%dT%H-%M-%S-%6fZ"))
}

/// Name for an attachment that declared none (unrestricted mode only).
pub fn placeholder_name(index: usize) -> String {
    format!("{DEFAULT_STEM}-{index}")
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let split = s.len().checked_sub(suffix.len())?;
    if !s.is_char_boundary(split) {
        return None;
    }
    let (head, tail) = s.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}
