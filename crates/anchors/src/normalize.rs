use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use trialmap_protocol::ContentKind;

fn outline_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:\d+(?:[.\-]\d+)*[.)]?|[ivxlcdm]+[.)]|[a-z][.)])\s+")
            .expect("outline numbering regex is valid")
    })
}

/// Collapse every whitespace run (including non-breaking spaces) into one space.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop leading outline numbering such as `4.`, `5.2.1`, `IV.` or `b)`.
#[must_use]
pub fn strip_outline_number(text: &str) -> &str {
    let trimmed = text.trim_start();
    match outline_number_re().find(trimmed) {
        Some(m) if m.end() < trimmed.len() => &trimmed[m.end()..],
        _ => trimmed,
    }
}

/// Matching form used by every classifier and scorer: lowercase, punctuation
/// folded to spaces, whitespace collapsed.
#[must_use]
pub fn normalize_for_matching(text: &str) -> String {
    let folded: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_whitespace(&folded.to_lowercase())
}

/// [`normalize_for_matching`] after dropping outline numbering. Used for headings
/// and structural path segments.
#[must_use]
pub fn normalize_heading(text: &str) -> String {
    normalize_for_matching(strip_outline_number(text))
}

/// Text fed into the content hash. Headings lose their numbering so a renumbered
/// section keeps its hash.
#[must_use]
pub fn hash_basis(kind: ContentKind, text: &str) -> String {
    let collapsed = collapse_whitespace(text);
    if kind.is_heading() {
        collapse_whitespace(strip_outline_number(&collapsed))
    } else {
        collapsed
    }
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[must_use]
pub fn content_hash(kind: ContentKind, text: &str) -> String {
    sha256_hex(hash_basis(kind, text).as_bytes())
}

/// Rough token estimate: ~4 chars per token.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}
