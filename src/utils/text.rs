//! Text normalization for identity derivation and content hashing.
//!
//! Both functions are pure, total, deterministic and idempotent; they never
//! fail on malformed input. Names and content are normalized differently:
//! name identity is case-insensitive, content meaning is not.

use regex::Regex;
use std::sync::OnceLock;

static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();
static BLANK_RUN_RE: OnceLock<Regex> = OnceLock::new();

fn whitespace_re() -> &'static Regex {
    WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("static regex is valid"))
}

fn blank_run_re() -> &'static Regex {
    BLANK_RUN_RE.get_or_init(|| Regex::new(r"\n{3,}").expect("static regex is valid"))
}

/// Whether `c` is a CJK unified ideograph (U+4E00..=U+9FFF).
fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Canonicalize an entry/entity name for identity derivation.
///
/// Lowercases, collapses whitespace runs to a single space, maps full-width
/// CJK punctuation (`：（）【】`) to ASCII equivalents, then drops every
/// character outside {CJK ideographs, ASCII letters/digits, `" :(),.-_"`}
/// (which also discards the mapped square brackets).
///
/// Renames that only change casing or spacing therefore collapse to the same
/// normalized form (and so the same entry id).
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let collapsed = whitespace_re().replace_all(&lowered, " ");
    let trimmed = collapsed.trim();

    let mut result = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        let c = match c {
            '：' => ':',
            '（' => '(',
            '）' => ')',
            '【' => '[',
            '】' => ']',
            other => other,
        };
        if is_cjk(c)
            || c.is_ascii_alphanumeric()
            || matches!(c, ' ' | ':' | '(' | ')' | ',' | '.' | '-' | '_')
        {
            result.push(c);
        }
    }
    result
}

/// Canonicalize entry content before hashing.
///
/// Unifies line endings to `\n`, trims both ends, collapses 3+ consecutive
/// newlines to exactly 2, and maps full-width `：，。` to `:,.`. Case is
/// preserved — unlike names, content meaning depends on it.
pub fn normalize_content(content: &str) -> String {
    let unified = content.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = unified.trim();
    let collapsed = blank_run_re().replace_all(trimmed, "\n\n");

    collapsed
        .chars()
        .map(|c| match c {
            '：' => ':',
            '，' => ',',
            '。' => '.',
            other => other,
        })
        .collect()
}
