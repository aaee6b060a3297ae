//! Identity and content-hash derivation.
//!
//! Entry ids are derived from entry kind plus normalized name, so surface
//! variations (casing, spacing, full-width punctuation) collapse to one
//! identity. Content hashes are MD5 over normalized content — a
//! change-detection fingerprint, not a security boundary.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::text::{normalize_content, normalize_name};
use crate::models::EntryKind;

/// Derive the stable entry id: `<kind>:<normalize_name(name)>`.
pub fn entry_id(kind: &EntryKind, name: &str) -> String {
    format!("{}:{}", kind.as_str(), normalize_name(name))
}

/// MD5 hex digest of the normalized content.
///
/// Two contents that normalize identically (e.g. `"A\r\nB"` and `"A\nB"`)
/// hash identically.
pub fn content_hash(content: &str) -> String {
    let mut h = Md5::new();
    h.update(normalize_content(content).as_bytes());
    format!("{:x}", h.finalize())
}

/// Character-set Jaccard similarity between two strings.
///
/// Returns a value in `[0.0, 1.0]`; `0.0` when the union of character sets
/// is empty (both strings empty).
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let set_a: BTreeSet<char> = a.chars().collect();
    let set_b: BTreeSet<char> = b.chars().collect();

    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();

    intersection as f64 / union as f64
}

/// First index at which two sequences differ.
///
/// If one sequence is an exact prefix of the other, returns the length of
/// the shorter one. Returns `None` when the sequences are identical.
pub fn first_diff_index<T: PartialEq>(a: &[T], b: &[T]) -> Option<usize> {
    let min_len = a.len().min(b.len());

    for i in 0..min_len {
        if a[i] != b[i] {
            return Some(i);
        }
    }

    if a.len() != b.len() {
        return Some(min_len);
    }

    None
}

/// Multi-level content hashes: exact (normalized text) plus structural
/// (layout shape with line contents erased).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHashes {
    pub exact: String,
    pub structural: String,
}

/// Compute both hash levels for a content blob.
pub fn content_hashes(content: &str) -> ContentHashes {
    let mut h = Md5::new();
    h.update(structural_fingerprint(content).as_bytes());

    ContentHashes {
        exact: content_hash(content),
        structural: format!("{:x}", h.finalize()),
    }
}

/// Reduce content to its structural shape, erasing line contents.
///
/// Markdown headings keep their `#` run, list items become `-`, blank lines
/// stay blank, and every other line becomes `text`. Two entries that only
/// reword their prose produce the same structural fingerprint.
pub fn structural_fingerprint(content: &str) -> String {
    content
        .split('\n')
        .map(|line| {
            let trimmed = line.trim_start();
            let hashes = line.chars().take_while(|&c| c == '#').count();
            if hashes > 0 && hashes <= 6 && line[hashes..].starts_with(' ') {
                "#".repeat(hashes)
            } else if matches!(trimmed.chars().next(), Some('-' | '*' | '+'))
                && trimmed.chars().nth(1) == Some(' ')
            {
                "-".to_string()
            } else if line.trim().is_empty() {
                String::new()
            } else {
                "text".to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
