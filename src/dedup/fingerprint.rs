//! Tier 1: locality-sensitive text fingerprints.
//!
//! A fingerprint is the set of character k-shingles over an entity's
//! normalized key text. Near-identical texts produce highly overlapping
//! shingle sets, so set Jaccard is a fast duplicate signal.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::Entry;

/// Descriptive property keys folded into the fingerprint text.
const KEY_PROPERTIES: [&str; 5] = ["description", "title", "label", "type", "category"];

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Normalize text for fingerprinting: lowercase, collapse whitespace, and
/// drop punctuation while keeping CJK ideographs and ASCII alphanumerics.
pub fn normalize_for_fingerprint(text: &str) -> String {
    let lowered = text.to_lowercase();
    let collapsed = whitespace_re().replace_all(&lowered, " ");
    collapsed
        .chars()
        .filter(|&c| {
            c.is_ascii_alphanumeric() || c == ' ' || ('\u{4e00}'..='\u{9fff}').contains(&c)
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Concatenate the fields that identify an entity: name, kind, and the
/// descriptive properties listed in [`KEY_PROPERTIES`].
pub fn entity_key_text(entry: &Entry) -> String {
    let mut parts = vec![entry.name.clone(), entry.kind.as_str().to_string()];
    for key in KEY_PROPERTIES {
        if let Some(value) = entry.properties.get(key) {
            if !value.is_empty() {
                parts.push(value.clone());
            }
        }
    }
    parts.join(" ")
}

/// Build the k-shingle set of the normalized text.
///
/// Texts shorter than `shingle_size` yield a single shingle containing the
/// whole text, so short names still compare meaningfully.
pub fn shingle_set(text: &str, shingle_size: usize) -> BTreeSet<String> {
    let normalized = normalize_for_fingerprint(text);
    let chars: Vec<char> = normalized.chars().collect();

    let mut shingles = BTreeSet::new();
    if chars.is_empty() {
        return shingles;
    }
    if chars.len() <= shingle_size {
        shingles.insert(chars.iter().collect());
        return shingles;
    }
    for window in chars.windows(shingle_size) {
        shingles.insert(window.iter().collect());
    }
    shingles
}

/// Jaccard similarity between two shingle sets; `0.0` when the union is empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / union as f64
}

/// Fingerprint similarity between two entities' key texts.
pub fn fingerprint_similarity(a: &Entry, b: &Entry, shingle_size: usize) -> f64 {
    let set_a = shingle_set(&entity_key_text(a), shingle_size);
    let set_b = shingle_set(&entity_key_text(b), shingle_size);
    jaccard(&set_a, &set_b)
}
