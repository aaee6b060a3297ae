//! Three-tier entity deduplication.
//!
//! Before an "added" entity is committed, the engine decides whether it
//! already exists under a different surface form:
//!
//! 1. **Fingerprint** — shingle-set Jaccard over key text, catches
//!    near-identical re-parses cheaply.
//! 2. **Feature** — weighted comparison of name, kind, and properties.
//! 3. **Semantic** — an external judge for the ambiguous remainder, with
//!    timeout and fail-open error handling.
//!
//! Relationships get a single-tier structural comparison; they never reach
//! the judge.

mod engine;
mod feature;
mod fingerprint;

pub use engine::DeduplicationEngine;
pub use feature::{feature_similarity, relationship_similarity, EntityFeatures, RelationshipCandidate};
pub use fingerprint::{entity_key_text, fingerprint_similarity, jaccard, shingle_set};

use serde::{Deserialize, Serialize};

/// Which tier produced a deduplication verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupLevel {
    Fingerprint,
    Feature,
    Llm,
    Relationship,
    None,
}

/// Outcome of one deduplication check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicationResult {
    pub is_duplicate: bool,
    pub similarity_score: f64,
    pub level: DedupLevel,
    pub reason: String,
    pub matched_entity_id: Option<String>,
    pub confidence: f64,
}

impl DeduplicationResult {
    pub(crate) fn not_duplicate(level: DedupLevel, reason: impl Into<String>) -> Self {
        Self {
            is_duplicate: false,
            similarity_score: 0.0,
            level,
            reason: reason.into(),
            matched_entity_id: None,
            confidence: 0.0,
        }
    }
}
