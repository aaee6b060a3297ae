//! Semantic-similarity judge abstraction.
//!
//! The judge is the engine's only external suspension point: Tier 3 of the
//! deduplication pipeline delegates borderline entity comparisons to it.
//! Callers treat any judge failure as "not similar" (fail open).
//!
//! # Implementations
//! - [`openai::OpenAiJudge`] — OpenAI chat completions via `async-openai`.

pub mod openai;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// The judge's answer for one pair of entity descriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SimilarityVerdict {
    /// Whether the two descriptions denote the same entity.
    pub is_similar: bool,
    /// Similarity in `[0.0, 1.0]`.
    pub similarity_score: f64,
    /// Free-form justification, kept for audit logging.
    pub reasoning: String,
}

/// Trait for external semantic-similarity judges.
#[allow(async_fn_in_trait)]
pub trait SimilarityJudge: Send + Sync {
    /// Compare two entity descriptions.
    async fn similarity_check(&self, text_a: &str, text_b: &str) -> Result<SimilarityVerdict>;
}

/// Placeholder judge for engines running without a configured LLM; every
/// call errors, which Tier 3 treats as "not similar".
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJudge;

impl SimilarityJudge for NoJudge {
    async fn similarity_check(&self, _text_a: &str, _text_b: &str) -> Result<SimilarityVerdict> {
        Err(crate::errors::JudgeError::EmptyResponse.into())
    }
}
