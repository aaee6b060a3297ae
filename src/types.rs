//! Shared configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

fn validate_unit_interval(v: f64) -> Result<(), validator::ValidationError> {
    if !(0.0..=1.0).contains(&v) {
        return Err(validator::ValidationError::new(
            "threshold must be within [0, 1]",
        ));
    }
    Ok(())
}

/// Thresholds and trigger constants for the deduplication engine.
///
/// Defaults mirror the tier contract: Tier-1 fingerprint 0.95/0.80, Tier-2
/// feature 0.85/0.70, Tier-3 judge 0.75 with the [0.6, 0.8] ambiguity band.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DedupConfig {
    /// Character shingle length for Tier-1 fingerprints.
    pub shingle_size: usize,

    /// Tier-1 similarity above which a candidate is a confident duplicate.
    #[validate(custom(function = "validate_unit_interval"))]
    pub fingerprint_exact: f64,

    /// Tier-1 best-overall similarity above which a candidate is a duplicate
    /// at that (lower) confidence.
    #[validate(custom(function = "validate_unit_interval"))]
    pub fingerprint_near: f64,

    /// Tier-2 feature score above which a candidate is a confident duplicate.
    #[validate(custom(function = "validate_unit_interval"))]
    pub feature_high: f64,

    /// Tier-2 best-overall score above which a candidate is a duplicate at
    /// confidence ×0.8.
    #[validate(custom(function = "validate_unit_interval"))]
    pub feature_mid: f64,

    /// Judge similarity above which Tier 3 reports a duplicate.
    #[validate(custom(function = "validate_unit_interval"))]
    pub judge_threshold: f64,

    /// Key-text length (chars) beyond which Tier 3 is always consulted.
    pub judge_trigger_text_len: usize,

    /// How many existing entities Tier 3 compares against at most.
    pub judge_candidate_limit: usize,

    /// Upper bound on a single judge call; exceeding it fails open.
    pub judge_timeout: Duration,

    /// Entity kinds important enough to always warrant Tier 3.
    pub high_value_kinds: Vec<String>,

    /// Relationship comparator thresholds (duplicate / duplicate at ×0.8).
    #[validate(custom(function = "validate_unit_interval"))]
    pub relationship_high: f64,
    #[validate(custom(function = "validate_unit_interval"))]
    pub relationship_mid: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            shingle_size: 5,
            fingerprint_exact: 0.95,
            fingerprint_near: 0.80,
            feature_high: 0.85,
            feature_mid: 0.70,
            judge_threshold: 0.75,
            judge_trigger_text_len: 200,
            judge_candidate_limit: 5,
            judge_timeout: Duration::from_secs(10),
            high_value_kinds: vec![
                "character".to_string(),
                "person".to_string(),
                "event".to_string(),
                "location".to_string(),
            ],
            relationship_high: 0.9,
            relationship_mid: 0.7,
        }
    }
}

/// Central configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SyncConfig {
    /// OpenAI API key for the semantic-similarity judge.
    #[validate(length(min = 1))]
    pub openai_api_key: String,

    /// Judge model name.
    pub model_name: String,

    /// Judge call timeout in seconds.
    pub judge_timeout_secs: u64,

    /// Deduplication thresholds.
    #[validate(nested)]
    pub dedup: DedupConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            model_name: "gpt-4o-mini".to_string(),
            judge_timeout_secs: 10,
            dedup: DedupConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` first (non-fatal if `.env` is absent).
    /// `OPENAI_API_KEY` is required; `MODEL_NAME` and `JUDGE_TIMEOUT_SECS`
    /// fall back to defaults.
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        let openai_api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            crate::SyncError::Validation("OPENAI_API_KEY is required".to_string())
        })?;

        let model_name =
            std::env::var("MODEL_NAME").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let judge_timeout_secs = match std::env::var("JUDGE_TIMEOUT_SECS") {
            Ok(val) => val.parse::<u64>().map_err(|_| {
                crate::SyncError::Validation(
                    "JUDGE_TIMEOUT_SECS must be a positive integer".to_string(),
                )
            })?,
            Err(_) => 10,
        };

        let mut dedup = DedupConfig::default();
        dedup.judge_timeout = Duration::from_secs(judge_timeout_secs);

        let config = Self {
            openai_api_key,
            model_name,
            judge_timeout_secs,
            dedup,
        };

        config
            .validate()
            .map_err(|e| crate::SyncError::Validation(e.to_string()))?;

        Ok(config)
    }
}
