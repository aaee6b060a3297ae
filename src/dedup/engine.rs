//! Three-tier deduplication engine.
//!
//! Tiers escalate in cost: fingerprint Jaccard, weighted feature scoring,
//! then an external semantic judge for the ambiguous remainder. The judge is
//! the only suspension point and fails open: on error or timeout the entity
//! is treated as not a duplicate so ingestion never blocks.

use tracing::{debug, warn};

use crate::errors::JudgeError;
use crate::judge::{NoJudge, SimilarityJudge};
use crate::models::Entry;
use crate::types::DedupConfig;

use super::feature::{
    feature_similarity, relationship_similarity, EntityFeatures, RelationshipCandidate,
};
use super::fingerprint::{entity_key_text, fingerprint_similarity};
use super::{DedupLevel, DeduplicationResult};

/// Characters kept per descriptive property when building the judge prompt.
const JUDGE_PROPERTY_CHARS: usize = 100;

/// Descriptive property keys surfaced to the judge.
const JUDGE_PROPERTIES: [&str; 5] = ["description", "bio", "background", "summary", "details"];

pub struct DeduplicationEngine<J = NoJudge> {
    config: DedupConfig,
    judge: Option<J>,
}

impl DeduplicationEngine<NoJudge> {
    /// Engine without a semantic judge; Tier 3 is skipped entirely.
    pub fn without_judge(config: DedupConfig) -> Self {
        Self {
            config,
            judge: None,
        }
    }
}

impl<J: SimilarityJudge> DeduplicationEngine<J> {
    pub fn with_judge(config: DedupConfig, judge: J) -> Self {
        Self {
            config,
            judge: Some(judge),
        }
    }

    /// Decide whether `candidate` duplicates any of `existing`.
    ///
    /// Each tier may short-circuit with a confident duplicate verdict; if no
    /// tier triggers the entity is new.
    pub async fn deduplicate_entity(
        &self,
        session_id: &str,
        candidate: &Entry,
        existing: &[Entry],
    ) -> DeduplicationResult {
        debug!(session_id, entity = %candidate.name, "deduplicating entity");

        let (fingerprint_result, fingerprint_sims) = self.fingerprint_tier(candidate, existing);
        if fingerprint_result.is_duplicate {
            debug!(
                similarity = fingerprint_result.similarity_score,
                "fingerprint tier matched"
            );
            return fingerprint_result;
        }

        let feature_result = self.feature_tier(candidate, existing);
        if feature_result.is_duplicate {
            debug!(
                similarity = feature_result.similarity_score,
                "feature tier matched"
            );
            return feature_result;
        }

        if self.should_use_judge(candidate, &fingerprint_sims) {
            let judge_result = self.judge_tier(candidate, existing).await;
            if judge_result.is_duplicate {
                debug!(
                    similarity = judge_result.similarity_score,
                    "judge tier matched"
                );
                return judge_result;
            }
        }

        DeduplicationResult::not_duplicate(DedupLevel::None, "no significant similarity")
    }

    // ── Tier 1 ────────────────────────────────────────────────────────────────

    /// Returns the tier verdict plus the per-candidate similarities, which the
    /// judge trigger reuses.
    fn fingerprint_tier(
        &self,
        candidate: &Entry,
        existing: &[Entry],
    ) -> (DeduplicationResult, Vec<f64>) {
        let cfg = &self.config;
        let mut sims = Vec::with_capacity(existing.len());
        let mut best: Option<(&Entry, f64)> = None;

        for other in existing {
            let similarity = fingerprint_similarity(candidate, other, cfg.shingle_size);
            sims.push(similarity);

            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((other, similarity));
            }

            if similarity > cfg.fingerprint_exact {
                let result = DeduplicationResult {
                    is_duplicate: true,
                    similarity_score: similarity,
                    level: DedupLevel::Fingerprint,
                    reason: format!("near-identical fingerprint ({:.2})", similarity),
                    matched_entity_id: Some(other.entry_id.clone()),
                    confidence: similarity,
                };
                return (result, sims);
            }
        }

        if let Some((matched, similarity)) = best {
            if similarity > cfg.fingerprint_near {
                let result = DeduplicationResult {
                    is_duplicate: true,
                    similarity_score: similarity,
                    level: DedupLevel::Fingerprint,
                    reason: format!("highly similar fingerprint ({:.2})", similarity),
                    matched_entity_id: Some(matched.entry_id.clone()),
                    confidence: similarity,
                };
                return (result, sims);
            }
        }

        let highest = best.map_or(0.0, |(_, s)| s);
        let result = DeduplicationResult {
            is_duplicate: false,
            similarity_score: highest,
            level: DedupLevel::Fingerprint,
            reason: format!("low fingerprint similarity ({:.2})", highest),
            matched_entity_id: None,
            confidence: 0.0,
        };
        (result, sims)
    }

    // ── Tier 2 ────────────────────────────────────────────────────────────────

    fn feature_tier(&self, candidate: &Entry, existing: &[Entry]) -> DeduplicationResult {
        let cfg = &self.config;
        let candidate_features = EntityFeatures::extract(candidate);
        let mut best: Option<(&Entry, f64)> = None;

        for other in existing {
            let similarity = feature_similarity(&candidate_features, &EntityFeatures::extract(other));

            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((other, similarity));
            }

            if similarity > cfg.feature_high {
                return DeduplicationResult {
                    is_duplicate: true,
                    similarity_score: similarity,
                    level: DedupLevel::Feature,
                    reason: format!("highly similar features ({:.2})", similarity),
                    matched_entity_id: Some(other.entry_id.clone()),
                    confidence: similarity,
                };
            }
        }

        if let Some((matched, similarity)) = best {
            if similarity > cfg.feature_mid {
                return DeduplicationResult {
                    is_duplicate: true,
                    similarity_score: similarity,
                    level: DedupLevel::Feature,
                    reason: format!("moderately similar features ({:.2})", similarity),
                    matched_entity_id: Some(matched.entry_id.clone()),
                    // moderate matches carry reduced confidence
                    confidence: similarity * 0.8,
                };
            }
        }

        let highest = best.map_or(0.0, |(_, s)| s);
        DeduplicationResult {
            is_duplicate: false,
            similarity_score: highest,
            level: DedupLevel::Feature,
            reason: format!("low feature similarity ({:.2})", highest),
            matched_entity_id: None,
            confidence: 0.0,
        }
    }

    // ── Tier 3 ────────────────────────────────────────────────────────────────

    /// The judge is worth its latency only when ambiguity signals are present:
    /// long descriptive text, a high-value entity kind, or a fingerprint
    /// similarity that landed in the uncertain band.
    fn should_use_judge(&self, candidate: &Entry, fingerprint_sims: &[f64]) -> bool {
        if self.judge.is_none() {
            return false;
        }
        let cfg = &self.config;

        if entity_key_text(candidate).chars().count() > cfg.judge_trigger_text_len {
            return true;
        }

        let kind = candidate.kind.as_str().to_lowercase();
        if cfg.high_value_kinds.iter().any(|k| k == &kind) {
            return true;
        }

        fingerprint_sims
            .iter()
            .take(cfg.judge_candidate_limit)
            .any(|&s| (0.6..=0.8).contains(&s))
    }

    async fn judge_tier(&self, candidate: &Entry, existing: &[Entry]) -> DeduplicationResult {
        let cfg = &self.config;
        let Some(judge) = &self.judge else {
            return DeduplicationResult::not_duplicate(DedupLevel::Llm, "no judge configured");
        };

        let candidate_desc = entity_description(candidate);
        let mut highest = 0.0_f64;

        for other in existing.iter().take(cfg.judge_candidate_limit) {
            let other_desc = entity_description(other);

            let verdict = match tokio::time::timeout(
                cfg.judge_timeout,
                judge.similarity_check(&candidate_desc, &other_desc),
            )
            .await
            {
                Ok(Ok(verdict)) => verdict,
                Ok(Err(e)) => {
                    // fail open: a missed duplicate is recoverable bloat,
                    // a blocked ingestion is not
                    warn!(error = %e, "judge call failed, treating as not duplicate");
                    return DeduplicationResult::not_duplicate(
                        DedupLevel::Llm,
                        format!("judge failed: {e}"),
                    );
                }
                Err(_) => {
                    let e = JudgeError::Timeout;
                    warn!(error = %e, "judge call timed out, treating as not duplicate");
                    return DeduplicationResult::not_duplicate(
                        DedupLevel::Llm,
                        format!("judge failed: {e}"),
                    );
                }
            };

            let similarity = verdict.similarity_score;
            highest = highest.max(similarity);

            if similarity > cfg.judge_threshold {
                return DeduplicationResult {
                    is_duplicate: true,
                    similarity_score: similarity,
                    level: DedupLevel::Llm,
                    reason: format!("semantically similar ({:.2}): {}", similarity, verdict.reasoning),
                    matched_entity_id: Some(other.entry_id.clone()),
                    confidence: similarity * 0.9,
                };
            }
        }

        DeduplicationResult {
            is_duplicate: false,
            similarity_score: highest,
            level: DedupLevel::Llm,
            reason: format!("no semantic similarity found ({:.2})", highest),
            matched_entity_id: None,
            confidence: 0.0,
        }
    }

    // ── Relationships ─────────────────────────────────────────────────────────

    /// Single-tier relationship comparison; synchronous, never calls out.
    pub fn deduplicate_relationship(
        &self,
        session_id: &str,
        candidate: &RelationshipCandidate,
        existing: &[RelationshipCandidate],
    ) -> DeduplicationResult {
        debug!(session_id, "deduplicating relationship");
        let cfg = &self.config;

        for other in existing {
            let similarity = relationship_similarity(candidate, other);

            if similarity > cfg.relationship_high {
                return DeduplicationResult {
                    is_duplicate: true,
                    similarity_score: similarity,
                    level: DedupLevel::Relationship,
                    reason: format!("highly similar relationship ({:.2})", similarity),
                    matched_entity_id: Some(other.relationship_id.clone()),
                    confidence: similarity,
                };
            }

            if similarity > cfg.relationship_mid {
                return DeduplicationResult {
                    is_duplicate: true,
                    similarity_score: similarity,
                    level: DedupLevel::Relationship,
                    reason: format!("moderately similar relationship ({:.2})", similarity),
                    matched_entity_id: Some(other.relationship_id.clone()),
                    confidence: similarity * 0.8,
                };
            }
        }

        DeduplicationResult::not_duplicate(
            DedupLevel::Relationship,
            "no similar existing relationship",
        )
    }
}

/// Render an entity as prompt text for the judge.
fn entity_description(entry: &Entry) -> String {
    let mut lines = vec![
        format!("name: {}", entry.name),
        format!("kind: {}", entry.kind.as_str()),
    ];

    for key in JUDGE_PROPERTIES {
        if let Some(value) = entry.properties.get(key) {
            if value.is_empty() {
                continue;
            }
            let rendered: String = if value.chars().count() > JUDGE_PROPERTY_CHARS {
                let truncated: String = value.chars().take(JUDGE_PROPERTY_CHARS).collect();
                format!("{truncated}...")
            } else {
                value.clone()
            };
            lines.push(format!("{key}: {rendered}"));
        }
    }

    if !entry.content.is_empty() {
        let content: String = if entry.content.chars().count() > JUDGE_PROPERTY_CHARS {
            let truncated: String = entry.content.chars().take(JUDGE_PROPERTY_CHARS).collect();
            format!("{truncated}...")
        } else {
            entry.content.clone()
        };
        lines.push(format!("content: {content}"));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{JudgeError, Result};
    use crate::judge::SimilarityVerdict;
    use crate::models::{CandidateEntry, EntryKind};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn entry(name: &str, kind: EntryKind, props: &[(&str, &str)]) -> Entry {
        let properties: BTreeMap<String, String> = props
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Entry::from_candidate(
            CandidateEntry {
                kind,
                name: name.to_string(),
                content: String::new(),
                properties,
            },
            "session-1",
            Utc::now(),
        )
    }

    /// Judge returning a fixed verdict.
    struct StaticJudge {
        score: f64,
    }

    impl SimilarityJudge for StaticJudge {
        async fn similarity_check(&self, _a: &str, _b: &str) -> Result<SimilarityVerdict> {
            Ok(SimilarityVerdict {
                is_similar: self.score > 0.75,
                similarity_score: self.score,
                reasoning: "fixed".to_string(),
            })
        }
    }

    /// Judge that always errors.
    struct FailingJudge;

    impl SimilarityJudge for FailingJudge {
        async fn similarity_check(&self, _a: &str, _b: &str) -> Result<SimilarityVerdict> {
            Err(JudgeError::RateLimit.into())
        }
    }

    /// Judge that never answers in time.
    struct SlowJudge;

    impl SimilarityJudge for SlowJudge {
        async fn similarity_check(&self, _a: &str, _b: &str) -> Result<SimilarityVerdict> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(SimilarityVerdict {
                is_similar: true,
                similarity_score: 1.0,
                reasoning: "too late".to_string(),
            })
        }
    }

    const LONG_DESC: &str = "a long running description of the schale federal investigation \
                             club headquarters located in kivotos with many members and a \
                             long institutional history";

    #[tokio::test]
    async fn test_trailing_edit_caught_by_fingerprint_tier() {
        let engine = DeduplicationEngine::without_judge(DedupConfig::default());

        let edited = format!("{}xy", &LONG_DESC[..LONG_DESC.len() - 2]);
        let existing = entry("schale", EntryKind::Concept, &[("description", LONG_DESC)]);
        let candidate = entry("schale", EntryKind::Concept, &[("description", &edited)]);

        let result = engine
            .deduplicate_entity("s1", &candidate, std::slice::from_ref(&existing))
            .await;

        assert!(result.is_duplicate);
        assert_eq!(result.level, DedupLevel::Fingerprint);
        assert!(result.similarity_score > 0.95, "got {}", result.similarity_score);
        assert_eq!(result.matched_entity_id.as_deref(), Some(existing.entry_id.as_str()));
    }

    #[tokio::test]
    async fn test_shared_kind_and_key_not_a_feature_duplicate() {
        let engine = DeduplicationEngine::without_judge(DedupConfig::default());

        let existing = entry(
            "millennium",
            EntryKind::Concept,
            &[("origin", "an academy city far to the east")],
        );
        let candidate = entry(
            "abydos",
            EntryKind::Concept,
            &[("origin", "a desert ruin"), ("role", "school")],
        );

        let result = engine
            .deduplicate_entity("s1", &candidate, std::slice::from_ref(&existing))
            .await;

        assert!(!result.is_duplicate);
        assert_eq!(result.level, DedupLevel::None);
    }

    #[tokio::test]
    async fn test_high_feature_match_full_confidence() {
        let engine = DeduplicationEngine::without_judge(DedupConfig::default());

        // identical name/kind/keys, and the value prefixes contain each other:
        // 0.4 + 0.3 + 0.2 + 0.1 = 1.0 > 0.85; descriptions diverge enough that
        // the fingerprint tier stays below its near band
        let existing = entry(
            "shiroko",
            EntryKind::General,
            &[("description", "the gun club sniper girl")],
        );
        let candidate = entry(
            "shiroko",
            EntryKind::General,
            &[(
                "description",
                "the gun club sniper who now rides a bicycle across kivotos every single morning",
            )],
        );

        let result = engine
            .deduplicate_entity("s1", &candidate, std::slice::from_ref(&existing))
            .await;

        assert!(result.is_duplicate);
        assert_eq!(result.level, DedupLevel::Feature);
        assert!(result.similarity_score > 0.85);
        assert!((result.confidence - result.similarity_score).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_moderate_feature_match_reduces_confidence() {
        let engine = DeduplicationEngine::without_judge(DedupConfig::default());

        // 0.4 name + 0.3 kind + key Jaccard 0.5 (0.1) = 0.8, inside (0.70, 0.85]
        let existing = entry(
            "shiroko",
            EntryKind::General,
            &[("description", "a quiet gun club sniper")],
        );
        let candidate = entry(
            "shiroko",
            EntryKind::General,
            &[
                ("description", "an energetic cycling enthusiast from abydos high"),
                ("hobby", "long rides"),
            ],
        );

        let result = engine
            .deduplicate_entity("s1", &candidate, std::slice::from_ref(&existing))
            .await;

        assert!(result.is_duplicate);
        assert_eq!(result.level, DedupLevel::Feature);
        assert!((result.similarity_score - 0.8).abs() < 1e-9);
        assert!((result.confidence - 0.8 * 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_judge_confirms_borderline_duplicate() {
        let engine =
            DeduplicationEngine::with_judge(DedupConfig::default(), StaticJudge { score: 0.9 });

        // character is a high-value kind, so the judge is consulted even
        // though fingerprints and features disagree
        let existing = entry(
            "arona",
            EntryKind::Character,
            &[("description", "the assistant living in the shittim chest")],
        );
        let candidate = entry(
            "彩奈",
            EntryKind::Character,
            &[("description", "system administrator of the shittim chest tablet")],
        );

        let result = engine
            .deduplicate_entity("s1", &candidate, std::slice::from_ref(&existing))
            .await;

        assert!(result.is_duplicate);
        assert_eq!(result.level, DedupLevel::Llm);
        assert!((result.confidence - 0.9 * 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_judge_failure_fails_open() {
        let engine = DeduplicationEngine::with_judge(DedupConfig::default(), FailingJudge);

        let existing = entry("arona", EntryKind::Character, &[]);
        let candidate = entry("彩奈", EntryKind::Character, &[]);

        let result = engine
            .deduplicate_entity("s1", &candidate, std::slice::from_ref(&existing))
            .await;

        assert!(!result.is_duplicate);
    }

    #[tokio::test]
    async fn test_judge_timeout_fails_open() {
        let mut config = DedupConfig::default();
        config.judge_timeout = Duration::from_millis(20);
        let engine = DeduplicationEngine::with_judge(config, SlowJudge);

        let existing = entry("arona", EntryKind::Character, &[]);
        let candidate = entry("彩奈", EntryKind::Character, &[]);

        let result = engine
            .deduplicate_entity("s1", &candidate, std::slice::from_ref(&existing))
            .await;

        assert!(!result.is_duplicate);
        assert_eq!(result.level, DedupLevel::Llm);
        assert!(
            result.reason.contains(&JudgeError::Timeout.to_string()),
            "reason should carry the timeout error, got {:?}",
            result.reason
        );
    }

    #[tokio::test]
    async fn test_low_judge_score_not_duplicate() {
        let engine =
            DeduplicationEngine::with_judge(DedupConfig::default(), StaticJudge { score: 0.4 });

        let existing = entry("arona", EntryKind::Character, &[]);
        let candidate = entry("plana", EntryKind::Character, &[]);

        let result = engine
            .deduplicate_entity("s1", &candidate, std::slice::from_ref(&existing))
            .await;

        assert!(!result.is_duplicate);
    }

    #[tokio::test]
    async fn test_no_existing_entities_never_duplicate() {
        let engine = DeduplicationEngine::without_judge(DedupConfig::default());
        let candidate = entry("schale", EntryKind::Location, &[]);

        let result = engine.deduplicate_entity("s1", &candidate, &[]).await;

        assert!(!result.is_duplicate);
        assert_eq!(result.level, DedupLevel::None);
    }

    #[test]
    fn test_relationship_dedup_thresholds() {
        let engine = DeduplicationEngine::without_judge(DedupConfig::default());

        let existing = RelationshipCandidate {
            relationship_id: "r1".to_string(),
            source_entity_id: "e1".to_string(),
            target_entity_id: "e2".to_string(),
            relation_type: "ally".to_string(),
            relation_subtype: Some("close".to_string()),
            properties: BTreeMap::new(),
        };

        // identical: 0.6 + 0.3 + 0.1 = 1.0 > 0.9
        let result = engine.deduplicate_relationship(
            "s1",
            &existing.clone(),
            std::slice::from_ref(&existing),
        );
        assert!(result.is_duplicate);
        assert!((result.confidence - result.similarity_score).abs() < 1e-9);

        // same endpoints, different type: 0.6 in (0.7, 0.9]? no — 0.6 is below
        let mut different_type = existing.clone();
        different_type.relation_type = "rival".to_string();
        let result =
            engine.deduplicate_relationship("s1", &different_type, std::slice::from_ref(&existing));
        assert!(!result.is_duplicate);

        // same endpoints + type, different subtype: 0.9 → moderate band
        let mut different_subtype = existing.clone();
        different_subtype.relation_subtype = Some("distant".to_string());
        let result = engine.deduplicate_relationship(
            "s1",
            &different_subtype,
            std::slice::from_ref(&existing),
        );
        assert!(result.is_duplicate);
        assert!((result.confidence - result.similarity_score * 0.8).abs() < 1e-9);
    }
}
