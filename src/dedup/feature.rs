//! Tier 2: structured feature comparison.
//!
//! Weighted scoring over name, kind, property keys, and property-value
//! prefixes. Cheaper than the semantic judge, more discriminating than raw
//! fingerprints when surface text diverges.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::Entry;

/// Property-value prefix length kept as a comparison feature.
const VALUE_PREFIX_CHARS: usize = 20;

/// The comparable features of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityFeatures {
    pub name: String,
    pub kind: String,
    pub property_keys: BTreeSet<String>,
    /// First [`VALUE_PREFIX_CHARS`] characters of each non-empty value.
    pub value_prefixes: Vec<String>,
}

impl EntityFeatures {
    pub fn extract(entry: &Entry) -> Self {
        let value_prefixes = entry
            .properties
            .values()
            .filter(|v| !v.is_empty())
            .map(|v| v.chars().take(VALUE_PREFIX_CHARS).collect())
            .collect();

        Self {
            name: entry.name.to_lowercase(),
            kind: entry.kind.as_str().to_lowercase(),
            property_keys: entry.properties.keys().cloned().collect(),
            value_prefixes,
        }
    }
}

/// Weighted feature similarity, clipped to `[0, 1]`.
///
/// Exact name match `+0.4` (substring containment `+0.2`), exact kind match
/// `+0.3`, property-key Jaccard `×0.2`, value-prefix substring overlap `×0.1`.
pub fn feature_similarity(a: &EntityFeatures, b: &EntityFeatures) -> f64 {
    let mut similarity = 0.0;

    if !a.name.is_empty() && !b.name.is_empty() {
        if a.name == b.name {
            similarity += 0.4;
        } else if a.name.contains(&b.name) || b.name.contains(&a.name) {
            similarity += 0.2;
        }
    }

    if !a.kind.is_empty() && a.kind == b.kind {
        similarity += 0.3;
    }

    if !a.property_keys.is_empty() && !b.property_keys.is_empty() {
        let intersection = a.property_keys.intersection(&b.property_keys).count();
        let union = a.property_keys.union(&b.property_keys).count();
        similarity += intersection as f64 / union as f64 * 0.2;
    }

    if !a.value_prefixes.is_empty() && !b.value_prefixes.is_empty() {
        let common = a
            .value_prefixes
            .iter()
            .filter(|va| {
                b.value_prefixes
                    .iter()
                    .any(|vb| va.contains(vb.as_str()) || vb.contains(va.as_str()))
            })
            .count();
        let denominator = a.value_prefixes.len().max(b.value_prefixes.len());
        similarity += common as f64 / denominator as f64 * 0.1;
    }

    similarity.clamp(0.0, 1.0)
}

// ── Relationships ─────────────────────────────────────────────────────────────

/// Property keys that carry relationship-identity weight.
const RELATIONSHIP_KEY_PROPERTIES: [&str; 4] = ["intensity", "confidence", "context", "time_bounds"];

/// A candidate relationship between two known entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipCandidate {
    pub relationship_id: String,
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub relation_type: String,
    #[serde(default)]
    pub relation_subtype: Option<String>,
    #[serde(default)]
    pub properties: std::collections::BTreeMap<String, String>,
}

impl RelationshipCandidate {
    fn key_properties(&self) -> BTreeSet<&str> {
        RELATIONSHIP_KEY_PROPERTIES
            .iter()
            .copied()
            .filter(|k| self.properties.contains_key(*k))
            .collect()
    }
}

/// Single-tier relationship similarity: exact endpoint pair `+0.6`, exact
/// relation type `+0.3`, exact subtype `+0.1`, key-property overlap `×0.2`.
pub fn relationship_similarity(a: &RelationshipCandidate, b: &RelationshipCandidate) -> f64 {
    let mut similarity = 0.0;

    if !a.source_entity_id.is_empty()
        && !a.target_entity_id.is_empty()
        && a.source_entity_id == b.source_entity_id
        && a.target_entity_id == b.target_entity_id
    {
        similarity += 0.6;
    }

    if !a.relation_type.is_empty() && a.relation_type == b.relation_type {
        similarity += 0.3;
    }

    if let (Some(sa), Some(sb)) = (&a.relation_subtype, &b.relation_subtype) {
        if !sa.is_empty() && sa == sb {
            similarity += 0.1;
        }
    }

    let keys_a = a.key_properties();
    let keys_b = b.key_properties();
    if !keys_a.is_empty() && !keys_b.is_empty() {
        let intersection = keys_a.intersection(&keys_b).count();
        let denominator = keys_a.len().max(keys_b.len());
        similarity += intersection as f64 / denominator as f64 * 0.2;
    }

    similarity.clamp(0.0, 1.0)
}
