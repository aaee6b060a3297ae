//! World-info snapshot differ.
//!
//! Classifies a freshly parsed candidate list against the previous snapshot
//! into added / removed / modified / unchanged, with a per-entry field diff
//! for modifications. Pure — no store access, no side effects; calling it
//! twice with the same inputs yields identical change sets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{CandidateEntry, Entry, WorldInfoSnapshot};
use crate::utils::text_similarity;

/// Coarse classification of how an entry's content changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Most of the content was replaced (change percentage > 0.7).
    Replacement,
    /// Content grew past 1.5× its previous length.
    Expansion,
    /// Content shrank below 0.7× its previous length.
    Reduction,
    /// An ordinary in-place edit.
    Update,
}

/// Old/new values for a single changed property key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Field-level diff between two revisions of the same logical entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub name_changed: bool,
    pub content_changed: bool,
    /// `1 − text_similarity(old, new)` when content changed, else `0.0`.
    pub change_percentage: f64,
    pub change_type: Option<ChangeKind>,
    /// Keys whose values differ, with missing keys treated as absent.
    pub properties_changed: BTreeMap<String, PropertyChange>,
}

/// One modified entry: both revisions plus the field diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDifference {
    pub entry_id: String,
    pub old: Entry,
    pub new: Entry,
    pub diff: FieldDiff,
}

/// The outcome of one world-info diff cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<Entry>,
    pub removed: Vec<Entry>,
    pub modified: Vec<EntryDifference>,
    pub unchanged: Vec<Entry>,
}

impl ChangeSet {
    /// Whether the cycle detected no difference at all.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Diff freshly parsed candidates against the previous snapshot.
///
/// Candidates get identity and hashes assigned first; with no previous
/// snapshot everything is `added`. Otherwise ids only in the new parse are
/// `added`, ids only in the old snapshot are `removed` (original entries,
/// untouched), and common ids compare by content hash — equal means
/// `unchanged`, different means `modified` with a [`FieldDiff`].
///
/// Output ordering is deterministic: candidate order for added / modified /
/// unchanged, snapshot (id) order for removed. A candidate repeating an
/// already-seen entry id within one parse is ignored after its first
/// occurrence.
pub fn diff_world_info(
    old: Option<&WorldInfoSnapshot>,
    candidates: Vec<CandidateEntry>,
    session_id: &str,
    now: DateTime<Utc>,
) -> ChangeSet {
    let mut new_entries: Vec<Entry> = Vec::with_capacity(candidates.len());
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for candidate in candidates {
        let entry = Entry::from_candidate(candidate, session_id, now);
        if seen.insert(entry.entry_id.clone()) {
            new_entries.push(entry);
        }
    }

    let mut changes = ChangeSet::default();

    let Some(old) = old else {
        changes.added = new_entries;
        return changes;
    };

    let new_ids: BTreeSet<&str> = new_entries.iter().map(|e| e.entry_id.as_str()).collect();

    for entry in &new_entries {
        match old.entries.get(&entry.entry_id) {
            None => changes.added.push(entry.clone()),
            Some(old_entry) => {
                if old_entry.content_hash == entry.content_hash {
                    changes.unchanged.push(entry.clone());
                } else {
                    changes.modified.push(EntryDifference {
                        entry_id: entry.entry_id.clone(),
                        old: old_entry.clone(),
                        new: entry.clone(),
                        diff: field_diff(old_entry, entry),
                    });
                }
            }
        }
    }

    for (entry_id, old_entry) in &old.entries {
        if !new_ids.contains(entry_id.as_str()) {
            changes.removed.push(old_entry.clone());
        }
    }

    changes
}

/// Compute the field-level diff between two revisions of one entry.
fn field_diff(old: &Entry, new: &Entry) -> FieldDiff {
    let mut diff = FieldDiff {
        name_changed: old.name != new.name,
        ..FieldDiff::default()
    };

    if old.content != new.content {
        diff.content_changed = true;
        diff.change_percentage = 1.0 - text_similarity(&old.content, &new.content);
        diff.change_type = Some(classify_change(
            diff.change_percentage,
            old.content.chars().count(),
            new.content.chars().count(),
        ));
    }

    let keys: BTreeSet<&String> = old.properties.keys().chain(new.properties.keys()).collect();
    for key in keys {
        let old_val = old.properties.get(key);
        let new_val = new.properties.get(key);
        if old_val != new_val {
            diff.properties_changed.insert(
                key.clone(),
                PropertyChange {
                    old: old_val.cloned(),
                    new: new_val.cloned(),
                },
            );
        }
    }

    diff
}

fn classify_change(change_percentage: f64, old_len: usize, new_len: usize) -> ChangeKind {
    if change_percentage > 0.7 {
        ChangeKind::Replacement
    } else if new_len as f64 > old_len as f64 * 1.5 {
        ChangeKind::Expansion
    } else if (new_len as f64) < old_len as f64 * 0.7 {
        ChangeKind::Reduction
    } else {
        ChangeKind::Update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryKind;

    fn candidate(kind: EntryKind, name: &str, content: &str) -> CandidateEntry {
        CandidateEntry {
            kind,
            name: name.to_string(),
            content: content.to_string(),
            properties: BTreeMap::new(),
        }
    }

    fn candidate_with_props(
        kind: EntryKind,
        name: &str,
        content: &str,
        props: &[(&str, &str)],
    ) -> CandidateEntry {
        CandidateEntry {
            kind,
            name: name.to_string(),
            content: content.to_string(),
            properties: props
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn snapshot_of(candidates: Vec<CandidateEntry>) -> WorldInfoSnapshot {
        let now = Utc::now();
        let mut snapshot = WorldInfoSnapshot::default();
        for c in candidates {
            snapshot.insert(Entry::from_candidate(c, "s1", now));
        }
        snapshot.version = 1;
        snapshot
    }

    #[test]
    fn test_first_run_everything_added() {
        let changes = diff_world_info(
            None,
            vec![
                candidate(EntryKind::Location, "夏莱", "联邦搜查社"),
                candidate(EntryKind::Character, "Alice", "A robot girl."),
            ],
            "s1",
            Utc::now(),
        );
        assert_eq!(changes.added.len(), 2);
        assert!(changes.removed.is_empty());
        assert!(changes.modified.is_empty());
        assert!(changes.unchanged.is_empty());
    }

    #[test]
    fn test_unchanged_when_hash_matches() {
        let old = snapshot_of(vec![candidate(EntryKind::Location, "夏莱", "联邦搜查社")]);
        // Same normalized content — different raw line endings.
        let changes = diff_world_info(
            Some(&old),
            vec![candidate(EntryKind::Location, "夏莱", "联邦搜查社\r\n")],
            "s1",
            Utc::now(),
        );
        assert!(changes.is_noop());
        assert_eq!(changes.unchanged.len(), 1);
    }

    #[test]
    fn test_modified_on_content_change() {
        let old = snapshot_of(vec![candidate(EntryKind::Location, "夏莱", "联邦搜查社")]);
        let changes = diff_world_info(
            Some(&old),
            vec![candidate(EntryKind::Location, "夏莱", "联邦搜查社的总部")],
            "s1",
            Utc::now(),
        );
        assert!(changes.added.is_empty());
        assert!(changes.removed.is_empty());
        assert!(changes.unchanged.is_empty());
        assert_eq!(changes.modified.len(), 1);

        let m = &changes.modified[0];
        assert_eq!(m.entry_id, "location:夏莱");
        assert!(m.diff.content_changed);
        assert!(!m.diff.name_changed);
        assert!(m.diff.change_percentage > 0.0);
    }

    #[test]
    fn test_removed_keeps_original_entry() {
        let old = snapshot_of(vec![
            candidate(EntryKind::Location, "夏莱", "联邦搜查社"),
            candidate(EntryKind::Concept, "Halo", "A glowing ring."),
        ]);
        let changes = diff_world_info(
            Some(&old),
            vec![candidate(EntryKind::Location, "夏莱", "联邦搜查社")],
            "s1",
            Utc::now(),
        );
        assert_eq!(changes.removed.len(), 1);
        assert_eq!(changes.removed[0], old.entries["concept:halo"]);
    }

    #[test]
    fn test_rename_casing_is_not_a_new_entry() {
        let old = snapshot_of(vec![candidate(EntryKind::Character, "alice", "A robot girl.")]);
        let changes = diff_world_info(
            Some(&old),
            vec![candidate(EntryKind::Character, "ALICE", "A robot girl.")],
            "s1",
            Utc::now(),
        );
        // Same entry id; content hash equal; only the surface name differs.
        assert!(changes.added.is_empty());
        assert_eq!(changes.unchanged.len(), 1);
    }

    #[test]
    fn test_name_changed_flag() {
        let old = snapshot_of(vec![candidate(EntryKind::Character, "alice", "v1")]);
        let changes = diff_world_info(
            Some(&old),
            vec![candidate(EntryKind::Character, "Alice", "v2")],
            "s1",
            Utc::now(),
        );
        assert_eq!(changes.modified.len(), 1);
        assert!(changes.modified[0].diff.name_changed);
        assert!(changes.modified[0].diff.content_changed);
    }

    #[test]
    fn test_change_kind_replacement() {
        assert_eq!(classify_change(0.9, 10, 10), ChangeKind::Replacement);
    }

    #[test]
    fn test_change_kind_expansion_and_reduction() {
        assert_eq!(classify_change(0.2, 10, 16), ChangeKind::Expansion);
        assert_eq!(classify_change(0.2, 10, 6), ChangeKind::Reduction);
        assert_eq!(classify_change(0.2, 10, 11), ChangeKind::Update);
    }

    #[test]
    fn test_property_symmetric_difference() {
        let old = snapshot_of(vec![candidate_with_props(
            EntryKind::Character,
            "Alice",
            "v1",
            &[("mood", "calm"), ("rank", "captain")],
        )]);
        let changes = diff_world_info(
            Some(&old),
            vec![candidate_with_props(
                EntryKind::Character,
                "Alice",
                "v2",
                &[("mood", "angry"), ("weapon", "railgun")],
            )],
            "s1",
            Utc::now(),
        );
        let diff = &changes.modified[0].diff;
        assert_eq!(diff.properties_changed.len(), 3);
        assert_eq!(
            diff.properties_changed["mood"],
            PropertyChange {
                old: Some("calm".to_string()),
                new: Some("angry".to_string())
            }
        );
        assert_eq!(diff.properties_changed["rank"].new, None);
        assert_eq!(diff.properties_changed["weapon"].old, None);
    }

    #[test]
    fn test_unchanged_property_key_not_reported() {
        let old = snapshot_of(vec![candidate_with_props(
            EntryKind::Character,
            "Alice",
            "v1",
            &[("mood", "calm")],
        )]);
        let changes = diff_world_info(
            Some(&old),
            vec![candidate_with_props(
                EntryKind::Character,
                "Alice",
                "v2",
                &[("mood", "calm")],
            )],
            "s1",
            Utc::now(),
        );
        assert!(changes.modified[0].diff.properties_changed.is_empty());
    }

    #[test]
    fn test_idempotent_change_sets() {
        let old = snapshot_of(vec![
            candidate(EntryKind::Location, "夏莱", "联邦搜查社"),
            candidate(EntryKind::Concept, "Halo", "A glowing ring."),
        ]);
        let new = vec![
            candidate(EntryKind::Location, "夏莱", "联邦搜查社的总部"),
            candidate(EntryKind::Character, "Alice", "A robot girl."),
        ];
        let now = Utc::now();
        let a = diff_world_info(Some(&old), new.clone(), "s1", now);
        let b = diff_world_info(Some(&old), new, "s1", now);
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_candidate_id_first_wins() {
        let changes = diff_world_info(
            None,
            vec![
                candidate(EntryKind::Location, "夏莱", "first"),
                candidate(EntryKind::Location, " 夏莱 ", "second"),
            ],
            "s1",
            Utc::now(),
        );
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.added[0].content, "first");
    }

    #[test]
    fn test_end_to_end_shale_scenario() {
        // The canonical scenario: one entry whose content gained a suffix.
        let old = snapshot_of(vec![candidate(EntryKind::Location, "夏莱", "联邦搜查社")]);
        let changes = diff_world_info(
            Some(&old),
            vec![candidate(EntryKind::Location, "夏莱", "联邦搜查社的总部")],
            "s1",
            Utc::now(),
        );
        assert_eq!(changes.modified.len(), 1);
        assert!(changes.modified[0].diff.content_changed);
        assert!(changes.added.is_empty());
        assert!(changes.removed.is_empty());
        assert!(changes.unchanged.is_empty());
    }
}
