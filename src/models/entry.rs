//! World-info entries and the per-session snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::utils::{content_hash, entry_id};

/// The kind of a world-info entry.
///
/// Known kinds are first-class variants; anything else a parser supplies is
/// carried verbatim in [`EntryKind::Other`] so its identity string survives
/// round trips.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Location,
    Character,
    Concept,
    General,
    #[serde(untagged)]
    Other(String),
}

impl EntryKind {
    /// The identity prefix used in entry ids.
    pub fn as_str(&self) -> &str {
        match self {
            EntryKind::Location => "location",
            EntryKind::Character => "character",
            EntryKind::Concept => "concept",
            EntryKind::General => "general",
            EntryKind::Other(s) => s.as_str(),
        }
    }

    /// Parse a parser-supplied kind string. Unknown strings become
    /// [`EntryKind::Other`]; this never fails.
    pub fn parse(s: &str) -> Self {
        match s {
            "location" => EntryKind::Location,
            "character" => EntryKind::Character,
            "concept" => EntryKind::Concept,
            "general" => EntryKind::General,
            other => EntryKind::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an entry or stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Active,
    Deleted,
    Superseded,
    Expired,
}

/// A parser-supplied candidate entry, before identity/hash assignment.
///
/// The upstream parser owns splitting raw text into candidates; this engine
/// owns `entry_id` and `content_hash` computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEntry {
    pub kind: EntryKind,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// A world-info entry with derived identity and lifecycle metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Stable derived id: `<kind>:<normalized name>`.
    pub entry_id: String,
    pub kind: EntryKind,
    pub name: String,
    pub content: String,
    /// MD5 fingerprint of the normalized content.
    pub content_hash: String,
    pub properties: BTreeMap<String, String>,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: u32,
    pub status: EntryStatus,
    pub status_reason: Option<String>,
}

impl Entry {
    /// Assign identity and hashes to a parsed candidate.
    pub fn from_candidate(candidate: CandidateEntry, session_id: &str, now: DateTime<Utc>) -> Self {
        let entry_id = entry_id(&candidate.kind, &candidate.name);
        let content_hash = content_hash(&candidate.content);

        Entry {
            entry_id,
            kind: candidate.kind,
            name: candidate.name,
            content: candidate.content,
            content_hash,
            properties: candidate.properties,
            session_id: session_id.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            version: 1,
            status: EntryStatus::Active,
            status_reason: None,
        }
    }
}

/// The active world-info view for one session.
///
/// Copy-on-write: synchronization never mutates a snapshot in place, it
/// produces a new value with `version` bumped. Only active entries appear
/// here; closed records live in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldInfoSnapshot {
    /// `entry_id` → entry.
    pub entries: BTreeMap<String, Entry>,
    /// `content_hash` → `entry_id` reverse index.
    pub entry_hashes: BTreeMap<String, String>,
    /// Monotonically increasing per session.
    pub version: u64,
}

impl WorldInfoSnapshot {
    /// Insert or replace an entry, maintaining the hash index.
    pub fn insert(&mut self, entry: Entry) {
        if let Some(old) = self.entries.get(&entry.entry_id) {
            self.entry_hashes.remove(&old.content_hash);
        }
        self.entry_hashes
            .insert(entry.content_hash.clone(), entry.entry_id.clone());
        self.entries.insert(entry.entry_id.clone(), entry);
    }

    /// Remove an entry from the active maps. The store keeps its history.
    pub fn remove(&mut self, entry_id: &str) {
        if let Some(entry) = self.entries.remove(entry_id) {
            self.entry_hashes.remove(&entry.content_hash);
        }
    }
}
