//! State synchronizer: commits diff and dedup outcomes to the store and the
//! per-session snapshots.
//!
//! One ingestion cycle reads the prior snapshot at version `N`, computes all
//! mutations against that single consistent read, applies record writes, and
//! commits the new snapshot with compare-and-swap on `N`. Concurrent writers
//! of the same session surface as [`crate::SyncError::VersionConflict`] and should
//! retry the whole cycle.
//!
//! Per-item failures during a cycle do not abort it; they are collected as
//! [`ItemOutcome::Failed`] so partial-batch results stay visible to callers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dedup::{DeduplicationEngine, DeduplicationResult};
use crate::diff::{assign_messages, diff_chat_history, diff_world_info, ChatChange, MessageEdit};
use crate::errors::Result;
use crate::judge::SimilarityJudge;
use crate::models::{
    CandidateEntry, CandidateMessage, ChatHistorySnapshot, ChatMessage, Entry, RecordPatch,
    StoredRecord, WorldInfoSnapshot,
};
use crate::snapshots::SnapshotRepository;
use crate::store::TemporalStore;

// ── Per-item outcomes ─────────────────────────────────────────────────────────

/// What happened to one entry during a world-info cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// New entry, no duplicate found; a record was opened.
    Created { entry_id: String, record_id: Uuid },
    /// New entry judged a duplicate of an existing one; nothing written.
    SkippedDuplicate {
        entry_id: String,
        dedup: DeduplicationResult,
    },
    /// Content changed; the old record was closed and a successor opened.
    Superseded {
        entry_id: String,
        old_record_id: Uuid,
        new_record_id: Uuid,
        version: u32,
    },
    /// Entry vanished from the source; its record was closed as deleted.
    Closed { entry_id: String, record_id: Uuid },
    /// Content hash unchanged; prior entry carried forward untouched.
    Unchanged { entry_id: String },
    /// A store write failed for this item; the rest of the batch continued.
    Failed { entry_id: String, error: String },
}

impl ItemOutcome {
    pub fn entry_id(&self) -> &str {
        match self {
            ItemOutcome::Created { entry_id, .. }
            | ItemOutcome::SkippedDuplicate { entry_id, .. }
            | ItemOutcome::Superseded { entry_id, .. }
            | ItemOutcome::Closed { entry_id, .. }
            | ItemOutcome::Unchanged { entry_id }
            | ItemOutcome::Failed { entry_id, .. } => entry_id,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }
}

/// Result of one world-info ingestion cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldInfoReport {
    pub outcomes: Vec<ItemOutcome>,
    /// Snapshot version after the cycle (unchanged for a no-op cycle).
    pub version: u64,
    /// Whether a new snapshot value was committed.
    pub changed: bool,
}

impl WorldInfoReport {
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(ItemOutcome::is_failure)
    }
}

/// Result of one chat-history ingestion cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReport {
    pub change: ChatChange,
    /// Snapshot version after the cycle (unchanged for no-change).
    pub version: u64,
    pub changed: bool,
}

// ── Synchronizer ──────────────────────────────────────────────────────────────

pub struct StateSynchronizer<S, R, J> {
    store: S,
    snapshots: R,
    dedup: DeduplicationEngine<J>,
}

impl<S, R, J> StateSynchronizer<S, R, J>
where
    S: TemporalStore,
    R: SnapshotRepository,
    J: SimilarityJudge,
{
    pub fn new(store: S, snapshots: R, dedup: DeduplicationEngine<J>) -> Self {
        Self {
            store,
            snapshots,
            dedup,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn snapshots(&self) -> &R {
        &self.snapshots
    }

    // ── World info ────────────────────────────────────────────────────────────

    /// Run one world-info ingestion cycle for a session.
    ///
    /// Cycles for one session must run sequentially; a conflicting commit
    /// returns [`crate::SyncError::VersionConflict`] and the caller retries with a
    /// fresh read.
    ///
    /// Record writes happen before the snapshot commit and are not rolled back
    /// on a conflict. If the sequential contract is broken, retrying callers
    /// can encounter open records from the failed cycle; the next successful
    /// supersession folds them back into the history.
    pub async fn ingest_world_info(
        &self,
        session_id: &str,
        candidates: Vec<CandidateEntry>,
    ) -> Result<WorldInfoReport> {
        let now = Utc::now();
        let prior = self.snapshots.world_info(session_id).await?;
        let expected_version = prior.as_ref().map_or(0, |s| s.version);

        let changes = diff_world_info(prior.as_ref(), candidates, session_id, now);
        debug!(
            session_id,
            added = changes.added.len(),
            removed = changes.removed.len(),
            modified = changes.modified.len(),
            unchanged = changes.unchanged.len(),
            "world info diff computed"
        );

        let mut outcomes = Vec::new();

        if changes.is_noop() {
            for entry in &changes.unchanged {
                outcomes.push(ItemOutcome::Unchanged {
                    entry_id: entry.entry_id.clone(),
                });
            }
            return Ok(WorldInfoReport {
                outcomes,
                version: expected_version,
                changed: false,
            });
        }

        // one consistent view of the open records for this session
        let active = self.store.active_records(session_id, None).await?;
        let open_record_id = |entry_id: &str| -> Option<Uuid> {
            active
                .iter()
                .find(|r| r.entry.entry_id == entry_id)
                .map(|r| r.id)
        };

        // grows as entries are created so later candidates in the same batch
        // are deduplicated against earlier ones
        let mut existing_entries: Vec<Entry> = prior
            .as_ref()
            .map(|s| s.entries.values().cloned().collect())
            .unwrap_or_default();

        let mut snapshot = WorldInfoSnapshot {
            version: expected_version + 1,
            ..Default::default()
        };

        // unchanged entries keep their original metadata so version history
        // stays meaningful
        for entry in changes.unchanged {
            let carried = prior
                .as_ref()
                .and_then(|s| s.entries.get(&entry.entry_id))
                .cloned()
                .unwrap_or(entry);
            outcomes.push(ItemOutcome::Unchanged {
                entry_id: carried.entry_id.clone(),
            });
            snapshot.insert(carried);
        }

        for entry in changes.added {
            let dedup = self
                .dedup
                .deduplicate_entity(session_id, &entry, &existing_entries)
                .await;
            if dedup.is_duplicate {
                info!(
                    session_id,
                    entry_id = %entry.entry_id,
                    matched = ?dedup.matched_entity_id,
                    "skipping duplicate entry"
                );
                outcomes.push(ItemOutcome::SkippedDuplicate {
                    entry_id: entry.entry_id,
                    dedup,
                });
                continue;
            }

            let record = StoredRecord::open(entry.clone(), now);
            let record_id = record.id;
            match self.store.create_record(record).await {
                Ok(()) => {
                    outcomes.push(ItemOutcome::Created {
                        entry_id: entry.entry_id.clone(),
                        record_id,
                    });
                    existing_entries.push(entry.clone());
                    snapshot.insert(entry);
                }
                Err(e) => {
                    warn!(entry_id = %entry.entry_id, error = %e, "record creation failed");
                    outcomes.push(ItemOutcome::Failed {
                        entry_id: entry.entry_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        for difference in changes.modified {
            let Some(old_record_id) = open_record_id(&difference.entry_id) else {
                warn!(
                    entry_id = %difference.entry_id,
                    "no open record found for modified entry"
                );
                outcomes.push(ItemOutcome::Failed {
                    entry_id: difference.entry_id.clone(),
                    error: format!("no open record for {}", difference.entry_id),
                });
                // keep the prior revision visible rather than dropping it
                snapshot.insert(difference.old);
                continue;
            };

            let mut successor = difference.new;
            successor.version = difference.old.version + 1;
            successor.created_at = difference.old.created_at;
            successor.updated_at = now;

            // open before close: readers briefly see two active versions,
            // never zero
            let record = StoredRecord::open(successor.clone(), now);
            let new_record_id = record.id;
            if let Err(e) = self.store.create_record(record).await {
                warn!(entry_id = %successor.entry_id, error = %e, "successor creation failed");
                outcomes.push(ItemOutcome::Failed {
                    entry_id: successor.entry_id,
                    error: e.to_string(),
                });
                snapshot.insert(difference.old);
                continue;
            }

            match self
                .store
                .update_record(old_record_id, RecordPatch::superseded(now, new_record_id))
                .await
            {
                Ok(()) => {
                    outcomes.push(ItemOutcome::Superseded {
                        entry_id: successor.entry_id.clone(),
                        old_record_id,
                        new_record_id,
                        version: successor.version,
                    });
                }
                Err(e) => {
                    warn!(entry_id = %successor.entry_id, error = %e, "supersede close failed");
                    outcomes.push(ItemOutcome::Failed {
                        entry_id: successor.entry_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
            // the successor record exists either way
            snapshot.insert(successor);
        }

        for entry in changes.removed {
            let Some(record_id) = open_record_id(&entry.entry_id) else {
                warn!(entry_id = %entry.entry_id, "no open record found for removed entry");
                outcomes.push(ItemOutcome::Failed {
                    entry_id: entry.entry_id.clone(),
                    error: format!("no open record for {}", entry.entry_id),
                });
                continue;
            };

            match self
                .store
                .update_record(record_id, RecordPatch::deleted(now, "removed from source text"))
                .await
            {
                Ok(()) => outcomes.push(ItemOutcome::Closed {
                    entry_id: entry.entry_id,
                    record_id,
                }),
                Err(e) => outcomes.push(ItemOutcome::Failed {
                    entry_id: entry.entry_id,
                    error: e.to_string(),
                }),
            }
        }

        let version = snapshot.version;
        self.snapshots
            .put_world_info(session_id, snapshot, expected_version)
            .await?;

        info!(
            session_id,
            version,
            items = outcomes.len(),
            failures = outcomes.iter().filter(|o| o.is_failure()).count(),
            "world info cycle committed"
        );

        Ok(WorldInfoReport {
            outcomes,
            version,
            changed: true,
        })
    }

    // ── Chat history ──────────────────────────────────────────────────────────

    /// Run one chat-history ingestion cycle for a session.
    pub async fn ingest_chat(
        &self,
        session_id: &str,
        candidates: Vec<CandidateMessage>,
    ) -> Result<ChatReport> {
        let new_messages = assign_messages(candidates, session_id);

        let prior = self.snapshots.chat_history(session_id).await?;
        let expected_version = prior.as_ref().map_or(0, |s| s.version);

        let change = diff_chat_history(prior.as_ref(), &new_messages);
        debug!(session_id, change = ?change_kind(&change), "chat diff computed");

        let rebuilt = match &change {
            ChatChange::NoChange { .. } => {
                return Ok(ChatReport {
                    change,
                    version: expected_version,
                    changed: false,
                });
            }
            ChatChange::Append { new_messages, .. } => {
                let mut messages = prior.as_ref().map_or(Vec::new(), |s| s.messages.clone());
                messages.extend(new_messages.iter().cloned());
                messages
            }
            ChatChange::Truncation {
                removed_messages_count,
            } => {
                let messages = prior.as_ref().map_or(&[][..], |s| &s.messages);
                let keep = messages.len().saturating_sub(*removed_messages_count);
                messages[..keep].to_vec()
            }
            ChatChange::Modification { edits, .. } => {
                let old = prior.as_ref().map_or(&[][..], |s| &s.messages);
                apply_edits(old, edits, &new_messages)
            }
        };

        let snapshot = ChatHistorySnapshot::from_messages(rebuilt, expected_version + 1);
        let version = snapshot.version;
        self.snapshots
            .put_chat_history(session_id, snapshot, expected_version)
            .await?;

        info!(session_id, version, "chat cycle committed");

        Ok(ChatReport {
            change,
            version,
            changed: true,
        })
    }
}

/// Rebuild a message list from a positional diff.
///
/// Untouched positions carry the old message; added and modified positions
/// take the new side. The rebuilt sequence's hashes equal the new parse's.
fn apply_edits(
    old: &[ChatMessage],
    edits: &[MessageEdit],
    new_messages: &[ChatMessage],
) -> Vec<ChatMessage> {
    let mut rebuilt: Vec<ChatMessage> = Vec::with_capacity(new_messages.len());

    for i in 0..new_messages.len() {
        let edit = edits.iter().find(|e| edit_index(e) == i);
        match edit {
            Some(MessageEdit::Added { message, .. }) => rebuilt.push(message.clone()),
            Some(MessageEdit::Modified { new, .. }) => rebuilt.push(new.clone()),
            Some(MessageEdit::Removed { .. }) | None => {
                // untouched or (impossibly) removed within the new range;
                // fall back to the matching source
                if let Some(msg) = old.get(i) {
                    rebuilt.push(msg.clone());
                } else {
                    rebuilt.push(new_messages[i].clone());
                }
            }
        }
    }

    rebuilt
}

fn edit_index(edit: &MessageEdit) -> usize {
    match edit {
        MessageEdit::Added { index, .. }
        | MessageEdit::Removed { index }
        | MessageEdit::Modified { index, .. } => *index,
    }
}

fn change_kind(change: &ChatChange) -> &'static str {
    match change {
        ChatChange::NoChange { .. } => "no_change",
        ChatChange::Append { .. } => "append",
        ChatChange::Truncation { .. } => "truncation",
        ChatChange::Modification { .. } => "modification",
    }
}
