//! Store-side records with valid-time and supersession metadata.
//!
//! Simplified bitemporal model: each record carries a valid-time interval
//! (`valid_from` / `valid_until`) plus an explicit status; there is no
//! separate transaction-time axis. Closed records are retained forever.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entry::{Entry, EntryStatus};

/// A versioned store record wrapping one [`Entry`] revision.
///
/// Invariant: for a given `(session_id, entry_id)` at most one record is
/// simultaneously `status == Active` and `valid_until == None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub entry: Entry,
    /// Start of the validity interval.
    pub valid_from: DateTime<Utc>,
    /// End of the validity interval; `None` means currently valid.
    pub valid_until: Option<DateTime<Utc>>,
    /// The record that replaced this one, when superseded.
    pub superseded_by: Option<Uuid>,
}

impl StoredRecord {
    /// Open a fresh record for an entry revision.
    pub fn open(entry: Entry, valid_from: DateTime<Utc>) -> Self {
        StoredRecord {
            id: Uuid::new_v4(),
            entry,
            valid_from,
            valid_until: None,
            superseded_by: None,
        }
    }

    /// Whether this record is the currently-valid revision.
    pub fn is_open(&self) -> bool {
        self.entry.status == EntryStatus::Active && self.valid_until.is_none()
    }
}

/// Field updates applied to an existing record by id.
///
/// This is the only mutation the store supports besides creation — there is
/// deliberately no delete operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    pub valid_until: Option<DateTime<Utc>>,
    pub status: Option<EntryStatus>,
    pub status_reason: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub superseded_by: Option<Uuid>,
}

impl RecordPatch {
    /// Patch closing a record because its entry vanished from the source.
    pub fn deleted(at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        RecordPatch {
            valid_until: Some(at),
            status: Some(EntryStatus::Deleted),
            status_reason: Some(reason.into()),
            deleted_at: Some(at),
            superseded_by: None,
        }
    }

    /// Patch closing a record because a newer revision replaced it.
    pub fn superseded(at: DateTime<Utc>, by: Uuid) -> Self {
        RecordPatch {
            valid_until: Some(at),
            status: Some(EntryStatus::Superseded),
            status_reason: Some("superseded by newer revision".to_string()),
            deleted_at: None,
            superseded_by: Some(by),
        }
    }

    /// Apply this patch to a record in place.
    pub fn apply(&self, record: &mut StoredRecord) {
        if let Some(until) = self.valid_until {
            record.valid_until = Some(until);
        }
        if let Some(status) = self.status {
            record.entry.status = status;
        }
        if let Some(reason) = &self.status_reason {
            record.entry.status_reason = Some(reason.clone());
        }
        if let Some(deleted_at) = self.deleted_at {
            record.entry.deleted_at = Some(deleted_at);
        }
        if let Some(by) = self.superseded_by {
            record.superseded_by = Some(by);
        }
    }
}
