//! Bitemporal record store.
//!
//! The engine owns the write side only: it creates records, patches their
//! lifecycle fields, and reads back the active set. It never issues a hard
//! delete; disappearance is modeled by closing the valid-time interval.

mod memory;

pub use memory::InMemoryTemporalStore;

use uuid::Uuid;

use crate::errors::Result;
use crate::models::{EntryKind, RecordPatch, StoredRecord};

/// Write-side interface to the versioned record store.
#[allow(async_fn_in_trait)]
pub trait TemporalStore: Send + Sync {
    /// Persist a newly opened record.
    async fn create_record(&self, record: StoredRecord) -> Result<()>;

    /// Patch lifecycle fields of an existing record.
    ///
    /// Returns [`crate::SyncError::RecordNotFound`] when `id` is unknown,
    /// which callers treat as a retryable conflict.
    async fn update_record(&self, id: Uuid, patch: RecordPatch) -> Result<()>;

    /// All records for a session that are active and open-ended, optionally
    /// filtered by entry kind.
    async fn active_records(
        &self,
        session_id: &str,
        kind: Option<&EntryKind>,
    ) -> Result<Vec<StoredRecord>>;

    /// Fetch one record by id.
    async fn record(&self, id: Uuid) -> Result<Option<StoredRecord>>;
}
