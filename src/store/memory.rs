//! In-memory [`TemporalStore`] used in tests and single-process deployments.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::errors::{Result, SyncError};
use crate::models::{EntryKind, RecordPatch, StoredRecord};

use super::TemporalStore;

/// Keeps every record revision in a map; nothing is ever removed.
#[derive(Debug, Default)]
pub struct InMemoryTemporalStore {
    records: RwLock<BTreeMap<Uuid, StoredRecord>>,
}

impl InMemoryTemporalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of record revisions held, open and closed.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl TemporalStore for InMemoryTemporalStore {
    async fn create_record(&self, record: StoredRecord) -> Result<()> {
        self.records.write().insert(record.id, record);
        Ok(())
    }

    async fn update_record(&self, id: Uuid, patch: RecordPatch) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| SyncError::RecordNotFound(id.to_string()))?;
        patch.apply(record);
        Ok(())
    }

    async fn active_records(
        &self,
        session_id: &str,
        kind: Option<&EntryKind>,
    ) -> Result<Vec<StoredRecord>> {
        let records = self.records.read();
        Ok(records
            .values()
            .filter(|r| r.is_open() && r.entry.session_id == session_id)
            .filter(|r| kind.map_or(true, |k| &r.entry.kind == k))
            .cloned()
            .collect())
    }

    async fn record(&self, id: Uuid) -> Result<Option<StoredRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }
}
