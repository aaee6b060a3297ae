//! Per-session snapshot persistence with optimistic concurrency.
//!
//! Snapshots are keyed by session id; sessions share no mutable state. A
//! writer reads the snapshot at version `N`, computes a new value, and
//! commits it with `expected_version = N`. A stored version other than `N`
//! at commit time is a retryable [`SyncError::VersionConflict`], never
//! grounds for silent overwrite. A missing snapshot has implicit version 0.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::errors::{Result, SyncError};
use crate::models::{ChatHistorySnapshot, WorldInfoSnapshot};

/// Storage interface for per-session world-info and chat snapshots.
#[allow(async_fn_in_trait)]
pub trait SnapshotRepository: Send + Sync {
    async fn world_info(&self, session_id: &str) -> Result<Option<WorldInfoSnapshot>>;

    /// Commit a world-info snapshot read at `expected_version`.
    async fn put_world_info(
        &self,
        session_id: &str,
        snapshot: WorldInfoSnapshot,
        expected_version: u64,
    ) -> Result<()>;

    async fn chat_history(&self, session_id: &str) -> Result<Option<ChatHistorySnapshot>>;

    /// Commit a chat snapshot read at `expected_version`.
    async fn put_chat_history(
        &self,
        session_id: &str,
        snapshot: ChatHistorySnapshot,
        expected_version: u64,
    ) -> Result<()>;
}

/// In-memory repository for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemorySnapshotRepository {
    world_info: RwLock<BTreeMap<String, WorldInfoSnapshot>>,
    chat: RwLock<BTreeMap<String, ChatHistorySnapshot>>,
}

impl InMemorySnapshotRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_version(found: u64, expected: u64) -> Result<()> {
    if found != expected {
        return Err(SyncError::VersionConflict { expected, found });
    }
    Ok(())
}

impl SnapshotRepository for InMemorySnapshotRepository {
    async fn world_info(&self, session_id: &str) -> Result<Option<WorldInfoSnapshot>> {
        Ok(self.world_info.read().get(session_id).cloned())
    }

    async fn put_world_info(
        &self,
        session_id: &str,
        snapshot: WorldInfoSnapshot,
        expected_version: u64,
    ) -> Result<()> {
        let mut map = self.world_info.write();
        let found = map.get(session_id).map_or(0, |s| s.version);
        check_version(found, expected_version)?;
        map.insert(session_id.to_string(), snapshot);
        Ok(())
    }

    async fn chat_history(&self, session_id: &str) -> Result<Option<ChatHistorySnapshot>> {
        Ok(self.chat.read().get(session_id).cloned())
    }

    async fn put_chat_history(
        &self,
        session_id: &str,
        snapshot: ChatHistorySnapshot,
        expected_version: u64,
    ) -> Result<()> {
        let mut map = self.chat.write();
        let found = map.get(session_id).map_or(0, |s| s.version);
        check_version(found, expected_version)?;
        map.insert(session_id.to_string(), snapshot);
        Ok(())
    }
}
