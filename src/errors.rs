//! Error types for loresync.

/// Alias for Results returning [`SyncError`].
pub type Result<T> = std::result::Result<T, SyncError>;

/// Top-level error type for loresync.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Judge error: {0}")]
    Judge(#[from] JudgeError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Snapshot version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },
}

impl SyncError {
    /// Whether the caller should retry the ingestion cycle against a fresh
    /// snapshot read. Version conflicts and missing supersession targets are
    /// ordinary races under concurrent writers, not terminal failures.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::VersionConflict { .. } | SyncError::RecordNotFound(_)
        )
    }
}

/// Similarity-judge specific errors.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("Rate limited")]
    RateLimit,

    #[error("Model refused to respond")]
    Refusal,

    #[error("Empty response from judge")]
    EmptyResponse,

    #[error("Authentication failed")]
    Authentication,

    #[error("Judge call timed out")]
    Timeout,

    #[error("API error: HTTP {status} — {message}")]
    Api { status: u16, message: String },
}
