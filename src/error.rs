// Engine and store error types

use thiserror::Error;

/// Failure reading from a collaborator (sample store or entity directory).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected before any store access.
    #[error("invalid query: {0}")]
    Validation(String),
    #[error("sample store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
    #[error("entity directory unavailable: {0}")]
    DirectoryUnavailable(#[source] StoreError),
    #[error("query cancelled")]
    Cancelled,
    #[error("query deadline exceeded")]
    DeadlineExceeded,
    #[error("timeline of {rows} rows exceeds the configured ceiling of {limit}")]
    ResultTooLarge { rows: usize, limit: usize },
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the same query may succeed when retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::StoreUnavailable(_)
                | EngineError::DirectoryUnavailable(_)
                | EngineError::DeadlineExceeded
        )
    }
}
