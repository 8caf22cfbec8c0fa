//! Error types for the ChiefOps memory domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator boundary has its own error type so that transient
//! upstream failures can never be confused with storage failures.

use thiserror::Error;

/// Failures of the persistence collaborator. These bubble to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Corrupt record in {collection}: {reason}")]
    Corrupt { collection: String, reason: String },
}

/// Failures of the AI generation collaborator.
///
/// Always absorbed by the core and turned into a fallback value.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Generation service unavailable: {0}")]
    Unavailable(String),

    #[error("Generation output did not match schema: {0}")]
    Malformed(String),
}

/// Failures of the retrieval collaborator.
///
/// Always absorbed by the core and turned into an empty chunk list.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Retrieval service unavailable: {0}")]
    Unavailable(String),

    #[error("Retrieval timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}
