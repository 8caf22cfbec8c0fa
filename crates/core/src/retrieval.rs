//! Retrieval trait: the external retrieval-augmented-generation service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::RetrievalError;

/// A passage returned by the retrieval service, ranked by relevance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// The passage text
    pub content: String,

    /// Human-readable source label (filename, channel, ticket, ...)
    #[serde(default)]
    pub source: String,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// The retrieval service.
///
/// Results are in relevance order, most relevant first. Failures are
/// surfaced as [`RetrievalError`]; the memory coordinator turns them into
/// an empty list.
#[async_trait]
pub trait RetrievalService: Send + Sync {
    async fn query(
        &self,
        project_id: &str,
        query_text: &str,
        top_k: usize,
    ) -> std::result::Result<Vec<RetrievedChunk>, RetrievalError>;
}

/// A retrieval service that never finds anything.
pub struct NoopRetrieval;

#[async_trait]
impl RetrievalService for NoopRetrieval {
    async fn query(
        &self,
        _project_id: &str,
        _query_text: &str,
        _top_k: usize,
    ) -> std::result::Result<Vec<RetrievedChunk>, RetrievalError> {
        Ok(Vec::new())
    }
}
