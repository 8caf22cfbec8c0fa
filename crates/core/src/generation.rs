//! Generation traits: the abstraction over the AI model.
//!
//! The memory pipeline needs two capabilities: free-text generation (for
//! summarizing old turns) and schema-constrained generation (for extracting
//! facts). Both may fail; callers in the core always absorb the failure.

use async_trait::async_trait;
use crate::error::GenerationError;

/// Free-text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for `prompt`, optionally steered by a system prompt.
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> std::result::Result<String, GenerationError>;
}

/// Schema-constrained generation.
///
/// Implementations return a JSON value conforming to `schema`. Output that
/// does not conform should be reported as [`GenerationError::Malformed`].
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
        system_prompt: Option<&str>,
    ) -> std::result::Result<serde_json::Value, GenerationError>;
}

/// A model that offers both capabilities.
pub trait Generation: TextGenerator + StructuredGenerator {}

impl<T: TextGenerator + StructuredGenerator + ?Sized> Generation for T {}

/// A generator with no model behind it.
///
/// Every call reports [`GenerationError::Unavailable`], which drives the
/// core onto its fallbacks: extractive summaries and no fact extraction.
pub struct OfflineGenerator;

#[async_trait]
impl TextGenerator for OfflineGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _system_prompt: Option<&str>,
    ) -> std::result::Result<String, GenerationError> {
        Err(GenerationError::Unavailable("no model configured".into()))
    }
}

#[async_trait]
impl StructuredGenerator for OfflineGenerator {
    async fn generate_structured(
        &self,
        _prompt: &str,
        _schema: &serde_json::Value,
        _system_prompt: Option<&str>,
    ) -> std::result::Result<serde_json::Value, GenerationError> {
        Err(GenerationError::Unavailable("no model configured".into()))
    }
}
