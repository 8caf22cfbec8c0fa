//! PersistenceStore trait: durable storage for facts, turns and summaries.
//!
//! The store is a document-collection abstraction over three collections:
//! - `hard_facts`: insert, fetch by id, filtered find, deactivate
//! - `conversation_turns`: atomic append, count, ordered find with limit
//! - `compacted_summaries`: one row per project, replaced by upsert
//!
//! Every write is either a pure insert or an atomic single-document update,
//! so an abandoned operation never leaves two conflicting rows behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::conversation::{CompactedSummary, ConversationTurn, Role};
use crate::error::StoreError;
use crate::fact::{FactFilter, HardFact};

/// Sort direction for turn queries, by `turn_number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// The core PersistenceStore trait.
///
/// Implementations: in-memory (for testing), SQLite.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    // ── hard_facts ─────────────────────────────────────────────────────

    /// Insert a new fact. Fact ids are unique; existing facts are never replaced.
    async fn insert_fact(&self, fact: &HardFact) -> std::result::Result<(), StoreError>;

    /// Fetch a fact by id, active or not.
    async fn get_fact(&self, fact_id: &str) -> std::result::Result<Option<HardFact>, StoreError>;

    /// Find facts matching `filter`, ordered by `created_at` ascending
    /// (insertion order breaks ties).
    async fn find_facts(&self, filter: &FactFilter) -> std::result::Result<Vec<HardFact>, StoreError>;

    /// Mark a fact inactive and stamp `superseded_at`.
    ///
    /// Returns `false` when no fact has that id. Deactivating an inactive
    /// fact is a no-op that keeps its original timestamp.
    async fn deactivate_fact(
        &self,
        fact_id: &str,
        at: DateTime<Utc>,
    ) -> std::result::Result<bool, StoreError>;

    // ── conversation_turns ────────────────────────────────────────────

    /// Append a turn, atomically assigning the next gapless `turn_number`.
    async fn append_turn(
        &self,
        project_id: &str,
        role: Role,
        content: &str,
    ) -> std::result::Result<ConversationTurn, StoreError>;

    /// Count turns with `turn_number > after_turn` (pass 0 for all turns).
    async fn count_turns(&self, project_id: &str, after_turn: u64) -> std::result::Result<u64, StoreError>;

    /// List turns ordered by `turn_number`, optionally limited.
    async fn list_turns(
        &self,
        project_id: &str,
        order: SortOrder,
        limit: Option<usize>,
    ) -> std::result::Result<Vec<ConversationTurn>, StoreError>;

    // ── compacted_summaries ───────────────────────────────────────────

    /// The current summary for a project, if any.
    async fn get_summary(&self, project_id: &str) -> std::result::Result<Option<CompactedSummary>, StoreError>;

    /// Replace the project's summary.
    ///
    /// The write is skipped (returning `false`) when the stored summary
    /// already covers a later turn, so `last_compacted_turn` only moves forward.
    async fn upsert_summary(&self, summary: &CompactedSummary) -> std::result::Result<bool, StoreError>;
}
