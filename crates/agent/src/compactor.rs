//! Progressive compaction of older conversation turns.
//!
//! Per project, compaction moves through three states:
//!
//! | State | Condition |
//! |-------|-----------|
//! | `Fresh` | no summary, compaction not due |
//! | `CompactionDue` | more than `compaction_trigger` turns after the high-water mark |
//! | `Compacted` | a summary exists and compaction is not due |
//!
//! The newest `recent_window` turns are never summarized. Each compaction
//! feeds the previous summary plus only the turns it did not cover into the
//! summarizer, so cost stays proportional to new turns.

use chiefops_core::conversation::{CompactedSummary, ConversationTurn};
use chiefops_core::error::StoreError;
use chiefops_core::generation::TextGenerator;
use chiefops_core::store::{PersistenceStore, SortOrder};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Turns always kept verbatim.
pub const RECENT_WINDOW: usize = 10;

/// Uncompacted turns tolerated before compaction is due.
pub const COMPACTION_TRIGGER: usize = 15;

/// Characters kept per turn by the extractive fallback.
pub const EXTRACTIVE_CHARS_PER_TURN: usize = 200;

const SUMMARY_SYSTEM_PROMPT: &str = "You maintain a running summary of a COO's conversation \
with their operations assistant. Preserve decisions, deadlines, owners, open questions and \
any corrections. Be concise and factual.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionSettings {
    pub recent_window: usize,
    pub compaction_trigger: usize,
    pub extractive_chars_per_turn: usize,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            recent_window: RECENT_WINDOW,
            compaction_trigger: COMPACTION_TRIGGER,
            extractive_chars_per_turn: EXTRACTIVE_CHARS_PER_TURN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionState {
    Fresh,
    CompactionDue,
    Compacted,
}

/// Summarizes turns that have fallen out of the recent window.
pub struct Compactor {
    store: Arc<dyn PersistenceStore>,
    settings: CompactionSettings,
    /// One lock per project so two compactions never race on the same
    /// summary. Entries live only while a compaction holds or awaits them.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Compactor {
    pub fn new(store: Arc<dyn PersistenceStore>, settings: CompactionSettings) -> Self {
        Self {
            store,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &CompactionSettings {
        &self.settings
    }

    /// Whether more than `compaction_trigger` turns sit after the last
    /// compacted turn.
    pub async fn needs_compaction(&self, project_id: &str) -> Result<bool, StoreError> {
        let trigger = self.settings.compaction_trigger as u64;
        let total = self.store.count_turns(project_id, 0).await?;
        if total <= trigger {
            return Ok(false);
        }

        let high_water = self.high_water_mark(project_id).await?;
        let uncompacted = self.store.count_turns(project_id, high_water).await?;
        Ok(uncompacted > trigger)
    }

    pub async fn state(&self, project_id: &str) -> Result<CompactionState, StoreError> {
        if self.needs_compaction(project_id).await? {
            return Ok(CompactionState::CompactionDue);
        }
        match self.store.get_summary(project_id).await? {
            Some(_) => Ok(CompactionState::Compacted),
            None => Ok(CompactionState::Fresh),
        }
    }

    /// Summarize every turn older than the recent window.
    ///
    /// Returns `None` when there is nothing new to summarize: the project
    /// has no more than `recent_window` turns, or the existing summary
    /// already covers every turn outside the window. A failing summarizer
    /// falls back to an extractive summary.
    pub async fn compact<G>(
        &self,
        project_id: &str,
        summarizer: &G,
    ) -> Result<Option<CompactedSummary>, StoreError>
    where
        G: TextGenerator + ?Sized,
    {
        let lock = self.project_lock(project_id);
        let result = {
            let _guard = lock.lock().await;
            self.compact_locked(project_id, summarizer).await
        };
        drop(lock);
        self.release_lock(project_id);
        result
    }

    async fn compact_locked<G>(
        &self,
        project_id: &str,
        summarizer: &G,
    ) -> Result<Option<CompactedSummary>, StoreError>
    where
        G: TextGenerator + ?Sized,
    {
        let turns = self
            .store
            .list_turns(project_id, SortOrder::Ascending, None)
            .await?;
        if turns.len() <= self.settings.recent_window {
            debug!(project_id, turns = turns.len(), "Nothing to compact below the recent window");
            return Ok(None);
        }

        let prefix = &turns[..turns.len() - self.settings.recent_window];
        let last_compacted_turn = prefix.last().map(|t| t.turn_number).unwrap_or(0);

        let previous = self.store.get_summary(project_id).await?;
        let covered = previous.as_ref().map(|s| s.last_compacted_turn).unwrap_or(0);
        if last_compacted_turn <= covered {
            debug!(project_id, covered, "Summary already covers the compactable prefix");
            return Ok(None);
        }

        let previous_text = previous.as_ref().map(|s| s.summary.as_str());
        let new_turns: Vec<&ConversationTurn> =
            prefix.iter().filter(|t| t.turn_number > covered).collect();

        let prompt = Self::summary_prompt(previous_text, &new_turns);
        let summary_text = match summarizer.generate(&prompt, Some(SUMMARY_SYSTEM_PROMPT)).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!(project_id, "Summarizer returned nothing; using extractive summary");
                self.extractive_summary(previous_text, &new_turns)
            }
            Err(e) => {
                warn!(project_id, "Summarizer failed, using extractive summary: {e}");
                self.extractive_summary(previous_text, &new_turns)
            }
        };

        let summary = CompactedSummary {
            project_id: project_id.to_string(),
            summary: summary_text,
            turns_compacted: prefix.len() as u64,
            last_compacted_turn,
            created_at: Utc::now(),
        };

        if !self.store.upsert_summary(&summary).await? {
            warn!(project_id, "A newer summary was stored concurrently; discarding this one");
            return Ok(None);
        }

        info!(
            project_id,
            new_turns = new_turns.len(),
            last_compacted_turn,
            "Compacted conversation"
        );
        Ok(Some(summary))
    }

    /// Compact only if [`Self::needs_compaction`] says so.
    pub async fn compact_if_due<G>(
        &self,
        project_id: &str,
        summarizer: &G,
    ) -> Result<Option<CompactedSummary>, StoreError>
    where
        G: TextGenerator + ?Sized,
    {
        if !self.needs_compaction(project_id).await? {
            return Ok(None);
        }
        self.compact(project_id, summarizer).await
    }

    async fn high_water_mark(&self, project_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .store
            .get_summary(project_id)
            .await?
            .map(|s| s.last_compacted_turn)
            .unwrap_or(0))
    }

    fn project_lock(&self, project_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Forget the project's lock once no compaction holds or awaits it.
    fn release_lock(&self, project_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks
            .get(project_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(project_id);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    fn summary_prompt(previous: Option<&str>, turns: &[&ConversationTurn]) -> String {
        let mut prompt = String::from(
            "Update the running summary with the new conversation turns below. \
             Return only the updated summary.\n\n",
        );
        if let Some(previous) = previous {
            prompt.push_str("Previous summary:\n");
            prompt.push_str(previous);
            prompt.push_str("\n\n");
        }
        prompt.push_str("New conversation turns:\n");
        for turn in turns {
            prompt.push_str(&turn.transcript_line());
            prompt.push('\n');
        }
        prompt
    }

    /// One truncated line per turn, after the previous summary if any.
    fn extractive_summary(&self, previous: Option<&str>, turns: &[&ConversationTurn]) -> String {
        let limit = self.settings.extractive_chars_per_turn;
        let mut lines: Vec<String> = Vec::with_capacity(turns.len() + 1);
        if let Some(previous) = previous {
            lines.push(previous.to_string());
        }
        for turn in turns {
            let content = crate::context::token::prefix_chars(&turn.content, limit);
            lines.push(format!("Turn {} ({}): {}", turn.turn_number, turn.role, content));
        }
        lines.join("\n")
    }
}
