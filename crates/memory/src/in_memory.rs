//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chiefops_core::conversation::{CompactedSummary, ConversationTurn, Role};
use chiefops_core::error::StoreError;
use chiefops_core::fact::{FactFilter, HardFact};
use chiefops_core::store::{PersistenceStore, SortOrder};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Collections {
    /// Insertion order doubles as the created_at tie-breaker.
    facts: Vec<HardFact>,
    turns: HashMap<String, Vec<ConversationTurn>>,
    summaries: HashMap<String, CompactedSummary>,
}

/// A store that keeps every collection in process memory.
/// Useful for testing and sessions where persistence isn't needed.
///
/// All writes happen under one write lock, which gives the per-document
/// atomicity the memory pipeline relies on.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Collections>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Collections::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
    fn name(&self) -> &str { "in_memory" }

    async fn insert_fact(&self, fact: &HardFact) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.facts.iter().any(|f| f.fact_id == fact.fact_id) {
            return Err(StoreError::QueryFailed(format!(
                "duplicate fact_id {}",
                fact.fact_id
            )));
        }
        inner.facts.push(fact.clone());
        Ok(())
    }

    async fn get_fact(&self, fact_id: &str) -> Result<Option<HardFact>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.facts.iter().find(|f| f.fact_id == fact_id).cloned())
    }

    async fn find_facts(&self, filter: &FactFilter) -> Result<Vec<HardFact>, StoreError> {
        let inner = self.inner.read().await;
        let mut facts: Vec<HardFact> = inner
            .facts
            .iter()
            .filter(|f| filter.matches(f))
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps
        facts.sort_by_key(|f| f.created_at);
        Ok(facts)
    }

    async fn deactivate_fact(&self, fact_id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.facts.iter_mut().find(|f| f.fact_id == fact_id) {
            Some(fact) => {
                if fact.active {
                    fact.active = false;
                    fact.superseded_at = Some(at);
                    fact.updated_at = at;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_turn(
        &self,
        project_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ConversationTurn, StoreError> {
        let mut inner = self.inner.write().await;
        let turns = inner.turns.entry(project_id.to_string()).or_default();
        let turn = ConversationTurn {
            project_id: project_id.to_string(),
            turn_number: turns.len() as u64 + 1,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        turns.push(turn.clone());
        Ok(turn)
    }

    async fn count_turns(&self, project_id: &str, after_turn: u64) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .turns
            .get(project_id)
            .map(|turns| turns.iter().filter(|t| t.turn_number > after_turn).count() as u64)
            .unwrap_or(0))
    }

    async fn list_turns(
        &self,
        project_id: &str,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let inner = self.inner.read().await;
        let Some(turns) = inner.turns.get(project_id) else {
            return Ok(Vec::new());
        };
        let limit = limit.unwrap_or(usize::MAX);
        // Turns are appended in turn_number order
        let selected = match order {
            SortOrder::Ascending => turns.iter().take(limit).cloned().collect(),
            SortOrder::Descending => turns.iter().rev().take(limit).cloned().collect(),
        };
        Ok(selected)
    }

    async fn get_summary(&self, project_id: &str) -> Result<Option<CompactedSummary>, StoreError> {
        Ok(self.inner.read().await.summaries.get(project_id).cloned())
    }

    async fn upsert_summary(&self, summary: &CompactedSummary) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.summaries.get(&summary.project_id) {
            if existing.last_compacted_turn > summary.last_compacted_turn {
                return Ok(false);
            }
        }
        inner
            .summaries
            .insert(summary.project_id.clone(), summary.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chiefops_core::fact::{FactCategory, NewFact};

    fn summary(project: &str, last: u64) -> CompactedSummary {
        CompactedSummary {
            project_id: project.into(),
            summary: format!("covers 1..={last}"),
            turns_compacted: last,
            last_compacted_turn: last,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn turns_are_numbered_per_project() {
        let store = InMemoryStore::new();
        let a1 = store.append_turn("alpha", Role::User, "hi").await.unwrap();
        let b1 = store.append_turn("beta", Role::User, "hi").await.unwrap();
        let a2 = store.append_turn("alpha", Role::Assistant, "hello").await.unwrap();

        assert_eq!(a1.turn_number, 1);
        assert_eq!(b1.turn_number, 1);
        assert_eq!(a2.turn_number, 2);
        assert_eq!(store.count_turns("alpha", 0).await.unwrap(), 2);
        assert_eq!(store.count_turns("alpha", 1).await.unwrap(), 1);
        assert_eq!(store.count_turns("gamma", 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_turns_respects_order_and_limit() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.append_turn("alpha", Role::User, &format!("m{i}")).await.unwrap();
        }

        let newest: Vec<u64> = store
            .list_turns("alpha", SortOrder::Descending, Some(2))
            .await
            .unwrap()
            .iter()
            .map(|t| t.turn_number)
            .collect();
        assert_eq!(newest, vec![5, 4]);

        let all = store.list_turns("alpha", SortOrder::Ascending, None).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].content, "m0");
    }

    #[tokio::test]
    async fn deactivate_stamps_once() {
        let store = InMemoryStore::new();
        let fact = HardFact::from_new(NewFact::new("Budget is $2M", FactCategory::Budget));
        store.insert_fact(&fact).await.unwrap();

        let first = Utc::now();
        assert!(store.deactivate_fact(&fact.fact_id, first).await.unwrap());
        assert!(store.deactivate_fact(&fact.fact_id, Utc::now()).await.unwrap());
        assert!(!store.deactivate_fact("missing", Utc::now()).await.unwrap());

        let stored = store.get_fact(&fact.fact_id).await.unwrap().unwrap();
        assert!(!stored.active);
        assert_eq!(stored.superseded_at, Some(first));
    }

    #[tokio::test]
    async fn duplicate_fact_id_rejected() {
        let store = InMemoryStore::new();
        let fact = HardFact::from_new(NewFact::new("x", FactCategory::Other));
        store.insert_fact(&fact).await.unwrap();
        assert!(store.insert_fact(&fact).await.is_err());
    }

    #[tokio::test]
    async fn summary_upsert_only_moves_forward() {
        let store = InMemoryStore::new();
        assert!(store.upsert_summary(&summary("alpha", 10)).await.unwrap());
        assert!(store.upsert_summary(&summary("alpha", 20)).await.unwrap());
        assert!(!store.upsert_summary(&summary("alpha", 15)).await.unwrap());

        let current = store.get_summary("alpha").await.unwrap().unwrap();
        assert_eq!(current.last_compacted_turn, 20);
        assert!(store.get_summary("beta").await.unwrap().is_none());
    }
}
