//! Per-turn orchestration of the memory pipeline.
//!
//! Before the model answers, [`MemoryCoordinator::get_context`] gathers
//! retrieval chunks, compacts if due and assembles the context. After the
//! model answers, [`MemoryCoordinator::process_turn`] extracts facts and
//! re-checks compaction. Neither lets an upstream failure escape; only
//! storage errors propagate.

use crate::compactor::{CompactionSettings, Compactor};
use crate::context::{AssemblyReport, AssemblySettings, ContextAssembler};
use crate::facts::{FactStore, MIN_EXTRACTION_CONFIDENCE};
use chiefops_core::conversation::{ConversationTurn, Role};
use chiefops_core::error::StoreError;
use chiefops_core::generation::{Generation, TextGenerator};
use chiefops_core::retrieval::RetrievalService;
use chiefops_core::store::PersistenceStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default number of retrieval chunks requested per query.
pub const DEFAULT_TOP_K: usize = 5;

/// Tunables for every component the coordinator owns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySettings {
    pub compaction: CompactionSettings,
    pub assembly: AssemblySettings,
    pub min_fact_confidence: f32,
    pub top_k: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            compaction: CompactionSettings::default(),
            assembly: AssemblySettings::default(),
            min_fact_confidence: MIN_EXTRACTION_CONFIDENCE,
            top_k: DEFAULT_TOP_K,
        }
    }
}

pub struct MemoryCoordinator {
    store: Arc<dyn PersistenceStore>,
    facts: FactStore,
    compactor: Compactor,
    assembler: ContextAssembler,
    retrieval: Arc<dyn RetrievalService>,
    top_k: usize,
}

impl MemoryCoordinator {
    pub fn new(store: Arc<dyn PersistenceStore>, retrieval: Arc<dyn RetrievalService>) -> Self {
        Self::with_settings(store, retrieval, MemorySettings::default())
    }

    pub fn with_settings(
        store: Arc<dyn PersistenceStore>,
        retrieval: Arc<dyn RetrievalService>,
        settings: MemorySettings,
    ) -> Self {
        let facts = FactStore::new(store.clone()).with_min_confidence(settings.min_fact_confidence);
        Self {
            compactor: Compactor::new(store.clone(), settings.compaction),
            assembler: ContextAssembler::new(store.clone(), facts.clone(), settings.assembly),
            facts,
            store,
            retrieval,
            top_k: settings.top_k,
        }
    }

    pub fn facts(&self) -> &FactStore {
        &self.facts
    }

    pub fn compactor(&self) -> &Compactor {
        &self.compactor
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    /// Append a turn to the project's conversation.
    pub async fn record_turn(
        &self,
        project_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ConversationTurn, StoreError> {
        self.store.append_turn(project_id, role, content).await
    }

    /// Build the context for answering `query` in `project_id`.
    ///
    /// Compaction runs to completion before assembly so the summary layer
    /// is never stale.
    pub async fn get_context<G>(
        &self,
        project_id: &str,
        query: &str,
        generator: &G,
    ) -> Result<String, StoreError>
    where
        G: TextGenerator + ?Sized,
    {
        Ok(self.get_context_with_report(project_id, query, generator).await?.context)
    }

    /// Like [`Self::get_context`], with per-layer statistics.
    pub async fn get_context_with_report<G>(
        &self,
        project_id: &str,
        query: &str,
        generator: &G,
    ) -> Result<AssemblyReport, StoreError>
    where
        G: TextGenerator + ?Sized,
    {
        let chunks = self.retrieve(project_id, query).await;
        self.compactor.compact_if_due(project_id, generator).await?;
        self.assembler.assemble_with_report(project_id, query, &chunks).await
    }

    /// Post-response bookkeeping: extract facts, then re-check compaction.
    ///
    /// Never fails. Each step logs its own failure and the next step still
    /// runs.
    pub async fn process_turn<G>(&self, turn_content: &str, project_id: &str, generator: &G)
    where
        G: Generation + ?Sized,
    {
        match self
            .facts
            .extract_facts(turn_content, Some(project_id), generator)
            .await
        {
            Ok(facts) => debug!(project_id, extracted = facts.len(), "Fact extraction done"),
            Err(e) => warn!(project_id, "Fact extraction failed: {e}"),
        }

        if let Err(e) = self.compactor.compact_if_due(project_id, generator).await {
            warn!(project_id, "Post-turn compaction failed: {e}");
        }
    }

    /// Run [`Self::process_turn`] in the background.
    pub fn spawn_process_turn(
        self: &Arc<Self>,
        project_id: String,
        turn_content: String,
        generator: Arc<dyn Generation>,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator
                .process_turn(&turn_content, &project_id, generator.as_ref())
                .await;
        })
    }

    /// Retrieval chunk contents in rank order; empty on any failure.
    async fn retrieve(&self, project_id: &str, query: &str) -> Vec<String> {
        match self.retrieval.query(project_id, query, self.top_k).await {
            Ok(chunks) => chunks.into_iter().map(|c| c.content).collect(),
            Err(e) => {
                warn!(project_id, "Retrieval unavailable, continuing without documents: {e}");
                Vec::new()
            }
        }
    }
}
