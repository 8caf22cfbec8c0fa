//! Subcommand implementations and the wiring they share.

pub mod compact;
pub mod config_cmd;
pub mod context;
pub mod facts;
pub mod resolve;
pub mod turn;

use std::sync::Arc;

use chiefops_agent::{
    AssemblySettings, CompactionSettings, LayerBudgets, MemoryCoordinator, MemorySettings,
    TokenEstimator,
};
use chiefops_config::AppConfig;
use chiefops_core::retrieval::NoopRetrieval;
use chiefops_core::store::PersistenceStore;
use chiefops_memory::InMemoryStore;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}").into())
}

/// Open the store named by `[storage]`.
pub async fn open_store(
    config: &AppConfig,
) -> Result<Arc<dyn PersistenceStore>, Box<dyn std::error::Error>> {
    match config.storage.backend.as_str() {
        "in_memory" => {
            tracing::warn!("Using the in_memory backend; nothing outlives this command");
            Ok(Arc::new(InMemoryStore::new()))
        }
        #[cfg(feature = "sqlite")]
        _ => {
            let path = config.storage.db_path();
            let store = chiefops_memory::SqliteStore::open(&path).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        other => Err(format!("storage backend '{other}' is not compiled in").into()),
    }
}

pub fn memory_settings(config: &AppConfig) -> MemorySettings {
    let memory = &config.memory;
    MemorySettings {
        compaction: CompactionSettings {
            recent_window: memory.recent_window,
            compaction_trigger: memory.compaction_trigger,
            extractive_chars_per_turn: memory.extractive_chars_per_turn,
        },
        assembly: AssemblySettings {
            budgets: LayerBudgets {
                facts: memory.facts_budget_tokens,
                summary: memory.summary_budget_tokens,
                recent_turns: memory.turns_budget_tokens,
                retrieval: memory.retrieval_budget_tokens,
            },
            estimator: TokenEstimator::new(memory.chars_per_token),
            recent_window: memory.recent_window,
            turn_char_cap: memory.turn_char_cap,
        },
        min_fact_confidence: memory.min_fact_confidence,
        top_k: config.retrieval.top_k,
    }
}

/// A coordinator over the configured store. No retrieval service is
/// wired into the CLI.
pub async fn coordinator(
    config: &AppConfig,
) -> Result<MemoryCoordinator, Box<dyn std::error::Error>> {
    let store = open_store(config).await?;
    Ok(MemoryCoordinator::with_settings(
        store,
        Arc::new(NoopRetrieval),
        memory_settings(config),
    ))
}
