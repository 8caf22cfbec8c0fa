//! Conversational memory for ChiefOps.
//!
//! Each conversation turn flows through the [`MemoryCoordinator`]:
//!
//! 1. **Retrieve** document chunks relevant to the query
//! 2. **Compact** older turns into the running summary when due
//! 3. **Assemble** facts, summary, recent turns and chunks into one context
//! 4. After the model replies, **extract** durable facts and re-check compaction
//!
//! Upstream failures (model, retrieval) are absorbed with a fallback and a
//! log line. Storage failures propagate.

pub mod compactor;
pub mod context;
pub mod coordinator;
pub mod facts;

pub use compactor::{CompactionSettings, CompactionState, Compactor};
pub use context::{
    AssemblyReport, AssemblySettings, ContextAssembler, LayerBudgets, LayerStats, TokenEstimator,
};
pub use coordinator::{MemoryCoordinator, MemorySettings};
pub use facts::{FactStore, Supersession};
