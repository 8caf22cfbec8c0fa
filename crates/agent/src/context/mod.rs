//! Layered context assembly.
//!
//! | Layer | Source | Trim Strategy |
//! |-------|--------|---------------|
//! | 1. Hard Facts | Fact store, active only | Cut at budget with marker |
//! | 2. Summary | Latest compacted summary | Cut at budget with marker |
//! | 3. Recent Turns | Last N turns | Per-turn cap, then cut at budget |
//! | 4. Retrieval | Retrieved chunks, ranked | Stop at the first chunk over budget |

pub mod assembler;
pub mod token;

pub use assembler::{
    AssemblyReport, AssemblySettings, ContextAssembler, LayerBudgets, LayerStats, TRUNCATION_MARKER,
};
pub use token::{TokenEstimator, estimate_tokens};
