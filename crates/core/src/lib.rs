//! # ChiefOps Core
//!
//! Domain types, collaborator traits, and error definitions for the ChiefOps
//! conversational memory subsystem. This crate has **no framework
//! dependencies**: it defines the records the memory pipeline works on and
//! the capabilities it consumes from the layers around it.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`PersistenceStore`] for facts, turns and summaries
//! - [`TextGenerator`] / [`StructuredGenerator`] for the AI model
//! - [`RetrievalService`] for retrieval-augmented chunks
//!
//! Implementations are injected by the composing application, so the
//! memory pipeline never reaches for process-wide clients.

pub mod error;
pub mod fact;
pub mod conversation;
pub mod person;
pub mod generation;
pub mod retrieval;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{GenerationError, RetrievalError, StoreError};
pub use fact::{FactCategory, FactFilter, HardFact, NewFact};
pub use conversation::{CompactedSummary, ConversationTurn, Role};
pub use person::{MergedPerson, RawPersonRecord, SourceRef};
pub use generation::{Generation, OfflineGenerator, StructuredGenerator, TextGenerator};
pub use retrieval::{NoopRetrieval, RetrievalService, RetrievedChunk};
pub use store::{PersistenceStore, SortOrder};
