//! Context assembly pipeline.
//!
//! Assembles a single context string from four layers, in priority order:
//!
//! 1. **Hard Facts**: active facts for the project, oldest first
//! 2. **Summary**: the latest compacted summary
//! 3. **Recent Turns**: the last `recent_window` turns, chronological
//! 4. **Retrieval Excerpts**: externally retrieved chunks, in rank order
//!
//! Each layer has its own token budget and is truncated independently;
//! truncation never spills from one layer into another.
//!
//! # Determinism
//!
//! Context assembly is deterministic: identical stored state and inputs
//! always produce identical output. No random or time-dependent logic is
//! used during assembly.

use crate::context::token::{self, TokenEstimator};
use crate::facts::FactStore;
use chiefops_core::conversation::{CompactedSummary, ConversationTurn};
use chiefops_core::error::StoreError;
use chiefops_core::fact::HardFact;
use chiefops_core::store::{PersistenceStore, SortOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Appended to a layer body cut at its budget.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Appended to the retrieval chunk that straddles the budget.
const EXCERPT_ELLIPSIS: &str = "...";

// ── Types ─────────────────────────────────────────────────────────────────

/// Per-layer token budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerBudgets {
    pub facts: usize,
    pub summary: usize,
    pub recent_turns: usize,
    pub retrieval: usize,
}

impl Default for LayerBudgets {
    fn default() -> Self {
        Self {
            facts: 2000,
            summary: 3000,
            recent_turns: 4000,
            retrieval: 3000,
        }
    }
}

impl LayerBudgets {
    /// Nominal total; a soft target, since layers are capped independently.
    pub fn total(&self) -> usize {
        self.facts + self.summary + self.recent_turns + self.retrieval
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblySettings {
    pub budgets: LayerBudgets,
    pub estimator: TokenEstimator,
    /// Turns shown verbatim in the recent-turns layer
    pub recent_window: usize,
    /// Per-turn character cap before the layer budget applies
    pub turn_char_cap: usize,
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            budgets: LayerBudgets::default(),
            estimator: TokenEstimator::default(),
            recent_window: crate::compactor::RECENT_WINDOW,
            turn_char_cap: 1000,
        }
    }
}

/// Statistics for a single context layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStats {
    /// Layer name.
    pub name: String,
    /// Characters in the rendered section (0 when omitted).
    pub chars: usize,
    /// Estimated tokens of the rendered section.
    pub estimated_tokens: usize,
    /// Items rendered, fully or partially.
    pub items_included: usize,
    /// Items available before budgeting.
    pub items_total: usize,
    /// Whether the layer was cut at its budget.
    pub truncated: bool,
}

/// The assembled context plus per-layer statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyReport {
    pub context: String,
    pub layers: Vec<LayerStats>,
}

impl AssemblyReport {
    pub fn layer(&self, name: &str) -> Option<&LayerStats> {
        self.layers.iter().find(|l| l.name == name)
    }
}

/// A rendered section before it is joined into the final context.
struct Section {
    text: String,
    items_included: usize,
    items_total: usize,
    truncated: bool,
}

impl Section {
    fn empty(items_total: usize) -> Self {
        Self {
            text: String::new(),
            items_included: 0,
            items_total,
            truncated: false,
        }
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Reads facts, summary and turns for a project and renders the context.
#[derive(Clone)]
pub struct ContextAssembler {
    store: Arc<dyn PersistenceStore>,
    facts: FactStore,
    settings: AssemblySettings,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn PersistenceStore>, facts: FactStore, settings: AssemblySettings) -> Self {
        Self {
            store,
            facts,
            settings,
        }
    }

    pub fn settings(&self) -> &AssemblySettings {
        &self.settings
    }

    /// Assemble the context string for `project_id`.
    ///
    /// Returns an empty string only when the project has no facts, no
    /// summary, no turns and no chunks were supplied.
    pub async fn assemble(
        &self,
        project_id: &str,
        query: &str,
        chunks: &[String],
    ) -> Result<String, StoreError> {
        Ok(self.assemble_with_report(project_id, query, chunks).await?.context)
    }

    /// Like [`Self::assemble`], with per-layer statistics.
    pub async fn assemble_with_report(
        &self,
        project_id: &str,
        query: &str,
        chunks: &[String],
    ) -> Result<AssemblyReport, StoreError> {
        let facts = self.facts.get_active_facts(Some(project_id)).await?;
        let summary = self.store.get_summary(project_id).await?;
        let mut turns = self
            .store
            .list_turns(project_id, SortOrder::Descending, Some(self.settings.recent_window))
            .await?;
        turns.reverse();

        let report = self.render(&facts, summary.as_ref(), &turns, chunks);
        debug!(
            project_id,
            query_chars = query.chars().count(),
            context_chars = report.context.chars().count(),
            "Assembled context"
        );
        Ok(report)
    }

    /// Render all layers from already-loaded data.
    pub fn render(
        &self,
        facts: &[HardFact],
        summary: Option<&CompactedSummary>,
        turns: &[ConversationTurn],
        chunks: &[String],
    ) -> AssemblyReport {
        let budgets = &self.settings.budgets;
        let estimator = &self.settings.estimator;

        let layers = [
            ("hard_facts", Self::render_facts_layer(facts, estimator.char_budget(budgets.facts))),
            ("summary", Self::render_summary_layer(summary, estimator.char_budget(budgets.summary))),
            (
                "recent_turns",
                Self::render_turns_layer(
                    turns,
                    self.settings.turn_char_cap,
                    estimator.char_budget(budgets.recent_turns),
                ),
            ),
            (
                "retrieval",
                Self::render_retrieval_layer(chunks, estimator.char_budget(budgets.retrieval)),
            ),
        ];

        let mut sections = Vec::new();
        let mut stats = Vec::with_capacity(layers.len());
        for (name, section) in layers {
            stats.push(LayerStats {
                name: name.into(),
                chars: section.text.chars().count(),
                estimated_tokens: estimator.estimate(&section.text),
                items_included: section.items_included,
                items_total: section.items_total,
                truncated: section.truncated,
            });
            if !section.text.is_empty() {
                sections.push(section.text);
            }
        }

        AssemblyReport {
            context: sections.join("\n\n"),
            layers: stats,
        }
    }

    // ── Private layer renderers ───────────────────────────────────────────

    fn render_facts_layer(facts: &[HardFact], max_chars: usize) -> Section {
        if facts.is_empty() {
            return Section::empty(0);
        }

        let body = facts
            .iter()
            .map(|f| format!("- [{}] {}", f.category, f.content))
            .collect::<Vec<_>>()
            .join("\n");
        let (body, truncated) = truncate_with_marker(&body, max_chars);

        Section {
            text: format!("## Hard Facts\n{body}"),
            items_included: facts.len(),
            items_total: facts.len(),
            truncated,
        }
    }

    fn render_summary_layer(summary: Option<&CompactedSummary>, max_chars: usize) -> Section {
        let Some(summary) = summary.filter(|s| !s.summary.trim().is_empty()) else {
            return Section::empty(0);
        };

        let (body, truncated) = truncate_with_marker(summary.summary.trim(), max_chars);
        Section {
            text: format!(
                "## Conversation Summary (turns 1-{})\n{body}",
                summary.last_compacted_turn
            ),
            items_included: 1,
            items_total: 1,
            truncated,
        }
    }

    fn render_turns_layer(turns: &[ConversationTurn], turn_char_cap: usize, max_chars: usize) -> Section {
        if turns.is_empty() {
            return Section::empty(0);
        }

        let body = turns
            .iter()
            .map(|t| {
                format!(
                    "**{}** (turn {}): {}",
                    t.role,
                    t.turn_number,
                    token::prefix_chars(&t.content, turn_char_cap)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let (body, truncated) = truncate_with_marker(&body, max_chars);

        Section {
            text: format!("## Recent Conversation\n{body}"),
            items_included: turns.len(),
            items_total: turns.len(),
            truncated,
        }
    }

    /// Chunks are added in rank order until the budget runs out. The chunk
    /// that crosses the budget is cut with an ellipsis and nothing after it
    /// is considered, even if a later chunk would fit. A boundary chunk with
    /// no room left for any of its text after its heading is dropped whole.
    fn render_retrieval_layer(chunks: &[String], max_chars: usize) -> Section {
        let chunks: Vec<&str> = chunks
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();
        if chunks.is_empty() {
            return Section::empty(0);
        }

        let mut used = 0;
        let mut blocks = Vec::new();
        let mut truncated = false;

        for (i, chunk) in chunks.iter().enumerate() {
            let heading = format!("### Excerpt {}\n", i + 1);
            let block_len = heading.chars().count() + chunk.chars().count();

            if used + block_len <= max_chars {
                blocks.push(format!("{heading}{chunk}"));
                used += block_len;
                continue;
            }

            truncated = true;
            let room = max_chars.saturating_sub(used + heading.chars().count());
            if room > 0 {
                blocks.push(format!(
                    "{heading}{}{EXCERPT_ELLIPSIS}",
                    token::prefix_chars(chunk, room)
                ));
            }
            break;
        }

        if blocks.is_empty() {
            return Section {
                truncated,
                ..Section::empty(chunks.len())
            };
        }

        Section {
            text: format!("## Relevant Documents\n{}", blocks.join("\n\n")),
            items_included: blocks.len(),
            items_total: chunks.len(),
            truncated,
        }
    }
}

/// Cut `text` to `max_chars` characters plus [`TRUNCATION_MARKER`].
fn truncate_with_marker(text: &str, max_chars: usize) -> (String, bool) {
    let prefix = token::prefix_chars(text, max_chars);
    if prefix.len() == text.len() {
        (text.to_string(), false)
    } else {
        (format!("{prefix}{TRUNCATION_MARKER}"), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chiefops_core::conversation::Role;
    use chiefops_core::fact::{FactCategory, NewFact};
    use chiefops_memory::InMemoryStore;
    use chrono::Utc;

    fn assembler_with(store: Arc<InMemoryStore>, settings: AssemblySettings) -> ContextAssembler {
        let facts = FactStore::new(store.clone());
        ContextAssembler::new(store, facts, settings)
    }

    fn assembler() -> (Arc<InMemoryStore>, ContextAssembler) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), assembler_with(store, AssemblySettings::default()))
    }

    fn fact(content: &str, category: FactCategory) -> HardFact {
        HardFact::from_new(NewFact::new(content, category))
    }

    fn turn(n: u64, role: Role, content: &str) -> ConversationTurn {
        ConversationTurn {
            project_id: "alpha".into(),
            turn_number: n,
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    fn tiny_retrieval_budget(tokens: usize) -> AssemblySettings {
        AssemblySettings {
            budgets: LayerBudgets {
                retrieval: tokens,
                ..LayerBudgets::default()
            },
            ..AssemblySettings::default()
        }
    }

    // ── Tests ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_project_yields_empty_context() {
        let (_store, asm) = assembler();
        let context = asm.assemble("alpha", "what's late?", &[]).await.unwrap();
        assert_eq!(context, "");
    }

    #[tokio::test]
    async fn fact_rendered_as_bullet() {
        let (store, asm) = assembler();
        FactStore::new(store.clone())
            .store_fact(NewFact::new("Launch moved to March 1", FactCategory::Deadline).in_project("alpha"))
            .await
            .unwrap();

        let context = asm.assemble("alpha", "when is launch?", &[]).await.unwrap();
        assert!(context.contains("- [deadline] Launch moved to March 1"));
        assert!(context.starts_with("## Hard Facts\n"));
    }

    #[tokio::test]
    async fn recent_turns_are_chronological_and_windowed() {
        let (store, asm) = assembler();
        for i in 1..=12 {
            store.append_turn("alpha", Role::User, &format!("msg {i}")).await.unwrap();
        }

        let report = asm.assemble_with_report("alpha", "q", &[]).await.unwrap();
        let context = &report.context;
        assert!(!context.contains("(turn 2):"));
        let third = context.find("**user** (turn 3): msg 3").unwrap();
        let twelfth = context.find("**user** (turn 12): msg 12").unwrap();
        assert!(third < twelfth);
        assert_eq!(report.layer("recent_turns").unwrap().items_included, 10);
    }

    #[tokio::test]
    async fn assembly_is_deterministic() {
        let (store, asm) = assembler();
        FactStore::new(store.clone())
            .store_fact(NewFact::new("Budget frozen", FactCategory::Budget))
            .await
            .unwrap();
        store.append_turn("alpha", Role::User, "status?").await.unwrap();
        let chunks = vec!["Q3 plan draft".to_string()];

        let first = asm.assemble("alpha", "status", &chunks).await.unwrap();
        let second = asm.assemble("alpha", "status", &chunks).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn sections_appear_in_priority_order() {
        let (_store, asm) = assembler();
        let summary = CompactedSummary {
            project_id: "alpha".into(),
            summary: "Earlier we discussed hiring.".into(),
            turns_compacted: 20,
            last_compacted_turn: 20,
            created_at: Utc::now(),
        };
        let report = asm.render(
            &[fact("Alpha is green", FactCategory::ProjectStatus)],
            Some(&summary),
            &[turn(21, Role::User, "And the budget?")],
            &["Budget sheet row 4".to_string()],
        );

        let c = &report.context;
        let facts = c.find("## Hard Facts").unwrap();
        let summary = c.find("## Conversation Summary (turns 1-20)").unwrap();
        let turns = c.find("## Recent Conversation").unwrap();
        let docs = c.find("## Relevant Documents").unwrap();
        assert!(facts < summary && summary < turns && turns < docs);
        assert!(c.contains("\n\n## Conversation Summary"));
    }

    #[test]
    fn facts_layer_truncated_with_marker() {
        let asm = assembler_with(
            Arc::new(InMemoryStore::new()),
            AssemblySettings {
                budgets: LayerBudgets {
                    facts: 5, // 20 chars
                    ..LayerBudgets::default()
                },
                ..AssemblySettings::default()
            },
        );
        let report = asm.render(
            &[fact(&"a".repeat(100), FactCategory::Risk)],
            None,
            &[],
            &[],
        );
        assert!(report.context.ends_with(TRUNCATION_MARKER));
        assert!(report.layer("hard_facts").unwrap().truncated);
        assert!(!report.context.contains(&"a".repeat(30)));
    }

    fn fact_summary_and_turn() -> (HardFact, CompactedSummary, ConversationTurn) {
        let summary = CompactedSummary {
            project_id: "alpha".into(),
            summary: "s".repeat(100),
            turns_compacted: 20,
            last_compacted_turn: 20,
            created_at: Utc::now(),
        };
        (
            fact("Hiring freeze until Q3", FactCategory::Decision),
            summary,
            turn(21, Role::User, &"t".repeat(100)),
        )
    }

    #[test]
    fn summary_layer_truncated_at_its_own_budget() {
        let asm = assembler_with(
            Arc::new(InMemoryStore::new()),
            AssemblySettings {
                budgets: LayerBudgets {
                    summary: 5, // 20 chars
                    ..LayerBudgets::default()
                },
                ..AssemblySettings::default()
            },
        );
        let (fact, summary, turn) = fact_summary_and_turn();

        let report = asm.render(&[fact], Some(&summary), &[turn], &[]);
        let c = &report.context;
        assert!(c.contains(&format!(
            "## Conversation Summary (turns 1-20)\n{}{TRUNCATION_MARKER}\n\n",
            "s".repeat(20)
        )));
        assert!(!c.contains(&"s".repeat(21)));
        assert!(report.layer("summary").unwrap().truncated);

        // Neighbouring layers keep their full content
        assert!(c.contains("- [decision] Hiring freeze until Q3"));
        assert!(c.contains(&format!("**user** (turn 21): {}", "t".repeat(100))));
        assert!(!report.layer("hard_facts").unwrap().truncated);
        assert!(!report.layer("recent_turns").unwrap().truncated);
    }

    #[test]
    fn turns_layer_truncated_at_its_own_budget() {
        let asm = assembler_with(
            Arc::new(InMemoryStore::new()),
            AssemblySettings {
                budgets: LayerBudgets {
                    recent_turns: 5, // 20 chars
                    ..LayerBudgets::default()
                },
                ..AssemblySettings::default()
            },
        );
        let (fact, summary, turn) = fact_summary_and_turn();

        let report = asm.render(&[fact], Some(&summary), &[turn], &[]);
        let c = &report.context;
        // "**user** (turn 21): " is exactly 20 chars
        assert!(c.ends_with(&format!("## Recent Conversation\n**user** (turn 21): {TRUNCATION_MARKER}")));
        assert!(!c.contains("tt"));
        assert!(report.layer("recent_turns").unwrap().truncated);

        assert!(c.contains(&"s".repeat(100)));
        assert!(!report.layer("summary").unwrap().truncated);
        assert!(!report.layer("hard_facts").unwrap().truncated);
    }

    #[test]
    fn turn_cap_applies_before_turns_budget() {
        let asm = assembler_with(
            Arc::new(InMemoryStore::new()),
            AssemblySettings {
                budgets: LayerBudgets {
                    recent_turns: 300, // 1200 chars
                    ..LayerBudgets::default()
                },
                ..AssemblySettings::default()
            },
        );
        let long = "t".repeat(1500);
        let turns = [turn(1, Role::User, &long), turn(2, Role::Assistant, &long)];

        let report = asm.render(&[], None, &turns, &[]);
        let c = &report.context;
        // First turn capped at 1000 chars and fully shown, second cut by the layer budget
        assert!(c.contains(&format!("**user** (turn 1): {}\n", "t".repeat(1000))));
        assert!(!c.contains(&"t".repeat(1001)));
        assert!(c.contains("**assistant** (turn 2): t"));
        assert!(c.ends_with(TRUNCATION_MARKER));
        assert!(report.layer("recent_turns").unwrap().truncated);
    }

    #[test]
    fn boundary_chunk_without_room_is_dropped() {
        // 120 chars: the first block takes 114, leaving less than a heading
        let asm = assembler_with(Arc::new(InMemoryStore::new()), tiny_retrieval_budget(30));
        let chunks = vec!["A".repeat(100), "B".repeat(10)];

        let report = asm.render(&[], None, &[], &chunks);
        assert_eq!(
            report.context,
            format!("## Relevant Documents\n### Excerpt 1\n{}", "A".repeat(100))
        );
        let stats = report.layer("retrieval").unwrap();
        assert!(stats.truncated);
        assert_eq!(stats.items_included, 1);
        assert_eq!(stats.items_total, 2);
    }

    #[test]
    fn each_turn_capped_before_layer_budget() {
        let (_store, asm) = assembler();
        let long = "z".repeat(1500);
        let report = asm.render(&[], None, &[turn(1, Role::Assistant, &long)], &[]);
        assert!(report.context.contains(&"z".repeat(1000)));
        assert!(!report.context.contains(&"z".repeat(1001)));
        assert!(!report.layer("recent_turns").unwrap().truncated);
    }

    #[test]
    fn retrieval_stops_at_boundary_chunk() {
        // 30 tokens = 120 chars; each block is 14 heading chars + 50 content chars
        let asm = assembler_with(Arc::new(InMemoryStore::new()), tiny_retrieval_budget(30));
        let chunks: Vec<String> = ["A", "B", "C", "D"].iter().map(|c| c.repeat(50)).collect();

        let report = asm.render(&[], None, &[], &chunks);
        let c = &report.context;
        assert!(c.contains(&format!("### Excerpt 1\n{}", "A".repeat(50))));
        // Block 2 starts at 64 chars, 56 left: 14 heading + 42 content
        assert!(c.contains(&format!("### Excerpt 2\n{}...", "B".repeat(42))));
        assert!(!c.contains(&"B".repeat(43)));
        assert!(!c.contains("Excerpt 3"));
        assert!(!c.contains("CCCC"));
        assert!(!c.contains("DDDD"));

        let stats = report.layer("retrieval").unwrap();
        assert!(stats.truncated);
        assert_eq!(stats.items_included, 2);
        assert_eq!(stats.items_total, 4);
    }

    #[test]
    fn retrieval_never_skips_ahead_to_smaller_chunk() {
        let asm = assembler_with(Arc::new(InMemoryStore::new()), tiny_retrieval_budget(30));
        // First chunk is huge, second would fit on its own
        let chunks = vec!["X".repeat(500), "small".to_string()];

        let report = asm.render(&[], None, &[], &chunks);
        assert!(report.context.contains("### Excerpt 1\n"));
        assert!(!report.context.contains("small"));
    }

    #[test]
    fn chunks_fitting_budget_are_all_included() {
        let (_store, asm) = assembler();
        let chunks = vec!["first".to_string(), "  ".to_string(), "second".to_string()];
        let report = asm.render(&[], None, &[], &chunks);
        assert_eq!(
            report.context,
            "## Relevant Documents\n### Excerpt 1\nfirst\n\n### Excerpt 2\nsecond"
        );
        assert!(!report.layer("retrieval").unwrap().truncated);
    }

    #[test]
    fn blank_summary_is_omitted() {
        let (_store, asm) = assembler();
        let summary = CompactedSummary {
            project_id: "alpha".into(),
            summary: "   ".into(),
            turns_compacted: 5,
            last_compacted_turn: 5,
            created_at: Utc::now(),
        };
        let report = asm.render(&[], Some(&summary), &[], &[]);
        assert_eq!(report.context, "");
        assert_eq!(report.layer("summary").unwrap().chars, 0);
    }

    #[test]
    fn truncate_with_marker_is_char_safe() {
        let (cut, truncated) = truncate_with_marker("ééééé", 2);
        assert_eq!(cut, "éé...[truncated]");
        assert!(truncated);
        let (whole, truncated) = truncate_with_marker("abc", 3);
        assert_eq!(whole, "abc");
        assert!(!truncated);
    }

    #[test]
    fn default_budgets_total_twelve_thousand() {
        assert_eq!(LayerBudgets::default().total(), 12000);
    }
}
