//! Hard-fact storage, supersession and extraction.
//!
//! Facts are append-only. Supersession deactivates the old fact and inserts
//! a replacement pointing back at it; nothing is ever deleted, so the
//! correction history of any fact can be reconstructed from the store.

use chiefops_core::error::StoreError;
use chiefops_core::fact::{FactCategory, FactFilter, HardFact, NewFact};
use chiefops_core::generation::StructuredGenerator;
use chiefops_core::store::PersistenceStore;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extracted candidates below this confidence are discarded.
pub const MIN_EXTRACTION_CONFIDENCE: f32 = 0.6;

const EXTRACTION_SYSTEM_PROMPT: &str = "You extract durable project facts from a COO's \
conversation with their operations assistant. Only report statements that will still be \
true next week: deadlines, decisions, ownership, status, risks, requirements, milestones, \
budgets, preferences, and corrections about people. Skip chit-chat and questions.";

/// The result of [`FactStore::supersede_fact`].
#[derive(Debug, Clone)]
pub struct Supersession {
    /// The newly stored, active fact
    pub fact: HardFact,
    /// The fact that was deactivated, or `None` when the id did not resolve
    /// and the new fact was stored on its own
    pub previous: Option<HardFact>,
}

#[derive(Debug, Deserialize)]
struct ExtractionOutput {
    #[serde(default)]
    facts: Vec<CandidateFact>,
}

#[derive(Debug, Deserialize)]
struct CandidateFact {
    #[serde(default)]
    category: String,
    content: String,
    confidence: f32,
}

/// Project-scoped fact operations over a [`PersistenceStore`].
#[derive(Clone)]
pub struct FactStore {
    store: Arc<dyn PersistenceStore>,
    min_confidence: f32,
}

impl FactStore {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self {
            store,
            min_confidence: MIN_EXTRACTION_CONFIDENCE,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Store a new active fact. Never touches existing facts.
    pub async fn store_fact(&self, new: NewFact) -> Result<HardFact, StoreError> {
        let fact = HardFact::from_new(new);
        self.store.insert_fact(&fact).await?;
        debug!(fact_id = %fact.fact_id, category = %fact.category, "Stored fact");
        Ok(fact)
    }

    /// Replace `old_fact_id` with a new fact.
    ///
    /// The new fact inherits the old fact's project unless `new` names one.
    /// When `old_fact_id` does not resolve, the new fact is stored as a
    /// plain fact and [`Supersession::previous`] is `None`.
    pub async fn supersede_fact(
        &self,
        old_fact_id: &str,
        mut new: NewFact,
    ) -> Result<Supersession, StoreError> {
        let Some(previous) = self.store.get_fact(old_fact_id).await? else {
            warn!(old_fact_id, "Supersede target not found; storing as a new fact");
            let fact = self.store_fact(new).await?;
            return Ok(Supersession { fact, previous: None });
        };

        let now = Utc::now();
        self.store.deactivate_fact(old_fact_id, now).await?;

        if new.project_id.is_none() {
            new.project_id = previous.project_id.clone();
        }
        let mut fact = HardFact::from_new(new);
        fact.supersedes = Some(old_fact_id.to_string());
        self.store.insert_fact(&fact).await?;

        info!(old = old_fact_id, new = %fact.fact_id, "Fact superseded");
        let previous = HardFact {
            active: false,
            superseded_at: previous.superseded_at.or(Some(now)),
            ..previous
        };
        Ok(Supersession {
            fact,
            previous: Some(previous),
        })
    }

    /// Active facts visible from `project_id`, oldest first.
    ///
    /// Global facts are always included; `None` returns global facts only.
    pub async fn get_active_facts(&self, project_id: Option<&str>) -> Result<Vec<HardFact>, StoreError> {
        self.store.find_facts(&FactFilter::active_in(project_id)).await
    }

    pub async fn get_fact(&self, fact_id: &str) -> Result<Option<HardFact>, StoreError> {
        self.store.get_fact(fact_id).await
    }

    /// Every fact ever stored about an entity, active or not, oldest first.
    pub async fn facts_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<HardFact>, StoreError> {
        let filter = FactFilter {
            all_scopes: true,
            entity: Some((entity_type.to_string(), entity_id.to_string())),
            ..FactFilter::default()
        };
        self.store.find_facts(&filter).await
    }

    /// Record a correction about a person or other entity.
    ///
    /// Every other active `people_correction` fact about the same entity is
    /// deactivated first, so at most one correction per entity is active.
    pub async fn store_correction(
        &self,
        entity_type: &str,
        entity_id: &str,
        new: NewFact,
    ) -> Result<HardFact, StoreError> {
        let filter = FactFilter::active_about(entity_type, entity_id, FactCategory::PeopleCorrection);
        let now = Utc::now();
        for stale in self.store.find_facts(&filter).await? {
            self.store.deactivate_fact(&stale.fact_id, now).await?;
            debug!(fact_id = %stale.fact_id, entity_id, "Deactivated earlier correction");
        }

        let mut new = new.about(entity_type, entity_id);
        new.category = FactCategory::PeopleCorrection;
        self.store_fact(new).await
    }

    /// Extract facts from a conversation turn and store the confident ones.
    ///
    /// Generation failures and schema-violating output yield an empty list.
    /// Only storage failures are returned as errors.
    pub async fn extract_facts<G>(
        &self,
        turn_text: &str,
        project_id: Option<&str>,
        generator: &G,
    ) -> Result<Vec<HardFact>, StoreError>
    where
        G: StructuredGenerator + ?Sized,
    {
        if turn_text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let prompt = format!(
            "Extract durable facts from this conversation turn. Use only the listed \
             categories and give each fact a confidence between 0 and 1.\n\n{turn_text}"
        );
        let raw = match generator
            .generate_structured(&prompt, &extraction_schema(), Some(EXTRACTION_SYSTEM_PROMPT))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Fact extraction unavailable: {e}");
                return Ok(Vec::new());
            }
        };

        let output: ExtractionOutput = match serde_json::from_value(raw) {
            Ok(output) => output,
            Err(e) => {
                warn!("Fact extraction returned malformed output: {e}");
                return Ok(Vec::new());
            }
        };

        let mut stored = Vec::new();
        for candidate in output.facts {
            let content = candidate.content.trim();
            if content.is_empty() || candidate.confidence < self.min_confidence {
                debug!(confidence = candidate.confidence, "Dropping low-confidence candidate");
                continue;
            }

            let mut new = NewFact::new(content, FactCategory::parse_lossy(&candidate.category))
                .with_source("conversation")
                .with_confidence(candidate.confidence);
            new.project_id = project_id.map(str::to_string);
            stored.push(self.store_fact(new).await?);
        }

        if !stored.is_empty() {
            info!(count = stored.len(), "Extracted facts from turn");
        }
        Ok(stored)
    }
}

/// JSON schema handed to the structured generator for extraction.
pub fn extraction_schema() -> serde_json::Value {
    let categories: Vec<&str> = FactCategory::ALL.iter().map(FactCategory::as_str).collect();
    serde_json::json!({
        "type": "object",
        "properties": {
            "facts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "category": { "type": "string", "enum": categories },
                        "content": { "type": "string" },
                        "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
                    },
                    "required": ["category", "content", "confidence"]
                }
            }
        },
        "required": ["facts"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chiefops_core::error::GenerationError;
    use chiefops_memory::InMemoryStore;
    use std::sync::Mutex;

    /// Returns a fixed JSON value and records the prompts it saw.
    struct ScriptedExtractor {
        output: Result<serde_json::Value, GenerationError>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedExtractor {
        fn returning(output: serde_json::Value) -> Self {
            Self {
                output: Ok(output),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                output: Err(GenerationError::Unavailable("down".into())),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StructuredGenerator for ScriptedExtractor {
        async fn generate_structured(
            &self,
            prompt: &str,
            _schema: &serde_json::Value,
            _system_prompt: Option<&str>,
        ) -> Result<serde_json::Value, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.output.clone()
        }
    }

    fn fact_store() -> FactStore {
        FactStore::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn store_and_list_active() {
        let facts = fact_store();
        let stored = facts
            .store_fact(NewFact::new("Launch moved to March 1", FactCategory::Deadline).in_project("alpha"))
            .await
            .unwrap();

        let active = facts.get_active_facts(Some("alpha")).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].fact_id, stored.fact_id);
        assert!(facts.get_active_facts(Some("beta")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn active_facts_include_globals_in_creation_order() {
        let facts = fact_store();
        let first = facts
            .store_fact(NewFact::new("Hiring freeze company-wide", FactCategory::Decision))
            .await
            .unwrap();
        let second = facts
            .store_fact(NewFact::new("Alpha budget is $400k", FactCategory::Budget).in_project("alpha"))
            .await
            .unwrap();

        let active = facts.get_active_facts(Some("alpha")).await.unwrap();
        let ids: Vec<&str> = active.iter().map(|f| f.fact_id.as_str()).collect();
        assert_eq!(ids, vec![first.fact_id.as_str(), second.fact_id.as_str()]);

        let global = facts.get_active_facts(None).await.unwrap();
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].fact_id, first.fact_id);
    }

    #[tokio::test]
    async fn supersede_deactivates_old_and_links_new() {
        let facts = fact_store();
        let old = facts
            .store_fact(NewFact::new("Launch is Feb 1", FactCategory::Deadline).in_project("alpha"))
            .await
            .unwrap();

        let result = facts
            .supersede_fact(&old.fact_id, NewFact::new("Launch is March 1", FactCategory::Deadline))
            .await
            .unwrap();

        assert_eq!(result.fact.supersedes.as_deref(), Some(old.fact_id.as_str()));
        assert_eq!(result.fact.project_id.as_deref(), Some("alpha"));
        assert!(result.previous.is_some());

        let active = facts.get_active_facts(Some("alpha")).await.unwrap();
        assert!(active.iter().all(|f| f.fact_id != old.fact_id));
        let linked: Vec<_> = active
            .iter()
            .filter(|f| f.supersedes.as_deref() == Some(old.fact_id.as_str()))
            .collect();
        assert_eq!(linked.len(), 1);

        let history = facts.get_fact(&old.fact_id).await.unwrap().unwrap();
        assert!(!history.active);
        assert!(history.superseded_at.is_some());
    }

    #[tokio::test]
    async fn supersede_explicit_project_wins() {
        let facts = fact_store();
        let old = facts
            .store_fact(NewFact::new("Owner is Dana", FactCategory::Assignment).in_project("alpha"))
            .await
            .unwrap();
        let result = facts
            .supersede_fact(
                &old.fact_id,
                NewFact::new("Owner is Eli", FactCategory::Assignment).in_project("beta"),
            )
            .await
            .unwrap();
        assert_eq!(result.fact.project_id.as_deref(), Some("beta"));
    }

    #[tokio::test]
    async fn supersede_missing_target_stores_plain_fact() {
        let facts = fact_store();
        let result = facts
            .supersede_fact("does-not-exist", NewFact::new("Budget is $2M", FactCategory::Budget))
            .await
            .unwrap();

        assert!(result.previous.is_none());
        assert!(result.fact.supersedes.is_none());
        assert!(result.fact.active);
        assert_eq!(facts.get_active_facts(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn correction_keeps_one_active_per_entity() {
        let facts = fact_store();
        facts
            .store_correction("person", "dana", NewFact::new("Dana is the PM", FactCategory::Other))
            .await
            .unwrap();
        let latest = facts
            .store_correction("person", "dana", NewFact::new("Dana is the tech lead", FactCategory::Other))
            .await
            .unwrap();
        facts
            .store_correction("person", "eli", NewFact::new("Eli left the team", FactCategory::Other))
            .await
            .unwrap();

        assert_eq!(latest.category, FactCategory::PeopleCorrection);

        let history = facts.facts_for_entity("person", "dana").await.unwrap();
        assert_eq!(history.len(), 2);
        let active: Vec<_> = history.iter().filter(|f| f.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].content, "Dana is the tech lead");

        let eli = facts.facts_for_entity("person", "eli").await.unwrap();
        assert!(eli[0].active);
    }

    #[tokio::test]
    async fn extraction_drops_low_confidence_and_coerces_category() {
        let facts = fact_store();
        let extractor = ScriptedExtractor::returning(serde_json::json!({
            "facts": [
                { "category": "deadline", "content": "Beta ends June 30", "confidence": 0.9 },
                { "category": "rumor", "content": "Vendor may raise prices", "confidence": 0.6 },
                { "category": "risk", "content": "Maybe a risk", "confidence": 0.59 },
                { "category": "decision", "content": "   ", "confidence": 0.95 }
            ]
        }));

        let stored = facts
            .extract_facts("We agreed beta ends June 30.", Some("alpha"), &extractor)
            .await
            .unwrap();

        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].category, FactCategory::Deadline);
        assert_eq!(stored[1].category, FactCategory::Other);
        assert!(stored.iter().all(|f| f.project_id.as_deref() == Some("alpha")));
        assert!(extractor.prompts.lock().unwrap()[0].contains("beta ends June 30"));
    }

    #[tokio::test]
    async fn extraction_failure_yields_empty() {
        let facts = fact_store();
        let stored = facts
            .extract_facts("Anything", None, &ScriptedExtractor::failing())
            .await
            .unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn malformed_extraction_yields_empty() {
        let facts = fact_store();
        let extractor = ScriptedExtractor::returning(serde_json::json!({
            "facts": [{ "category": "deadline" }]
        }));
        let stored = facts.extract_facts("Anything", None, &extractor).await.unwrap();
        assert!(stored.is_empty());
        assert!(facts.get_active_facts(None).await.unwrap().is_empty());
    }

    #[test]
    fn schema_lists_all_categories() {
        let schema = extraction_schema();
        let categories = &schema["properties"]["facts"]["items"]["properties"]["category"]["enum"];
        assert_eq!(categories.as_array().unwrap().len(), 11);
    }
}
