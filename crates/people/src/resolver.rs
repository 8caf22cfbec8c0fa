//! Merge per-source person sightings into unified identities.
//!
//! Records are processed in input order. Each one is matched against the
//! identities built so far (email, then Slack id, then fuzzy name) and
//! either folded into the match or seeded as a new identity. The outcome
//! therefore depends on input order only through tie-breaking and name
//! growth; exact-key matches are order-independent.

use crate::similarity::similarity;
use chiefops_core::person::{MergedPerson, RawPersonRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Minimum name similarity for a fuzzy merge. Inclusive.
pub const FUZZY_THRESHOLD: f64 = 0.85;

/// Scores within this distance of the threshold count as reaching it, so
/// that an exact 0.85 is not lost to floating-point rounding.
const SCORE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolverSettings {
    pub fuzzy_threshold: f64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            fuzzy_threshold: FUZZY_THRESHOLD,
        }
    }
}

/// How a record found (or failed to find) its identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchKind {
    Email,
    SlackUserId,
    FuzzyName { score: f64 },
    New,
}

/// Stateless resolver; create one and reuse it.
#[derive(Debug, Clone, Default)]
pub struct EntityResolver {
    settings: ResolverSettings,
}

impl EntityResolver {
    pub fn new(settings: ResolverSettings) -> Self {
        Self { settings }
    }

    /// Resolve a batch of sightings into merged identities.
    pub fn resolve(&self, records: Vec<RawPersonRecord>) -> Vec<MergedPerson> {
        let total = records.len();
        let mut resolution = Resolution::new(self.settings);
        for record in records {
            resolution.add(record);
        }
        let persons = resolution.into_persons();
        debug!(records = total, persons = persons.len(), "Entity resolution complete");
        persons
    }

    /// Fold a batch of sightings into identities from a previous run.
    pub fn resolve_onto(
        &self,
        existing: Vec<MergedPerson>,
        records: Vec<RawPersonRecord>,
    ) -> Vec<MergedPerson> {
        let mut resolution = Resolution::from_existing(self.settings, existing);
        for record in records {
            resolution.add(record);
        }
        resolution.into_persons()
    }
}

/// The working set of one resolution run.
pub struct Resolution {
    settings: ResolverSettings,
    persons: Vec<MergedPerson>,
    by_email: HashMap<String, usize>,
    by_slack_id: HashMap<String, usize>,
}

impl Resolution {
    pub fn new(settings: ResolverSettings) -> Self {
        Self {
            settings,
            persons: Vec::new(),
            by_email: HashMap::new(),
            by_slack_id: HashMap::new(),
        }
    }

    /// Start from already-merged identities, indexing their keys.
    pub fn from_existing(settings: ResolverSettings, persons: Vec<MergedPerson>) -> Self {
        let mut resolution = Self::new(settings);
        for person in persons {
            resolution.persons.push(person);
            resolution.index(resolution.persons.len() - 1);
        }
        resolution
    }

    /// Fold one sighting into the working set.
    pub fn add(&mut self, record: RawPersonRecord) -> MatchKind {
        let (target, kind) = match self.find_match(&record) {
            Some(found) => found,
            None => {
                self.persons.push(MergedPerson::seed(record));
                let idx = self.persons.len() - 1;
                self.index(idx);
                return MatchKind::New;
            }
        };

        debug!(
            person = %self.persons[target].name,
            source = %record.source,
            source_id = %record.source_id,
            ?kind,
            "Merging sighting"
        );
        merge_into(&mut self.persons[target], record);
        self.index(target);
        kind
    }

    pub fn persons(&self) -> &[MergedPerson] {
        &self.persons
    }

    pub fn into_persons(self) -> Vec<MergedPerson> {
        self.persons
    }

    fn find_match(&self, record: &RawPersonRecord) -> Option<(usize, MatchKind)> {
        if let Some(email) = email_key(record.email.as_deref()) {
            if let Some(&idx) = self.by_email.get(&email) {
                return Some((idx, MatchKind::Email));
            }
        }

        if let Some(slack_id) = present(record.slack_user_id.as_deref()) {
            if let Some(&idx) = self.by_slack_id.get(slack_id) {
                return Some((idx, MatchKind::SlackUserId));
            }
        }

        self.best_fuzzy(&record.name)
            .map(|(idx, score)| (idx, MatchKind::FuzzyName { score }))
    }

    /// Highest-scoring identity by name; the earliest wins ties.
    fn best_fuzzy(&self, name: &str) -> Option<(usize, f64)> {
        if name.trim().is_empty() {
            return None;
        }

        let mut best: Option<(usize, f64)> = None;
        for (idx, person) in self.persons.iter().enumerate() {
            let score = similarity(name, &person.name);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((idx, score));
            }
        }

        best.filter(|&(_, score)| score + SCORE_TOLERANCE >= self.settings.fuzzy_threshold)
    }

    fn index(&mut self, idx: usize) {
        let person = &self.persons[idx];
        if let Some(email) = email_key(person.email.as_deref()) {
            self.by_email.entry(email).or_insert(idx);
        }
        if let Some(slack_id) = present(person.slack_user_id.as_deref()) {
            self.by_slack_id.entry(slack_id.to_string()).or_insert(idx);
        }
    }
}

/// Enrich `person` with a sighting. Fields are filled, never overwritten,
/// except the name, which is replaced by a strictly longer one.
fn merge_into(person: &mut MergedPerson, record: RawPersonRecord) {
    fill(&mut person.email, &record.email);
    fill(&mut person.slack_user_id, &record.slack_user_id);
    fill(&mut person.jira_username, &record.jira_username);
    fill(&mut person.avatar_url, &record.avatar_url);

    let candidate = record.name.trim();
    if candidate.chars().count() > person.name.chars().count() {
        person.name = candidate.to_string();
    }

    if !person.has_source(&record.source, &record.source_id) {
        person.source_ids.push(record.source_ref());
    }
    person.raw_records.push(record);
}

fn fill(slot: &mut Option<String>, value: &Option<String>) {
    if present(slot.as_deref()).is_none() {
        if let Some(value) = present(value.as_deref()) {
            *slot = Some(value.to_string());
        }
    }
}

/// Treat blank strings as absent.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn email_key(email: Option<&str>) -> Option<String> {
    present(email).map(str::to_lowercase)
}
