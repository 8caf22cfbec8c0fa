//! Hard facts: durable, supersede-able knowledge items scoped to a project.
//!
//! Facts are never deleted. A correction deactivates the old fact and
//! inserts a new one carrying a `supersedes` back-reference, so the full
//! history stays queryable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed set of fact categories.
///
/// Anything the extractor or a caller sends outside this set is coerced
/// to [`FactCategory::Other`] rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    Deadline,
    Decision,
    Assignment,
    PeopleCorrection,
    ProjectStatus,
    Risk,
    Requirement,
    Milestone,
    Budget,
    Preference,
    Other,
}

impl FactCategory {
    /// All categories, in schema order.
    pub const ALL: [FactCategory; 11] = [
        Self::Deadline,
        Self::Decision,
        Self::Assignment,
        Self::PeopleCorrection,
        Self::ProjectStatus,
        Self::Risk,
        Self::Requirement,
        Self::Milestone,
        Self::Budget,
        Self::Preference,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deadline => "deadline",
            Self::Decision => "decision",
            Self::Assignment => "assignment",
            Self::PeopleCorrection => "people_correction",
            Self::ProjectStatus => "project_status",
            Self::Risk => "risk",
            Self::Requirement => "requirement",
            Self::Milestone => "milestone",
            Self::Budget => "budget",
            Self::Preference => "preference",
            Self::Other => "other",
        }
    }

    /// Parse a category name, coercing unknown values to `Other`.
    pub fn parse_lossy(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
            .unwrap_or(Self::Other)
    }
}

impl std::fmt::Display for FactCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single stored fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardFact {
    /// Unique ID for this fact
    pub fact_id: String,

    /// Owning project; `None` means the fact is global
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    pub category: FactCategory,

    pub content: String,

    /// Where the fact came from ("conversation", "coo_correction", ...)
    pub source: String,

    /// Extractor confidence in `0.0..=1.0`
    pub confidence: f32,

    /// Kind of entity the fact is about ("person", "project", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    pub active: bool,

    /// ID of the fact this one replaced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_at: Option<DateTime<Utc>>,
}

/// Clamp into `0.0..=1.0`; NaN and infinities become 0.0.
fn normalize_confidence(confidence: f32) -> f32 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl HardFact {
    /// Build a fresh, active fact from caller-supplied fields.
    pub fn from_new(new: NewFact) -> Self {
        let now = Utc::now();
        Self {
            fact_id: Uuid::new_v4().to_string(),
            project_id: new.project_id,
            category: new.category,
            content: new.content,
            source: new.source,
            confidence: normalize_confidence(new.confidence),
            entity_type: new.entity_type,
            entity_id: new.entity_id,
            active: true,
            supersedes: None,
            created_at: now,
            updated_at: now,
            superseded_at: None,
        }
    }

    /// Whether this fact is visible from `project_id`.
    ///
    /// Global facts are visible everywhere; project facts only in their project.
    /// A `None` project sees global facts only.
    pub fn visible_in(&self, project_id: Option<&str>) -> bool {
        match (&self.project_id, project_id) {
            (None, _) => true,
            (Some(own), Some(wanted)) => own == wanted,
            (Some(_), None) => false,
        }
    }

    /// Whether this fact is about the given entity.
    pub fn is_about(&self, entity_type: &str, entity_id: &str) -> bool {
        self.entity_type.as_deref() == Some(entity_type)
            && self.entity_id.as_deref() == Some(entity_id)
    }
}

/// Caller-supplied fields for a new fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFact {
    pub content: String,
    pub category: FactCategory,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
}

fn default_source() -> String {
    "conversation".into()
}

fn default_confidence() -> f32 {
    1.0
}

impl NewFact {
    /// A fact with default source and full confidence.
    pub fn new(content: impl Into<String>, category: FactCategory) -> Self {
        Self {
            content: content.into(),
            category,
            project_id: None,
            source: default_source(),
            confidence: default_confidence(),
            entity_type: None,
            entity_id: None,
        }
    }

    pub fn in_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn about(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }
}

/// Which facts a store query should return.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactFilter {
    /// Project scope. `None` matches global facts only; `Some(p)` matches
    /// facts in `p` plus global facts. Ignored when `all_scopes` is set.
    pub project_id: Option<String>,

    /// Match facts in every scope.
    pub all_scopes: bool,

    pub active_only: bool,

    pub category: Option<FactCategory>,

    /// Restrict to facts about `(entity_type, entity_id)`.
    pub entity: Option<(String, String)>,
}

impl FactFilter {
    /// Active facts visible from `project_id`.
    pub fn active_in(project_id: Option<&str>) -> Self {
        Self {
            project_id: project_id.map(str::to_string),
            active_only: true,
            ..Self::default()
        }
    }

    /// Active facts of one category about one entity, in any scope.
    pub fn active_about(entity_type: &str, entity_id: &str, category: FactCategory) -> Self {
        Self {
            all_scopes: true,
            active_only: true,
            category: Some(category),
            entity: Some((entity_type.to_string(), entity_id.to_string())),
            ..Self::default()
        }
    }

    /// In-process evaluation of the filter, for stores without a query engine.
    pub fn matches(&self, fact: &HardFact) -> bool {
        if self.active_only && !fact.active {
            return false;
        }
        if !self.all_scopes && !fact.visible_in(self.project_id.as_deref()) {
            return false;
        }
        if let Some(category) = self.category {
            if fact.category != category {
                return false;
            }
        }
        if let Some((entity_type, entity_id)) = &self.entity {
            if !fact.is_about(entity_type, entity_id) {
                return false;
            }
        }
        true
    }
}
