//! Person identity records for entity resolution.
//!
//! A [`RawPersonRecord`] is one sighting of a person in one source
//! (a Slack user, a Jira assignee, a Drive file owner). The resolver folds
//! sightings into [`MergedPerson`] identities.

use serde::{Deserialize, Serialize};

/// A `(source, source_id)` pair identifying one sighting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    /// Data source name ("slack", "jira", "gdrive", ...)
    pub source: String,
    /// Identifier of the person within that source
    pub source_id: String,
}

/// One per-source sighting of a person.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPersonRecord {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub source_id: String,

    /// Source-specific payload carried through untouched
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RawPersonRecord {
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            source: self.source.clone(),
            source_id: self.source_id.clone(),
        }
    }
}

/// A unified identity built from one or more sightings.
///
/// Fields are only ever filled in, never cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedPerson {
    /// Longest name observed across sightings
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// Unique set of sightings, in first-seen order
    pub source_ids: Vec<SourceRef>,

    pub raw_records: Vec<RawPersonRecord>,
}

impl MergedPerson {
    /// Seed a new identity from its first sighting.
    pub fn seed(record: RawPersonRecord) -> Self {
        Self {
            name: record.name.trim().to_string(),
            email: non_blank(&record.email),
            slack_user_id: non_blank(&record.slack_user_id),
            jira_username: non_blank(&record.jira_username),
            avatar_url: non_blank(&record.avatar_url),
            source_ids: vec![record.source_ref()],
            raw_records: vec![record],
        }
    }

    /// Whether `(source, source_id)` has already been folded in.
    pub fn has_source(&self, source: &str, source_id: &str) -> bool {
        self.source_ids
            .iter()
            .any(|r| r.source == source && r.source_id == source_id)
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_record_deserializes_with_missing_fields() {
        let record: RawPersonRecord =
            serde_json::from_str(r#"{"name": "Ana", "source": "slack", "source_id": "U1"}"#).unwrap();
        assert_eq!(record.name, "Ana");
        assert!(record.email.is_none());
        assert!(record.extra.is_empty());
    }

    #[test]
    fn seed_records_its_source() {
        let person = MergedPerson::seed(RawPersonRecord {
            name: "  Ana Li ".into(),
            source: "jira".into(),
            source_id: "ali".into(),
            ..Default::default()
        });
        assert_eq!(person.name, "Ana Li");
        assert!(person.has_source("jira", "ali"));
        assert!(!person.has_source("slack", "ali"));
        assert_eq!(person.raw_records.len(), 1);
    }

    #[test]
    fn seed_drops_blank_fields() {
        let person = MergedPerson::seed(RawPersonRecord {
            name: "Ana".into(),
            email: Some("  ".into()),
            slack_user_id: Some(" U1 ".into()),
            ..Default::default()
        });
        assert!(person.email.is_none());
        assert_eq!(person.slack_user_id.as_deref(), Some("U1"));
    }
}
