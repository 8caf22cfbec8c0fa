//! Conversation turns and compacted summaries.
//!
//! Turns are numbered per project, starting at 1, with no gaps. The
//! number defines chronology; timestamps are informational only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The COO asking questions
    User,
    /// The assistant answering them
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown role '{other}' (expected user or assistant)")),
        }
    }
}

/// A single stored conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub project_id: String,

    /// 1-based, strictly increasing and gapless per project
    pub turn_number: u64,

    pub role: Role,

    pub content: String,

    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    /// The line format used as summarizer input.
    pub fn transcript_line(&self) -> String {
        format!("Turn {} ({}): {}", self.turn_number, self.role, self.content)
    }
}

/// The latest progressive summary of a project's older turns.
///
/// Exactly one row exists per project; it is replaced by upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactedSummary {
    pub project_id: String,

    pub summary: String,

    /// How many turns the summary covers in total
    pub turns_compacted: u64,

    /// High-water mark: every turn up to and including this one is summarized
    pub last_compacted_turn: u64,

    pub created_at: DateTime<Utc>,
}
