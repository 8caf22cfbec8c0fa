//! Person identity resolution across Slack, Jira and Drive sightings.
//!
//! Resolution is layered, cheapest and most certain first:
//!
//! | Step | Key | Cost |
//! |------|-----|------|
//! | 1 | email (case-insensitive) | O(1) |
//! | 2 | Slack user id | O(1) |
//! | 3 | fuzzy name similarity ≥ threshold | O(m) |
//! | 4 | no match: new identity | O(1) |

pub mod resolver;
pub mod similarity;

pub use resolver::{EntityResolver, MatchKind, Resolution, ResolverSettings, FUZZY_THRESHOLD};
pub use similarity::{levenshtein, similarity};
