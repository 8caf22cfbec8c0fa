//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. The ratio is
//! a value on [`TokenEstimator`] rather than a hard-coded constant, so a
//! real tokenizer can replace it later without touching the layering.

/// Default characters per token.
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

/// Converts between token budgets and character counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimator {
    chars_per_token: usize,
}

impl TokenEstimator {
    /// A zero ratio is treated as one character per token.
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    pub fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }

    /// Estimate the token count for a string. Rounds up.
    pub fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }

    /// How many characters fit in `tokens`.
    pub fn char_budget(&self, tokens: usize) -> usize {
        tokens.saturating_mul(self.chars_per_token)
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

/// Estimate the token count for a string with the default ratio.
pub fn estimate_tokens(text: &str) -> usize {
    TokenEstimator::default().estimate(text)
}

/// The longest prefix of `text` holding at most `max_chars` characters.
///
/// Always cuts on a `char` boundary.
pub fn prefix_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
