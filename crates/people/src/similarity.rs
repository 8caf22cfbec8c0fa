//! Edit-distance based name comparison.
//!
//! Scores are in `[0.0, 1.0]` and symmetric in their arguments. On top of
//! the normalized Levenshtein score, three name-specific rules apply:
//!
//! - same tokens in a different order ("Jones, Bob" vs "Bob Jones") → 0.95
//! - one name contains the other → at least 0.8
//! - same first token of more than two characters → at least 0.7

use std::collections::BTreeSet;

const REORDERED_SCORE: f64 = 0.95;
const SUBSTRING_FLOOR: f64 = 0.8;
const FIRST_TOKEN_FLOOR: f64 = 0.7;

/// Similarity between two names.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();

    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    if token_set(&a) == token_set(&b) {
        return REORDERED_SCORE;
    }

    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let distance = levenshtein(&a, &b);
    let base = 1.0 - distance as f64 / len_a.max(len_b) as f64;

    let mut score = base;
    if a.contains(b.as_str()) || b.contains(a.as_str()) {
        score = score.max(SUBSTRING_FLOOR);
    }

    let first_a = a.split_whitespace().next().unwrap_or_default();
    let first_b = b.split_whitespace().next().unwrap_or_default();
    if first_a == first_b && first_a.chars().count() > 2 {
        score = score.max(FIRST_TOKEN_FLOOR);
    }

    score
}

fn token_set(s: &str) -> BTreeSet<&str> {
    s.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Levenshtein edit distance over `char`s.
///
/// Keeps a single row sized to the shorter input, so space is O(min(m, n)).
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (long, short) = if a.len() >= b.len() { (&a, &b) } else { (&b, &a) };

    if short.is_empty() {
        return long.len();
    }

    let mut row: Vec<usize> = (0..=short.len()).collect();
    for (i, lc) in long.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let above = row[j + 1];
            let cost = usize::from(lc != sc);
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }
    row[short.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_known_values() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn levenshtein_counts_chars_not_bytes() {
        assert_eq!(levenshtein("josé", "jose"), 1);
    }

    #[test]
    fn identical_names_score_one() {
        assert_eq!(similarity("Priya Raman", "Priya Raman"), 1.0);
        assert_eq!(similarity("  Priya Raman ", "priya raman"), 1.0);
    }

    #[test]
    fn empty_names_score_zero() {
        assert_eq!(similarity("", "Priya"), 0.0);
        assert_eq!(similarity("Priya", "   "), 0.0);
    }

    #[test]
    fn last_comma_first_matches_first_last() {
        assert_eq!(similarity("Jones, Bob", "Bob Jones"), 0.95);
    }

    #[test]
    fn substring_boost() {
        // "bob" inside "bob jones": base is low, boost lifts it
        assert!(similarity("Bob", "Bob Jones") >= 0.8);
    }

    #[test]
    fn first_token_boost_requires_three_chars() {
        assert!(similarity("Alexander Hamilton", "Alexander Graham") >= 0.7);
        let short = similarity("Al Gore", "Al Pacino");
        assert!(short < 0.7, "got {short}");
    }

    #[test]
    fn unrelated_names_score_low() {
        assert!(similarity("Priya Raman", "Tom Becker") < 0.5);
    }

    #[test]
    fn similarity_is_symmetric() {
        let names = [
            "Bob", "Bob Jones", "Jones, Bob", "Robert Jones", "bob.jones", "Al Gore",
            "Alexander Hamilton", "", "Zoë Kravitz", "Zoe Kravitz",
        ];
        for a in names {
            for b in names {
                assert_eq!(similarity(a, b), similarity(b, a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn identity_for_non_empty() {
        for name in ["x", "Bob", "Jones, Bob", "Zoë"] {
            assert_eq!(similarity(name, name), 1.0);
        }
    }
}
