//! Answer matching for typed answers.
//!
//! Input and accepted answers go through the same normalization before they are
//! compared, and near misses are counted with Levenshtein distance.

use thiserror::Error;

/// Apostrophe that every variant is folded into.
pub const CANONICAL_APOSTROPHE: char = '\'';

const APOSTROPHE_VARIANTS: &[char] = &[
    '\u{2018}', // left single quotation mark
    '\u{2019}', // right single quotation mark
    '\u{201B}', // single high-reversed-9 quotation mark
    '\u{02BC}', // modifier letter apostrophe
    '\u{2032}', // prime
    '\u{00B4}', // acute accent
    '`',
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnswerError {
    #[error("answer is empty")]
    Empty,
}

/// Normalize an answer for comparison.
///
/// Trims, lowercases, collapses internal whitespace and folds apostrophe variants.
#[must_use]
pub fn normalize_answer(raw: &str) -> String {
    let folded: String = raw
        .chars()
        .map(|c| {
            if APOSTROPHE_VARIANTS.contains(&c) {
                CANONICAL_APOSTROPHE
            } else {
                c
            }
        })
        .collect();
    folded
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// A typed answer that is known to be non-empty after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedAnswer {
    raw: String,
    normalized: String,
}

impl SubmittedAnswer {
    /// # Errors
    ///
    /// Returns `AnswerError::Empty` if nothing is left after normalization.
    pub fn parse(raw: impl Into<String>) -> Result<Self, AnswerError> {
        let raw = raw.into();
        let normalized = normalize_answer(&raw);
        if normalized.is_empty() {
            return Err(AnswerError::Empty);
        }
        Ok(Self { raw, normalized })
    }

    /// The answer as the learner typed it.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }
}

/// Result of comparing a typed answer with the accepted answers of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub is_exact_match: bool,
    /// Edit distance to the closest accepted answer; zero on an exact match.
    pub mistake_count: usize,
    /// Normalized accepted answer that was closest to the input.
    pub closest_answer: Option<String>,
}

/// Compare `answer` against every accepted answer.
///
/// Accepted answers that normalize to nothing are ignored. With no usable
/// accepted answer the mistake count is the length of the input.
#[must_use]
pub fn evaluate(answer: &SubmittedAnswer, accepted: &[String]) -> MatchResult {
    let input = answer.normalized();
    let candidates: Vec<String> = accepted
        .iter()
        .map(|a| normalize_answer(a))
        .filter(|a| !a.is_empty())
        .collect();

    if let Some(exact) = candidates.iter().find(|c| c.as_str() == input) {
        return MatchResult {
            is_exact_match: true,
            mistake_count: 0,
            closest_answer: Some(exact.clone()),
        };
    }

    let closest = candidates
        .into_iter()
        .map(|c| (levenshtein_distance(input, &c), c))
        .min_by_key(|(distance, _)| *distance);

    match closest {
        Some((distance, candidate)) => MatchResult {
            is_exact_match: false,
            mistake_count: distance,
            closest_answer: Some(candidate),
        },
        None => MatchResult {
            is_exact_match: false,
            mistake_count: input.chars().count(),
            closest_answer: None,
        },
    }
}

/// Calculate Levenshtein distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Two rows instead of the full matrix.
    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;

        for j in 1..=n {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);

            curr[j] = (prev[j] + 1) // deletion
                .min(curr[j - 1] + 1) // insertion
                .min(prev[j - 1] + cost); // substitution
        }

        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
