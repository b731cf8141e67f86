//! Size estimation for budget decisions.
//!
//! The pipeline never talks to the model's tokenizer. It needs a cheap,
//! reproducible number that grows with text length so it can decide when a
//! set of summaries is too large to pass as context in one call.
//!
//! | Estimator | Unit | Notes |
//! |-----------|------|-------|
//! | [`WhitespaceWords`] | words | `split_whitespace` count, the default |
//! | [`UnicodeWords`] | words | UAX #29 word boundaries, ignores punctuation |
//! | [`CharHeuristic`] | tokens | `ceil(chars / n)`, ~4 chars per token for English |
//!
//! All of them satisfy `estimate(a + b) >= max(estimate(a), estimate(b))`.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Estimates the size of a piece of text.
pub trait SizeEstimator: Send + Sync {
    /// Size of `text` in estimator units.
    fn estimate(&self, text: &str) -> usize;

    /// Combined size of several texts, measured one by one.
    fn estimate_all<'a, I>(&self, texts: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
        Self: Sized,
    {
        texts.into_iter().map(|t| self.estimate(t)).sum()
    }
}

/// Counts whitespace-delimited words.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceWords;

impl SizeEstimator for WhitespaceWords {
    fn estimate(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Counts words using Unicode word boundaries.
///
/// Punctuation-only segments are not words, so `"Hello, world!"` is 2.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeWords;

impl SizeEstimator for UnicodeWords {
    fn estimate(&self, text: &str) -> usize {
        text.unicode_words().count()
    }
}

/// Approximates tokens as `ceil(chars / chars_per_token)`.
#[derive(Debug, Clone, Copy)]
pub struct CharHeuristic {
    chars_per_token: usize,
}

impl CharHeuristic {
    /// Create a heuristic with the given ratio.
    ///
    /// # Panics
    ///
    /// Panics if `chars_per_token == 0`.
    #[must_use]
    pub fn new(chars_per_token: usize) -> Self {
        assert!(chars_per_token > 0, "chars_per_token must be > 0");
        Self { chars_per_token }
    }
}

impl Default for CharHeuristic {
    fn default() -> Self {
        Self::new(4)
    }
}

impl SizeEstimator for CharHeuristic {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}

/// Estimator selection for configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    /// [`WhitespaceWords`].
    #[default]
    Words,
    /// [`UnicodeWords`].
    UnicodeWords,
    /// [`CharHeuristic`] with 4 chars per token.
    Tokens,
}

impl EstimatorKind {
    /// Build the estimator this kind names.
    #[must_use]
    pub fn build(self) -> Box<dyn SizeEstimator> {
        match self {
            Self::Words => Box::new(WhitespaceWords),
            Self::UnicodeWords => Box::new(UnicodeWords),
            Self::Tokens => Box::new(CharHeuristic::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_words_ignores_runs_of_space() {
        assert_eq!(WhitespaceWords.estimate("  one\ttwo\n\nthree  "), 3);
        assert_eq!(WhitespaceWords.estimate(""), 0);
    }

    #[test]
    fn unicode_words_skip_punctuation() {
        assert_eq!(UnicodeWords.estimate("Hello, world!"), 2);
        assert_eq!(UnicodeWords.estimate("..."), 0);
    }

    #[test]
    fn char_heuristic_rounds_up() {
        let est = CharHeuristic::default();
        assert_eq!(est.estimate(""), 0);
        assert_eq!(est.estimate("abc"), 1);
        assert_eq!(est.estimate("abcd"), 1);
        assert_eq!(est.estimate("abcde"), 2);
        // chars, not bytes
        assert_eq!(est.estimate("日本語日"), 1);
    }

    #[test]
    fn estimate_all_sums_items() {
        let total = WhitespaceWords.estimate_all(["a b", "c", "d e f"]);
        assert_eq!(total, 6);
    }

    #[test]
    fn kind_builds_matching_estimator() {
        assert_eq!(EstimatorKind::Words.build().estimate("a b c"), 3);
        assert_eq!(EstimatorKind::Tokens.build().estimate("abcdefgh"), 2);
    }

    #[test]
    #[should_panic]
    fn zero_ratio_panics() {
        let _ = CharHeuristic::new(0);
    }
}
