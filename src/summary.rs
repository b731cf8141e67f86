//! Partial and final summaries.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::Strategy;

/// A summary of some subset of a document's chunks.
///
/// `derived_from` holds the chunk indices this text covers. Collapsing
/// several partial summaries unions their sets, so the input set of the
/// final reduce can always be traced back to chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSummary {
    /// The generated text.
    pub content: String,
    /// Indices of the chunks this summary covers.
    pub derived_from: BTreeSet<usize>,
}

impl PartialSummary {
    /// Summary of a single chunk.
    #[must_use]
    pub fn from_chunk(content: impl Into<String>, chunk_index: usize) -> Self {
        Self {
            content: content.into(),
            derived_from: BTreeSet::from([chunk_index]),
        }
    }

    /// Summary that replaces `parts`.
    #[must_use]
    pub fn merged(content: impl Into<String>, parts: &[Self]) -> Self {
        Self {
            content: content.into(),
            derived_from: parts
                .iter()
                .flat_map(|p| p.derived_from.iter().copied())
                .collect(),
        }
    }
}

/// Join summary texts the way reduce prompts receive them.
#[must_use]
pub fn join_contents(parts: &[PartialSummary]) -> String {
    parts
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// The result of a completed pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// The final summary text.
    pub content: String,
    /// Which strategy produced it.
    pub strategy: Strategy,
    /// Number of chunks the document was split into.
    pub chunks: usize,
    /// Collapse levels run before the final reduce (always 0 for refine).
    pub collapse_levels: usize,
    /// Successful generation calls, retries not counted.
    pub generation_calls: usize,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_unions_sources() {
        let a = PartialSummary::from_chunk("a", 0);
        let b = PartialSummary::merged("bc", &[PartialSummary::from_chunk("b", 1), PartialSummary::from_chunk("c", 2)]);
        let all = PartialSummary::merged("abc", &[a, b]);
        assert_eq!(all.derived_from, BTreeSet::from([0, 1, 2]));
    }

    #[test]
    fn join_uses_newlines() {
        let parts = [PartialSummary::from_chunk("x", 0), PartialSummary::from_chunk("y", 1)];
        assert_eq!(join_contents(&parts), "x\ny");
        assert_eq!(join_contents(&[]), "");
    }
}
