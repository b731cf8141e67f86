//! Fixed word-window chunking with overlap.
//!
//! Splits every N whitespace-delimited words with M words of overlap, so
//! chunk sizes line up exactly with the [`WhitespaceWords`](crate::WhitespaceWords)
//! estimator used for budgets.
//!
//! ## How It Works
//!
//! ```text
//! size = 4, overlap = 1  (step = 3)
//!
//! Words:   a b c d e f g h i
//!
//! Chunk 0: "a b c d "     words 0..4
//! Chunk 1: "d e f g "     words 3..7   <- starts at 4 - 1 = 3
//! Chunk 2: "g h i"        words 6..9   <- reaches the end, stop
//! ```
//!
//! A chunk runs from the first byte of its first word up to the first byte
//! of the word after its last one, so whitespace between words belongs to
//! the chunk on its left. The first chunk also owns any leading whitespace
//! and the last chunk owns trailing whitespace. Together the chunks cover
//! every byte of the input.
//!
//! ## Sizing
//!
//! With `step = size - overlap`, a document of `n` words yields
//! `1 + ceil((n - size) / step)` chunks when `n > size`, and one chunk
//! otherwise. 25,000 words at size 10,000 / overlap 1,000 gives chunks
//! starting at words 0, 9,000 and 18,000.

use std::ops::Range;

use crate::{Chunk, Chunker, Error, Result};

/// Word-window chunker with configurable overlap.
///
/// ## Example
///
/// ```rust
/// use precis::{Chunker, WordChunker};
///
/// let chunker = WordChunker::new(4, 1).unwrap();
/// let chunks = chunker.chunk("a b c d e f g h i");
///
/// assert_eq!(chunks.len(), 3);
/// assert_eq!(chunks[0].content, "a b c d ");
/// assert_eq!(chunks[1].content, "d e f g ");
/// assert_eq!(chunks[2].content, "g h i");
/// ```
#[derive(Debug, Clone)]
pub struct WordChunker {
    size: usize,
    overlap: usize,
}

impl WordChunker {
    /// Create a new word chunker.
    ///
    /// # Arguments
    ///
    /// * `size` - Maximum words per chunk
    /// * `overlap` - Words shared between adjacent chunks
    ///
    /// # Errors
    ///
    /// Returns an error if `size == 0` or `overlap >= size`.
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidChunkSize(size));
        }
        if overlap >= size {
            return Err(Error::OverlapExceedsSize { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    /// Create a chunker with no overlap.
    ///
    /// # Errors
    ///
    /// Returns an error if `size == 0`.
    pub fn no_overlap(size: usize) -> Result<Self> {
        Self::new(size, 0)
    }

    /// The step between chunk starts, in words.
    fn step(&self) -> usize {
        self.size - self.overlap
    }
}

/// Byte ranges of whitespace-delimited words, matching `str::split_whitespace`.
pub(crate) fn word_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut current = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(start) = current.take() {
                spans.push(start..i);
            }
        } else if current.is_none() {
            current = Some(i);
        }
    }
    if let Some(start) = current {
        spans.push(start..text.len());
    }

    spans
}

impl Chunker for WordChunker {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        let words = word_spans(text);
        if words.is_empty() {
            return vec![];
        }

        let step = self.step();
        let mut chunks = Vec::with_capacity(self.estimate_chunks(words.len()));
        let mut first = 0;

        loop {
            let last = (first + self.size).min(words.len());

            let start = if first == 0 { 0 } else { words[first].start };
            let end = if last == words.len() {
                text.len()
            } else {
                words[last].start
            };

            chunks.push(Chunk::new(&text[start..end], start, end, chunks.len()));

            // The window reached the final word; another would sit inside this one
            if last == words.len() {
                break;
            }
            first += step;
        }

        chunks
    }

    /// Here `text_len` is a word count, not bytes.
    fn estimate_chunks(&self, text_len: usize) -> usize {
        if text_len == 0 {
            return 0;
        }
        if text_len <= self.size {
            return 1;
        }
        1 + (text_len - self.size).div_ceil(self.step())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruct;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_basic_chunking() {
        let chunker = WordChunker::new(4, 1).unwrap();
        let chunks = chunker.chunk("a b c d e f g h i");

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].span(), 0..8);
        assert_eq!(chunks[1].start, 6);
        assert_eq!(chunks[2].content, "g h i");
    }

    #[test]
    fn test_empty_and_blank_text() {
        let chunker = WordChunker::new(10, 2).unwrap();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk(" \n\t ").is_empty());
    }

    #[test]
    fn test_text_smaller_than_chunk() {
        let chunker = WordChunker::new(100, 20).unwrap();
        let chunks = chunker.chunk("  small text ");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "  small text ");
    }

    #[test]
    fn test_exact_multiple_does_not_emit_nested_chunk() {
        // 19 words, size 10, step 9: windows 0..10, 9..19 and done
        let chunker = WordChunker::new(10, 1).unwrap();
        let chunks = chunker.chunk(&words(19));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunker.estimate_chunks(19), 2);
    }

    #[test]
    fn test_long_document_scenario() {
        let chunker = WordChunker::new(10_000, 1_000).unwrap();
        let text = words(25_000);
        let chunks = chunker.chunk(&text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunker.estimate_chunks(25_000), 3);
        assert_eq!(chunks[0].content.split_whitespace().count(), 10_000);
        assert_eq!(chunks[1].content.split_whitespace().next(), Some("w9000"));
        assert_eq!(chunks[2].content.split_whitespace().next(), Some("w18000"));
        assert_eq!(chunks[2].content.split_whitespace().count(), 7_000);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_unicode_words() {
        let chunker = WordChunker::new(2, 1).unwrap();
        let text = "日本 語の テキスト です";
        let chunks = chunker.chunk(text);

        for chunk in &chunks {
            assert_eq!(&text[chunk.span()], chunk.content);
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_word_spans_match_split_whitespace() {
        let text = " alpha\u{3000}beta\n gamma ";
        let from_spans: Vec<&str> = word_spans(text).into_iter().map(|r| &text[r]).collect();
        let expected: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(from_spans, expected);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            WordChunker::new(0, 0),
            Err(Error::InvalidChunkSize(0))
        ));
        assert!(matches!(
            WordChunker::new(10, 10),
            Err(Error::OverlapExceedsSize { size: 10, overlap: 10 })
        ));
        assert!(WordChunker::no_overlap(5).is_ok());
    }
}
