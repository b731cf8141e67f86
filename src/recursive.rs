//! Recursive separator splitting with overlap (LangChain-style).
//!
//! Tries progressively finer separators until every piece fits, then merges
//! pieces back into windows of at most `chunk_size` with up to
//! `chunk_overlap` carried over between neighbours.
//!
//! ## The Algorithm
//!
//! Given separators `["\n\n", "\n", " ", ""]` and `chunk_size = 100`:
//!
//! ```text
//! 1. Split on "\n\n" (paragraphs)
//! 2. Any piece > 100? Split that piece on "\n" (lines)
//! 3. Still > 100? Split on " " (words)
//! 4. Still > 100? "" means: cut at character boundaries
//! 5. Merge adjacent pieces into windows <= 100,
//!    starting each new window with trailing pieces of the previous one
//!    worth at most `chunk_overlap`
//! ```
//!
//! Separators stay attached to the piece on their left, so every byte of the
//! input lands in some piece and the chunks cover the document exactly.
//!
//! ## Sizes
//!
//! Piece sizes come from the chunker's [`SizeEstimator`]. A window's size is
//! the sum of its pieces, which never undercounts: two pieces cut mid-word
//! count as two words where the joined text has one. Chunks therefore never
//! exceed `chunk_size` as measured on their own text.

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;

use crate::{Chunk, Chunker, Error, Result, SizeEstimator, WhitespaceWords};

/// Recursive separator splitter.
///
/// ## Example
///
/// ```rust
/// use precis::{reconstruct, Chunker, RecursiveChunker};
///
/// let chunker = RecursiveChunker::prose(8, 2).unwrap();
/// let text = "Paragraph one is short.\n\nParagraph two is longer and will need splitting.";
/// let chunks = chunker.chunk(text);
///
/// assert!(chunks.len() >= 2);
/// assert_eq!(reconstruct(&chunks), text);
/// ```
#[derive(Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    overlap: usize,
    separators: Vec<String>,
    estimator: Arc<dyn SizeEstimator>,
}

impl std::fmt::Debug for RecursiveChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursiveChunker")
            .field("chunk_size", &self.chunk_size)
            .field("overlap", &self.overlap)
            .field("separators", &self.separators)
            .finish_non_exhaustive()
    }
}

impl RecursiveChunker {
    /// Create a new recursive chunker measuring sizes in whitespace words.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - Maximum chunk size in estimator units
    /// * `overlap` - Size carried over between adjacent chunks
    /// * `separators` - Hierarchy of separators, coarsest first; `""` cuts
    ///   at character boundaries
    ///
    /// # Errors
    ///
    /// Returns an error if `chunk_size == 0`, `overlap >= chunk_size` or
    /// `separators` is empty.
    pub fn new(chunk_size: usize, overlap: usize, separators: &[&str]) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidChunkSize(chunk_size));
        }
        if overlap >= chunk_size {
            return Err(Error::OverlapExceedsSize {
                size: chunk_size,
                overlap,
            });
        }
        if separators.is_empty() {
            return Err(Error::Configuration("separators must not be empty".into()));
        }

        Ok(Self {
            chunk_size,
            overlap,
            separators: separators.iter().map(|&s| s.to_string()).collect(),
            estimator: Arc::new(WhitespaceWords),
        })
    }

    /// Create a chunker with the default separators for prose and transcripts.
    ///
    /// # Errors
    ///
    /// See [`RecursiveChunker::new`].
    pub fn prose(chunk_size: usize, overlap: usize) -> Result<Self> {
        Self::new(chunk_size, overlap, &["\n\n", "\n", " ", ""])
    }

    /// Create a chunker with separators for Markdown.
    ///
    /// # Errors
    ///
    /// See [`RecursiveChunker::new`].
    pub fn markdown(chunk_size: usize, overlap: usize) -> Result<Self> {
        Self::new(
            chunk_size,
            overlap,
            &["\n## ", "\n### ", "\n\n", "\n", ". ", " ", ""],
        )
    }

    /// Measure sizes with a different estimator.
    #[must_use]
    pub fn with_estimator(mut self, estimator: Arc<dyn SizeEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    fn size_of(&self, text: &str, range: &Range<usize>) -> usize {
        self.estimator.estimate(&text[range.clone()])
    }

    /// Split `range` into pieces that each fit, pushing them in order.
    fn split_recursive(
        &self,
        text: &str,
        range: Range<usize>,
        sep_index: usize,
        out: &mut Vec<(Range<usize>, usize)>,
    ) {
        let size = self.size_of(text, &range);
        if size <= self.chunk_size {
            out.push((range, size));
            return;
        }

        let Some(sep) = self.separators.get(sep_index) else {
            self.force_split(text, range, out);
            return;
        };
        if sep.is_empty() {
            self.force_split(text, range, out);
            return;
        }

        let mut parts = Vec::new();
        let mut part_start = range.start;
        for (pos, _) in text[range.clone()].match_indices(sep.as_str()) {
            let part_end = range.start + pos + sep.len();
            parts.push(part_start..part_end);
            part_start = part_end;
        }
        if part_start < range.end {
            parts.push(part_start..range.end);
        }

        if parts.len() == 1 {
            // Separator not found, try next one
            self.split_recursive(text, range, sep_index + 1, out);
            return;
        }

        for part in parts {
            self.split_recursive(text, part, sep_index + 1, out);
        }
    }

    /// Cut at character boundaries when no separator helps.
    ///
    /// Each piece is found by galloping over prefix lengths 1, 2, 4, ...
    /// until one overflows, then bisecting inside that bracket. Only
    /// prefixes up to twice the piece length are ever measured, so a long
    /// unbroken run is split in near-linear time.
    fn force_split(&self, text: &str, range: Range<usize>, out: &mut Vec<(Range<usize>, usize)>) {
        let ends: Vec<usize> = text[range.clone()]
            .char_indices()
            .map(|(i, c)| range.start + i + c.len_utf8())
            .collect();

        let mut start = range.start;
        let mut next = 0;

        while next < ends.len() {
            let remaining = &ends[next..];
            // The estimator is monotonic, so the fitting prefixes come first
            let fits = |chars: usize| self.size_of(text, &(start..remaining[chars - 1])) <= self.chunk_size;

            // `lo` chars fit (or lo == 0), `hi` chars do not (or run past the end)
            let mut lo = 0;
            let mut hi = 1;
            while hi <= remaining.len() && fits(hi) {
                lo = hi;
                hi *= 2;
            }
            let mut hi = hi.min(remaining.len() + 1);
            while hi - lo > 1 {
                let mid = lo + (hi - lo) / 2;
                if fits(mid) {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }

            // Always take at least one character
            let taken = lo.max(1);
            let end = remaining[taken - 1];

            let piece = start..end;
            let size = self.size_of(text, &piece);
            out.push((piece, size));

            start = end;
            next += taken;
        }
    }

    /// Merge fitting pieces into overlapping windows.
    fn merge(&self, text: &str, pieces: &[(Range<usize>, usize)]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0usize;

        for (piece, size) in pieces {
            if !window.is_empty() && total + size > self.chunk_size {
                push_window(text, &window, &mut chunks);

                // Keep a tail of at most `overlap` that leaves room for the next piece
                while let Some((_, front_size)) = window.front() {
                    if total > self.overlap || total + size > self.chunk_size {
                        total -= front_size;
                        window.pop_front();
                    } else {
                        break;
                    }
                }
            }
            window.push_back((piece.clone(), *size));
            total += size;
        }

        if !window.is_empty() {
            push_window(text, &window, &mut chunks);
        }

        chunks
    }
}

fn push_window(text: &str, window: &VecDeque<(Range<usize>, usize)>, chunks: &mut Vec<Chunk>) {
    if let (Some((first, _)), Some((last, _))) = (window.front(), window.back()) {
        let (start, end) = (first.start, last.end);
        chunks.push(Chunk::new(&text[start..end], start, end, chunks.len()));
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return vec![];
        }

        let mut pieces = Vec::new();
        self.split_recursive(text, 0..text.len(), 0, &mut pieces);

        self.merge(text, &pieces)
    }

    fn estimate_chunks(&self, text_len: usize) -> usize {
        (text_len / self.chunk_size).max(1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{reconstruct, CharHeuristic};

    #[test]
    fn test_paragraph_split() {
        let chunker = RecursiveChunker::prose(10, 0).unwrap();
        let text = "Short.\n\nThis is a longer paragraph that might need splitting into smaller pieces.";
        let chunks = chunker.chunk(text);

        assert!(chunks.len() >= 2);
        assert!(chunks[0].content.contains("Short"));
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_respects_chunk_size() {
        let chunker = RecursiveChunker::prose(4, 1).unwrap();
        let text = "The quick brown fox jumps over the lazy dog and keeps running far away.";
        let chunks = chunker.chunk(text);

        for chunk in &chunks {
            let words = chunk.content.split_whitespace().count();
            assert!(words <= 4, "chunk too large: {words} words in {chunk}");
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_overlap_carries_tail() {
        let chunker = RecursiveChunker::new(4, 1, &[" "]).unwrap();
        let chunks = chunker.chunk("a b c d e f g");

        assert_eq!(chunks[0].content, "a b c d ");
        assert!(chunks[1].content.starts_with("d "));
        assert!(chunks[1].overlap_with(&chunks[0]) > 0);
    }

    #[test]
    fn test_empty_and_blank_text() {
        let chunker = RecursiveChunker::prose(100, 10).unwrap();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("\n\n  \n").is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunker = RecursiveChunker::prose(100, 10).unwrap();
        let chunks = chunker.chunk("Small text.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Small text.");
    }

    #[test]
    fn test_force_split_with_token_estimator() {
        let chunker = RecursiveChunker::prose(3, 0)
            .unwrap()
            .with_estimator(Arc::new(CharHeuristic::default()));
        let text = "x".repeat(50);
        let chunks = chunker.chunk(&text);

        for chunk in &chunks {
            assert!(chunk.len() <= 12, "chunk too large: {chunk}");
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_force_split_respects_char_boundaries() {
        let chunker = RecursiveChunker::new(2, 0, &[""])
            .unwrap()
            .with_estimator(Arc::new(CharHeuristic::new(1)));
        let text = "日本語テキスト";
        let chunks = chunker.chunk(text);

        assert_eq!(chunks.len(), 4);
        assert_eq!(reconstruct(&chunks), text);
    }

    /// Counts every character it is asked to measure.
    struct Metered {
        inner: CharHeuristic,
        scanned: Arc<AtomicUsize>,
    }

    impl SizeEstimator for Metered {
        fn estimate(&self, text: &str) -> usize {
            self.scanned.fetch_add(text.chars().count(), Ordering::Relaxed);
            self.inner.estimate(text)
        }
    }

    #[test]
    fn test_force_split_scans_long_runs_near_linearly() {
        let scanned = Arc::new(AtomicUsize::new(0));
        let chunker = RecursiveChunker::new(10, 0, &[""])
            .unwrap()
            .with_estimator(Arc::new(Metered {
                inner: CharHeuristic::new(1),
                scanned: Arc::clone(&scanned),
            }));
        let n = 20_000;
        let text = "x".repeat(n);
        let chunks = chunker.chunk(&text);

        assert_eq!(chunks.len(), n / 10);
        assert!(chunks.iter().all(|c| c.len() == 10));
        assert_eq!(reconstruct(&chunks), text);
        let total = scanned.load(Ordering::Relaxed);
        assert!(total < 64 * n, "measured {total} chars to split {n}");
    }

    #[test]
    fn test_markdown_headers() {
        let chunker = RecursiveChunker::markdown(6, 0).unwrap();
        let text = "# Title\n\nIntro.\n\n## Section 1\n\nContent one here.\n\n## Section 2\n\nContent two here.";
        let chunks = chunker.chunk(text);

        assert!(chunks.len() >= 2);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            RecursiveChunker::prose(0, 0),
            Err(Error::InvalidChunkSize(0))
        ));
        assert!(matches!(
            RecursiveChunker::prose(5, 5),
            Err(Error::OverlapExceedsSize { .. })
        ));
        assert!(matches!(
            RecursiveChunker::new(5, 0, &[]),
            Err(Error::Configuration(_))
        ));
    }
}
