//! The Chunk type: a bounded slice of a document with position metadata.

/// A contiguous fragment of a document.
///
/// `start` and `end` are byte offsets into the original text, and `content`
/// is always exactly `text[start..end]`:
///
/// ```rust
/// use precis::Chunk;
///
/// let text = "Hello, world!";
/// let chunk = Chunk::new("world", 7, 12, 0);
///
/// assert_eq!(&text[chunk.span()], chunk.content);
/// ```
///
/// ## Overlap
///
/// Neighbouring chunks may share text. The shared region of chunk `k` and
/// chunk `k + 1` is `chunks[k + 1].start..chunks[k].end`:
///
/// ```text
/// Original: "one two three four five"
/// Chunk 0:  "one two three "        [0..14]
/// Chunk 1:  "three four five"       [8..23]
///                 ^^^^^^
///            overlap [8..14]
/// ```
///
/// `index` is the chunk's position in the sequence. Map-reduce ignores it;
/// the refine strategy folds chunks strictly in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text.
    pub content: String,
    /// Byte offset where this chunk starts in the original document.
    pub start: usize,
    /// Byte offset where this chunk ends (exclusive) in the original document.
    pub end: usize,
    /// Zero-based sequence index.
    pub index: usize,
}

impl Chunk {
    /// Create a new chunk.
    #[must_use]
    pub fn new(content: impl Into<String>, start: usize, end: usize, index: usize) -> Self {
        Self {
            content: content.into(),
            start,
            end,
            index,
        }
    }

    /// The length of this chunk in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether this chunk is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// The byte span of this chunk in the original document.
    #[must_use]
    pub fn span(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }

    /// Bytes shared with another chunk of the same document.
    ///
    /// Symmetric: `a.overlap_with(&b) == b.overlap_with(&a)`, and 0 for
    /// disjoint or merely adjacent chunks.
    #[must_use]
    pub fn overlap_with(&self, other: &Self) -> usize {
        self.end.min(other.end).saturating_sub(self.start.max(other.start))
    }
}

impl std::fmt::Display for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Chunk {{ index: {}, span: {}..{}, len: {} }}",
            self.index,
            self.start,
            self.end,
            self.len()
        )
    }
}

/// Rebuild the original text from an ordered chunk sequence.
///
/// Each chunk contributes only the bytes past the end of its predecessor,
/// so overlapping regions appear once. For chunks produced by any
/// [`Chunker`](crate::Chunker) in this crate, `reconstruct(&chunker.chunk(t)) == t`.
///
/// ```rust
/// use precis::{reconstruct, Chunker, WordChunker};
///
/// let text = "one two three four five six seven";
/// let chunker = WordChunker::new(3, 1).unwrap();
/// assert_eq!(reconstruct(&chunker.chunk(text)), text);
/// ```
#[must_use]
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;

    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start).min(chunk.len());
        out.push_str(&chunk.content[skip..]);
        covered = covered.max(chunk.end);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_measured_in_bytes() {
        let a = Chunk::new("one two three ", 0, 14, 0);
        let b = Chunk::new("three four five", 8, 23, 1);
        assert_eq!(b.overlap_with(&a), 6);
        assert_eq!(a.overlap_with(&b), 6);
    }

    #[test]
    fn overlap_of_disjoint_chunks_is_zero() {
        let a = Chunk::new("one two ", 0, 8, 0);
        let b = Chunk::new("three", 8, 13, 1);
        let far = Chunk::new("five", 19, 23, 2);
        assert_eq!(a.overlap_with(&b), 0);
        assert_eq!(b.overlap_with(&a), 0);
        assert_eq!(a.overlap_with(&far), 0);
        assert_eq!(far.overlap_with(&a), 0);
    }

    #[test]
    fn reconstruct_tracks_coverage_across_many_chunks() {
        let chunks = vec![
            Chunk::new("ab", 0, 2, 0),
            Chunk::new("bc", 1, 3, 1),
            Chunk::new("cd", 2, 4, 2),
        ];
        assert_eq!(reconstruct(&chunks), "abcd");
    }

    #[test]
    fn reconstruct_drops_shared_bytes() {
        let chunks = vec![
            Chunk::new("one two three ", 0, 14, 0),
            Chunk::new("three four five", 8, 23, 1),
        ];
        assert_eq!(reconstruct(&chunks), "one two three four five");
    }

    #[test]
    fn reconstruct_empty() {
        assert_eq!(reconstruct(&[]), "");
    }

    #[test]
    fn display_shows_span() {
        let chunk = Chunk::new("abc", 4, 7, 2);
        assert_eq!(chunk.to_string(), "Chunk { index: 2, span: 4..7, len: 3 }");
    }
}
