//! Source documents.

use std::collections::BTreeMap;

use crate::{Chunk, Chunker};

/// Raw text plus where it came from.
///
/// Fields are private: a document does not change once acquired.
///
/// ```rust
/// use precis::{Chunker, Document, WordChunker};
///
/// let doc = Document::new("one two three four", "memo.txt")
///     .with_metadata("kind", "memo");
///
/// assert_eq!(doc.source(), "memo.txt");
/// assert_eq!(doc.metadata().get("kind").map(String::as_str), Some("memo"));
///
/// let chunks = doc.chunks(&WordChunker::new(2, 0).unwrap());
/// assert_eq!(chunks.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    content: String,
    source: String,
    metadata: BTreeMap<String, String>,
}

impl Document {
    /// Create a document with no metadata.
    #[must_use]
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry, consuming and returning the document.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The full text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Identifier of where the text came from (path, URL, video id).
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Metadata entries.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Whether the document has no visible text.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Split the content with `chunker`.
    #[must_use]
    pub fn chunks(&self, chunker: &dyn Chunker) -> Vec<Chunk> {
        chunker.chunk(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_is_ordered_and_overwritable() {
        let doc = Document::new("text", "src")
            .with_metadata("b", "2")
            .with_metadata("a", "1")
            .with_metadata("b", "3");
        let entries: Vec<_> = doc.metadata().iter().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], (&"a".to_string(), &"1".to_string()));
        assert_eq!(doc.metadata()["b"], "3");
    }

    #[test]
    fn blank_detection() {
        assert!(Document::new(" \n\t", "x").is_blank());
        assert!(!Document::new(" a ", "x").is_blank());
    }
}
