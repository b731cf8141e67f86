//! Document acquisition.
//!
//! Fetching web pages or transcripts is someone else's job. The pipeline
//! only needs "give me the text for this descriptor", and treats any
//! failure as terminal: acquisition is never retried.

use std::future::Future;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::Document;

/// Why a source could not produce text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquisitionError {
    /// The source could not be reached or read.
    #[error("{descriptor} is unreachable: {reason}")]
    Unreachable {
        /// What was requested.
        descriptor: String,
        /// Underlying cause.
        reason: String,
    },

    /// The source was reached but its format is not supported.
    #[error("{descriptor} is not supported: {reason}")]
    Unsupported {
        /// What was requested.
        descriptor: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Produces a [`Document`] from a descriptor such as a path or URL.
pub trait DocumentSource: Send + Sync {
    /// Obtain the raw text.
    ///
    /// # Errors
    ///
    /// Returns [`AcquisitionError`] if the source cannot be fetched or parsed.
    fn acquire(
        &self,
        descriptor: &str,
    ) -> impl Future<Output = Result<Document, AcquisitionError>> + Send;
}

/// Reads local text files.
///
/// | Extension | Handling |
/// |-----------|----------|
/// | `txt`, `md`, `text`, `markdown` | read as-is |
/// | `srt`, `vtt` | cue numbers and timestamps stripped, see [`clean_subtitles`] |
/// | anything else | [`AcquisitionError::Unsupported`] |
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSource;

impl DocumentSource for FileSource {
    async fn acquire(&self, descriptor: &str) -> Result<Document, AcquisitionError> {
        let path = Path::new(descriptor);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let subtitles = match ext.as_str() {
            "txt" | "text" | "md" | "markdown" => false,
            "srt" | "vtt" => true,
            other => {
                return Err(AcquisitionError::Unsupported {
                    descriptor: descriptor.to_string(),
                    reason: format!("unsupported file extension {other:?}"),
                })
            }
        };

        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| AcquisitionError::Unreachable {
                descriptor: descriptor.to_string(),
                reason: e.to_string(),
            })?;
        let text = String::from_utf8(raw).map_err(|_| AcquisitionError::Unsupported {
            descriptor: descriptor.to_string(),
            reason: "file is not valid UTF-8".into(),
        })?;

        let content = if subtitles {
            clean_subtitles(&text)
        } else {
            text
        };
        tracing::debug!(descriptor, bytes = content.len(), "acquired file");

        Ok(Document::new(content, descriptor).with_metadata("format", ext))
    }
}

/// Serves one fixed document, whatever the descriptor.
///
/// Useful when the caller already has the text, e.g. an uploaded transcript.
#[derive(Debug, Clone)]
pub struct StaticSource {
    document: Document,
}

impl StaticSource {
    /// Wrap a document.
    #[must_use]
    pub fn new(document: Document) -> Self {
        Self { document }
    }
}

impl DocumentSource for StaticSource {
    async fn acquire(&self, _descriptor: &str) -> Result<Document, AcquisitionError> {
        Ok(self.document.clone())
    }
}

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}:)?\d{2}:\d{2}[,.]\d{3}\s*-->\s*(\d{1,2}:)?\d{2}:\d{2}[,.]\d{3}")
        .expect("timestamp pattern is valid")
});

fn is_cue_number(line: &str) -> bool {
    !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit())
}

/// Strip SRT/WebVTT timing lines, cue numbers and the `WEBVTT` header,
/// and join cues into running text.
///
/// A line of digits counts as a cue number only when a timing line follows
/// it, so dialogue that is just a number is kept.
///
/// ```rust
/// use precis::clean_subtitles;
///
/// let srt = "1\n00:00:01,000 --> 00:00:02,500\nHello there.\n\n2\n00:00:03,000 --> 00:00:04,000\nGeneral Kenobi.\n";
/// assert_eq!(clean_subtitles(srt), "Hello there. General Kenobi.");
/// ```
#[must_use]
pub fn clean_subtitles(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().map(str::trim).collect();

    lines
        .iter()
        .enumerate()
        .filter(|&(i, line)| {
            if line.is_empty() || line.starts_with("WEBVTT") || TIMESTAMP.is_match(line) {
                return false;
            }
            let before_timing = lines.get(i + 1).is_some_and(|next| TIMESTAMP.is_match(next));
            !(before_timing && is_cue_number(line))
        })
        .map(|(_, line)| *line)
        .collect::<Vec<_>>()
        .join(" ")
}
