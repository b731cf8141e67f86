//! # precis
//!
//! Summarize documents that are longer than a language model's context window.
//!
//! ## The Problem
//!
//! A model call takes a bounded amount of text. A two-hour meeting transcript
//! or a long article does not fit. Truncating loses the end; asking for a
//! summary of a summary of the first half loses the second half.
//!
//! The fix is to summarize in pieces and then summarize the summaries, while
//! making sure no single call is ever handed more than it can read:
//!
//! - split the text into overlapping chunks that each fit
//! - summarize every chunk
//! - combine the partial summaries, and if *they* do not fit, combine them in
//!   groups first and try again
//!
//! ## Strategies
//!
//! ### Map-reduce
//!
//! ```text
//! document ──chunk──> [c0] [c1] [c2] ... [cN]
//!                       │    │    │        │        map: concurrent,
//!                       v    v    v        v        batch_size at a time
//!                     [s0] [s1] [s2] ... [sN]
//!                       └──┬─┘    └──┬─────┘        collapse: greedy groups
//!                          v         v              under the size budget,
//!                        [g0]      [g1]             repeated until it fits
//!                          └────┬────┘
//!                               v
//!                         final summary             reduce: one call
//! ```
//!
//! **When to use**: anything where chunks can be understood on their own:
//! articles, documentation, video transcripts.
//! **Weakness**: chunks never see each other, so a thread that runs through
//! the whole document can get lost.
//!
//! ### Refine
//!
//! ```text
//! c0 ──> s1 ──(+c1)──> s2 ──(+c2)──> s3 ... ──> final summary
//! ```
//!
//! Each step hands the model the running summary plus the next chunk.
//!
//! **When to use**: order carries meaning, as in a meeting's chronology.
//! **Weakness**: strictly sequential, so `N` chunks cost `N` round trips.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use precis::{ContentKind, OpenAiCompletion, Pipeline, PipelineConfig, TemplateGenerator};
//!
//! let config = PipelineConfig::for_content(ContentKind::WebPage);
//! let backend = OpenAiCompletion::new(api_key, &config.llm)?;
//! let generator = TemplateGenerator::new(config.templates.clone(), backend);
//!
//! let pipeline = Pipeline::new(generator, &config)?;
//! let summary = pipeline.summarize(&article).await?;
//! println!("{summary}");
//! ```
//!
//! Anything implementing [`Generator`] can stand in for the model, which is
//! how the tests drive the pipeline deterministically.
//!
//! ## Chunking on its own
//!
//! ```rust
//! use precis::{reconstruct, Chunker, RecursiveChunker, WordChunker};
//!
//! let text = "The quick brown fox jumps over the lazy dog. \
//!             Pack my box with five dozen liquor jugs.";
//!
//! // Fixed window of 6 words, 2 shared between neighbours
//! let chunks = WordChunker::new(6, 2).unwrap().chunk(text);
//! assert_eq!(reconstruct(&chunks), text);
//!
//! // Separator hierarchy: paragraphs, lines, words, characters
//! let chunks = RecursiveChunker::prose(8, 2).unwrap().chunk(text);
//! assert!(chunks.len() > 1);
//! ```
//!
//! ## Sizes
//!
//! Every size (chunk size, overlap, budget) is measured by a
//! [`SizeEstimator`], never in bytes:
//!
//! | Estimator | Unit | Cost |
//! |-----------|------|------|
//! | [`WhitespaceWords`] (default) | words | O(n) |
//! | [`UnicodeWords`] | words (UAX #29) | O(n) |
//! | [`CharHeuristic`] | ~tokens | O(n) |
//!
//! ## Failure
//!
//! Generation calls are retried with exponential backoff on rate limits and
//! transient failures ([`RetryPolicy`]). Everything else ends the run with a
//! single [`Error`] whose kind says what went wrong: the source could not be
//! read, the model kept failing, the settings cannot converge, or there was
//! nothing to summarize.
//!
//! ## Features
//!
//! | Feature | Adds |
//! |---------|------|
//! | `openai` | `OpenAiCompletion`, a backend for OpenAI-compatible endpoints |
//! | `web` | `UrlSource` and `AutoSource`, which fetch pages and keep their readable text |
//! | `cli` | the `precis` binary |

mod budget;
mod chat;
mod chunk;
mod collapse;
mod config;
mod document;
mod error;
mod estimate;
pub mod generate;
mod map;
mod pipeline;
mod recursive;
mod refine;
mod retry;
mod session;
mod source;
mod summary;
mod words;

#[cfg(feature = "openai")]
mod openai;
#[cfg(feature = "web")]
mod web;

pub use budget::SizeBudget;
pub use chat::Conversation;
pub use chunk::{reconstruct, Chunk};
pub use collapse::{group_by_budget, CollapseStage};
pub use config::{ChunkerKind, ContentKind, LlmConfig, PipelineConfig};
pub use document::Document;
pub use error::{Error, Result};
pub use estimate::{CharHeuristic, EstimatorKind, SizeEstimator, UnicodeWords, WhitespaceWords};
pub use generate::{
    Completion, GenerationError, Generator, PromptKind, PromptTemplates, TemplateGenerator,
};
pub use map::MapStage;
pub use pipeline::{MapReduce, Phase, Pipeline, PipelineState, Strategy, Transition};
pub use recursive::RecursiveChunker;
pub use refine::{Refine, RefineState};
pub use retry::RetryPolicy;
pub use session::{ChatHistory, MemorySessionStore, Role, SessionHandle, SessionStore, Turn};
pub use source::{clean_subtitles, AcquisitionError, DocumentSource, FileSource, StaticSource};
pub use summary::{PartialSummary, Summary};
pub use words::WordChunker;

#[cfg(feature = "openai")]
pub use openai::OpenAiCompletion;
#[cfg(feature = "web")]
pub use web::{page_text, AutoSource, UrlSource};

/// A text chunking strategy.
///
/// All chunkers implement this trait, enabling polymorphic usage:
///
/// ```rust
/// use precis::{Chunk, Chunker, RecursiveChunker, WordChunker};
///
/// fn chunk_document(chunker: &dyn Chunker, text: &str) -> Vec<Chunk> {
///     chunker.chunk(text)
/// }
///
/// let words = WordChunker::new(100, 20).unwrap();
/// let recursive = RecursiveChunker::prose(100, 20).unwrap();
///
/// let text = "Hello world. This is a test.";
/// assert_eq!(chunk_document(&words, text).len(), 1);
/// assert_eq!(chunk_document(&recursive, text).len(), 1);
/// ```
pub trait Chunker: Send + Sync {
    /// Split text into chunks.
    ///
    /// Each [`Chunk`] holds the text and its byte offsets in the original
    /// document. Empty input yields no chunks.
    fn chunk(&self, text: &str) -> Vec<Chunk>;

    /// Estimate the number of chunks for an input of `text_len` units.
    ///
    /// Useful for pre-allocation. May be approximate.
    fn estimate_chunks(&self, text_len: usize) -> usize {
        // Conservative default
        (text_len / 500).max(1)
    }
}
