//! Error types for precis.

use std::time::Duration;

use crate::generate::GenerationError;
use crate::source::AcquisitionError;

/// Errors that can end a summarization run.
///
/// Every stage reports through this type, and the orchestrator passes the
/// kind through unchanged. Mapping kinds to user-facing messages is up to
/// the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid chunk size (must be > 0).
    #[error("invalid chunk size: {0} (must be > 0)")]
    InvalidChunkSize(usize),

    /// Overlap is not strictly smaller than the chunk size.
    #[error("overlap {overlap} must be smaller than chunk size {size}")]
    OverlapExceedsSize {
        /// The chunk size.
        size: usize,
        /// The overlap that was too large.
        overlap: usize,
    },

    /// The source text could not be obtained.
    #[error("source inaccessible: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// A retryable generation failure persisted through every attempt.
    #[error("generation failed after {attempts} attempts: {last}")]
    GenerationExhausted {
        /// Number of attempts made, including the first.
        attempts: u32,
        /// The error returned by the final attempt.
        last: GenerationError,
    },

    /// The generation client rejected the request outright.
    #[error("generation failed: {0}")]
    GenerationFatal(GenerationError),

    /// Settings that cannot produce a summary, such as a summary that alone
    /// exceeds the size budget.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The document produced no chunks.
    #[error("nothing to summarize: input produced zero chunks")]
    EmptyInput,

    /// The whole run took longer than the configured deadline.
    #[error("summarization exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    /// The configuration file could not be parsed.
    #[error("invalid config file: {0}")]
    ConfigFile(String),

    /// I/O failure while reading configuration.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error came from the generation client.
    #[must_use]
    pub fn is_generation(&self) -> bool {
        matches!(
            self,
            Self::GenerationExhausted { .. } | Self::GenerationFatal(_)
        )
    }
}

/// Result type for precis operations.
pub type Result<T> = std::result::Result<T, Error>;
