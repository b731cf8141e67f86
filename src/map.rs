//! Map stage: one partial summary per chunk.
//!
//! Chunks are independent, so they are summarized concurrently. Fan-out is
//! bounded by `batch_size`: a batch of calls runs together, the stage waits
//! for all of them, pauses for `pacing`, then starts the next batch.
//!
//! ```text
//! chunks:   [c0 c1 c2 c3 c4][c5 c6 c7 c8 c9][c10 c11]
//!            └── batch 1 ──┘ └── batch 2 ──┘ └ b3 ┘
//!                 concurrent  sleep  concurrent  sleep ...
//! ```
//!
//! Output order follows chunk order, although nothing downstream of the
//! collapse stage depends on it.

use std::time::Duration;

use futures::future::try_join_all;

use crate::generate::{variables, vars, Generator, PromptKind};
use crate::{Chunk, PartialSummary, Result, RetryPolicy};

/// Summarizes chunks in paced, bounded batches.
#[derive(Debug, Clone)]
pub struct MapStage<'g, G> {
    generator: &'g G,
    retry: RetryPolicy,
    batch_size: usize,
    pacing: Duration,
}

impl<'g, G: Generator> MapStage<'g, G> {
    /// Create a stage with no pacing between batches.
    ///
    /// A `batch_size` of 0 is treated as 1.
    #[must_use]
    pub fn new(generator: &'g G, retry: RetryPolicy, batch_size: usize) -> Self {
        Self {
            generator,
            retry,
            batch_size: batch_size.max(1),
            pacing: Duration::ZERO,
        }
    }

    /// Wait `pacing` between consecutive batches.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Summarize every chunk.
    ///
    /// # Errors
    ///
    /// The first chunk whose generation fails permanently (after retries)
    /// fails the whole stage. Calls still in flight in the same batch are
    /// dropped.
    pub async fn run(&self, chunks: &[Chunk]) -> Result<Vec<PartialSummary>> {
        let total = chunks.len().div_ceil(self.batch_size);
        let mut summaries = Vec::with_capacity(chunks.len());

        for (i, batch) in chunks.chunks(self.batch_size).enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            let done = try_join_all(batch.iter().map(|chunk| self.summarize(chunk))).await?;
            summaries.extend(done);
            tracing::info!(batch = i + 1, total, "map batch complete");
        }

        Ok(summaries)
    }

    async fn summarize(&self, chunk: &Chunk) -> Result<PartialSummary> {
        let vars = variables([(vars::CONTEXT, chunk.content.clone())]);
        let content = self
            .retry
            .generate(self.generator, PromptKind::SummarizeChunk, &vars)
            .await?;
        tracing::debug!(chunk = chunk.index, words = content.split_whitespace().count(), "chunk summarized");
        Ok(PartialSummary::from_chunk(content, chunk.index))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::generate::{GenerationError, Variables};
    use crate::Error;

    /// Tracks how many calls run at once.
    #[derive(Default)]
    struct Gauge {
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl Generator for Gauge {
        async fn generate(&self, _kind: PromptKind, v: &Variables) -> std::result::Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("sum({})", v[vars::CONTEXT]))
        }
    }

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n).map(|i| Chunk::new(format!("c{i}"), i, i + 1, i)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_summary_per_chunk_in_order() {
        let gen = Gauge::default();
        let out = MapStage::new(&gen, RetryPolicy::none(), 5).run(&chunks(7)).await.unwrap();

        assert_eq!(out.len(), 7);
        for (i, s) in out.iter().enumerate() {
            assert_eq!(s.content, format!("sum(c{i})"));
            assert_eq!(s.derived_from, BTreeSet::from([i]));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_bounded_by_batch_size() {
        let gen = Gauge::default();
        MapStage::new(&gen, RetryPolicy::none(), 3).run(&chunks(10)).await.unwrap();

        assert_eq!(gen.calls.load(Ordering::SeqCst), 10);
        assert_eq!(gen.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_batches_only() {
        let gen = Gauge::default();
        let started = tokio::time::Instant::now();
        MapStage::new(&gen, RetryPolicy::none(), 5)
            .with_pacing(Duration::from_secs(1))
            .run(&chunks(12))
            .await
            .unwrap();

        // 3 batches of 10ms calls, 2 pauses
        assert_eq!(started.elapsed(), Duration::from_millis(2030));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let gen = Gauge::default();
        let out = MapStage::new(&gen, RetryPolicy::none(), 5).run(&[]).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(gen.calls.load(Ordering::SeqCst), 0);
    }

    struct FailOn(usize);

    impl Generator for FailOn {
        async fn generate(&self, _kind: PromptKind, v: &Variables) -> std::result::Result<String, GenerationError> {
            if v[vars::CONTEXT] == format!("c{}", self.0) {
                Err(GenerationError::Fatal("rejected".into()))
            } else {
                Ok("ok".into())
            }
        }
    }

    #[tokio::test]
    async fn test_one_failing_chunk_fails_the_stage() {
        let err = MapStage::new(&FailOn(3), RetryPolicy::none(), 2)
            .run(&chunks(6))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GenerationFatal(_)));
    }
}
