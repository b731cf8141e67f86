//! Refine: fold chunks into a running summary, strictly in order.
//!
//! ```text
//! c0 ──RefineInitial──> s1
//! s1 + c1 ──RefineStep──> s2
//! s2 + c2 ──RefineStep──> s3   ... until every chunk is consumed
//! ```
//!
//! Each step depends on the previous one, so there is no concurrency. Use
//! this when the order of chunks carries meaning (a meeting's chronology);
//! reordering the chunks generally changes the result.
//!
//! The context of every call is checked against the pipeline's
//! [`SizeBudget`] first. A running summary that grows until it no longer
//! fits next to the next chunk ends the run with [`Error::Configuration`]
//! instead of sending an oversized context.

use crate::generate::{variables, vars, Generator, PromptKind};
use crate::pipeline::Transition;
use crate::{Chunk, Error, Result, RetryPolicy, SizeBudget, SizeEstimator};

/// Progress of a refine run.
///
/// `index` is the number of chunks already folded into `summary`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefineState {
    /// Chunks in document order.
    pub contents: Vec<Chunk>,
    /// Next chunk to consume.
    pub index: usize,
    /// Running summary. Empty until the first step.
    pub summary: String,
}

impl RefineState {
    /// A fresh state over `contents`.
    #[must_use]
    pub fn new(contents: Vec<Chunk>) -> Self {
        Self {
            contents,
            index: 0,
            summary: String::new(),
        }
    }

    /// Whether every chunk has been consumed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        !self.contents.is_empty() && self.index >= self.contents.len()
    }
}

/// The refine state machine.
#[derive(Clone)]
pub struct Refine<'g, G> {
    generator: &'g G,
    estimator: &'g dyn SizeEstimator,
    budget: SizeBudget,
    retry: RetryPolicy,
}

impl<G> std::fmt::Debug for Refine<'_, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refine")
            .field("budget", &self.budget)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<'g, G: Generator> Refine<'g, G> {
    /// Create the state machine.
    #[must_use]
    pub fn new(
        generator: &'g G,
        estimator: &'g dyn SizeEstimator,
        budget: SizeBudget,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            generator,
            estimator,
            budget,
            retry,
        }
    }

    fn check_context(&self, state: &RefineState, chunk: &Chunk) -> Result<()> {
        let size = self.estimator.estimate(&state.summary) + self.estimator.estimate(&chunk.content);
        if self.budget.admits(size) {
            return Ok(());
        }
        Err(Error::Configuration(format!(
            "refine step {} needs a context of size {size}, over the budget of {}",
            state.index,
            self.budget.max()
        )))
    }

    /// Consume one chunk.
    ///
    /// Returns [`Transition::Terminal`] with the final state once the last
    /// chunk is folded in. Stepping a finished state is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyInput`] for a state with no chunks
    /// - [`Error::Configuration`] if the running summary and the next chunk
    ///   together exceed the budget; no call is made
    /// - any generation error; `state` is consumed and the run is over
    pub async fn step(&self, mut state: RefineState) -> Result<Transition<RefineState>> {
        if state.contents.is_empty() {
            return Err(Error::EmptyInput);
        }
        if state.is_done() {
            return Ok(Transition::Terminal(state));
        }

        let chunk = &state.contents[state.index];
        self.check_context(&state, chunk)?;
        let (kind, vars) = if state.index == 0 {
            (
                PromptKind::RefineInitial,
                variables([(vars::CONTEXT, chunk.content.clone())]),
            )
        } else {
            (
                PromptKind::RefineStep,
                variables([
                    (vars::EXISTING_ANSWER, std::mem::take(&mut state.summary)),
                    (vars::CONTEXT, chunk.content.clone()),
                ]),
            )
        };

        state.summary = self.retry.generate(self.generator, kind, &vars).await?;
        state.index += 1;
        tracing::debug!(step = state.index, of = state.contents.len(), "refined");

        if state.is_done() {
            Ok(Transition::Terminal(state))
        } else {
            Ok(Transition::Next(state))
        }
    }

    /// Drive a state to completion and return the final summary.
    ///
    /// # Errors
    ///
    /// See [`Refine::step`].
    pub async fn run(&self, contents: Vec<Chunk>) -> Result<String> {
        let mut state = RefineState::new(contents);
        tracing::info!(chunks = state.contents.len(), "refine started");
        loop {
            match self.step(state).await? {
                Transition::Next(next) => state = next,
                Transition::Terminal(done) => return Ok(done.summary),
            }
        }
    }
}
