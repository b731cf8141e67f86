//! The orchestrator: text in, one bounded summary out.
//!
//! Map-reduce is an explicit state machine rather than a graph engine.
//! Every transition is a plain async function from one [`PipelineState`] to
//! the next:
//!
//! ```text
//!   Map ──> Collect ──┬──────────────> Finalize ──> Done
//!                     │                   ^
//!                     └──> Collapse ──────┤
//!                            ^    │       │
//!                            └────┘ (still over budget)
//! ```
//!
//! | Phase | Does | Calls |
//! |-------|------|-------|
//! | `Map` | summarize every chunk | one per chunk |
//! | `Collect` | copy summaries into the collapse working set | none |
//! | `Collapse` | one level of grouping and reducing | one per group |
//! | `Finalize` | reduce everything that is left | one |
//!
//! [`Refine`] is the sequential alternative; [`Pipeline`] picks one based on
//! [`Strategy`] and drives it to completion.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collapse::CollapseStage;
use crate::config::PipelineConfig;
use crate::generate::Generator;
use crate::map::MapStage;
use crate::refine::Refine;
use crate::source::DocumentSource;
use crate::{
    Chunk, Chunker, Document, Error, PartialSummary, Result, RetryPolicy, SizeBudget, SizeEstimator,
    Summary,
};

/// Which summarization strategy to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Summarize chunks independently, then combine.
    #[default]
    MapReduce,
    /// Fold chunks into a running summary in order.
    Refine,
}

impl Strategy {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MapReduce => "map_reduce",
            Self::Refine => "refine",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "map_reduce" | "mapreduce" => Ok(Self::MapReduce),
            "refine" => Ok(Self::Refine),
            other => Err(format!("unknown strategy {other:?}, expected map_reduce or refine")),
        }
    }
}

/// Outcome of one state machine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<S> {
    /// More work remains.
    Next(S),
    /// The run is complete; the state holds the result.
    Terminal(S),
}

/// Where a map-reduce run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Chunks not yet summarized.
    Map,
    /// Partial summaries ready, working set not yet built.
    Collect,
    /// Working set over budget.
    Collapse,
    /// Working set fits; one reduce remains.
    Finalize,
    /// `final_summary` is set.
    Done,
}

/// State of a map-reduce run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineState {
    /// Chunks in document order.
    pub contents: Vec<Chunk>,
    /// One partial summary per chunk. Only ever appended to.
    pub summaries: Vec<PartialSummary>,
    /// The collapse working set.
    pub collapsed_summaries: Vec<PartialSummary>,
    /// Set once, on entering [`Phase::Done`].
    pub final_summary: Option<String>,
    /// Current phase.
    pub phase: Phase,
    /// Collapse levels completed so far.
    pub collapse_levels: usize,
    /// Successful generation calls so far.
    pub generation_calls: usize,
}

impl PipelineState {
    /// A fresh state over `contents`.
    #[must_use]
    pub fn new(contents: Vec<Chunk>) -> Self {
        Self {
            contents,
            summaries: Vec::new(),
            collapsed_summaries: Vec::new(),
            final_summary: None,
            phase: Phase::Map,
            collapse_levels: 0,
            generation_calls: 0,
        }
    }
}

/// The map-reduce state machine.
#[derive(Debug)]
pub struct MapReduce<'g, G> {
    map: MapStage<'g, G>,
    collapse: CollapseStage<'g, G>,
    max_collapse_levels: usize,
}

impl<'g, G: Generator> MapReduce<'g, G> {
    /// Assemble from its stages.
    #[must_use]
    pub fn new(map: MapStage<'g, G>, collapse: CollapseStage<'g, G>, max_collapse_levels: usize) -> Self {
        Self {
            map,
            collapse,
            max_collapse_levels,
        }
    }

    /// Perform one transition.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyInput`] when the state has no chunks, before any call
    /// - [`Error::Configuration`] when collapsing cannot converge or runs
    ///   past `max_collapse_levels`
    /// - any generation error
    pub async fn step(&self, mut state: PipelineState) -> Result<Transition<PipelineState>> {
        match state.phase {
            Phase::Map => {
                if state.contents.is_empty() {
                    return Err(Error::EmptyInput);
                }
                let partials = self.map.run(&state.contents).await?;
                state.generation_calls += partials.len();
                state.summaries.extend(partials);
                state.phase = Phase::Collect;
            }
            Phase::Collect => {
                state.collapsed_summaries = state.summaries.clone();
                state.phase = self.route(&state.collapsed_summaries);
            }
            Phase::Collapse => {
                if state.collapse_levels >= self.max_collapse_levels {
                    return Err(Error::Configuration(format!(
                        "summaries still over budget after {} collapse levels",
                        state.collapse_levels
                    )));
                }
                let working = std::mem::take(&mut state.collapsed_summaries);
                let collapsed = self.collapse.collapse_level(working).await?;
                state.generation_calls += collapsed.len();
                state.collapse_levels += 1;
                state.phase = self.route(&collapsed);
                state.collapsed_summaries = collapsed;
            }
            Phase::Finalize => {
                let content = self.collapse.reduce(&state.collapsed_summaries).await?;
                state.generation_calls += 1;
                state.final_summary = Some(content);
                state.phase = Phase::Done;
                return Ok(Transition::Terminal(state));
            }
            Phase::Done => return Ok(Transition::Terminal(state)),
        }
        Ok(Transition::Next(state))
    }

    /// Drive a fresh state over `contents` to [`Phase::Done`].
    ///
    /// # Errors
    ///
    /// See [`MapReduce::step`].
    pub async fn run(&self, contents: Vec<Chunk>) -> Result<PipelineState> {
        let mut state = PipelineState::new(contents);
        loop {
            match self.step(state).await? {
                Transition::Next(next) => {
                    tracing::debug!(phase = ?next.phase, "map-reduce transition");
                    state = next;
                }
                Transition::Terminal(done) => return Ok(done),
            }
        }
    }

    fn route(&self, working: &[PartialSummary]) -> Phase {
        if self.collapse.needs_collapse(working) {
            Phase::Collapse
        } else {
            Phase::Finalize
        }
    }
}

/// A configured summarization pipeline.
///
/// ```rust,ignore
/// let config = PipelineConfig::for_content(ContentKind::WebPage);
/// let pipeline = Pipeline::new(generator, &config)?;
/// let summary = pipeline.summarize(&page_text).await?;
/// println!("{summary}");
/// ```
pub struct Pipeline<G> {
    generator: G,
    chunker: Box<dyn Chunker>,
    estimator: Arc<dyn SizeEstimator>,
    budget: SizeBudget,
    retry: RetryPolicy,
    strategy: Strategy,
    batch_size: usize,
    batch_pacing: Duration,
    max_collapse_levels: usize,
    deadline: Option<Duration>,
}

impl<G> std::fmt::Debug for Pipeline<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("strategy", &self.strategy)
            .field("budget", &self.budget)
            .field("retry", &self.retry)
            .field("batch_size", &self.batch_size)
            .field("batch_pacing", &self.batch_pacing)
            .field("max_collapse_levels", &self.max_collapse_levels)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl<G: Generator> Pipeline<G> {
    /// Build a pipeline from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] (or a chunker construction error) if
    /// `config` is invalid.
    pub fn new(generator: G, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let estimator: Arc<dyn SizeEstimator> = Arc::from(config.estimator.build());
        let chunker = config
            .chunker
            .build(config.chunk_size, config.chunk_overlap, Arc::clone(&estimator))?;

        Ok(Self {
            generator,
            chunker,
            estimator,
            budget: SizeBudget::new(config.size_budget)?,
            retry: config.retry,
            strategy: config.strategy,
            batch_size: config.batch_size,
            batch_pacing: config.batch_pacing,
            max_collapse_levels: config.max_collapse_levels,
            deadline: config.deadline(),
        })
    }

    /// Replace the chunker built from configuration.
    #[must_use]
    pub fn with_chunker(mut self, chunker: Box<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    /// The strategy in use.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The size budget in use.
    #[must_use]
    pub fn budget(&self) -> SizeBudget {
        self.budget
    }

    /// The generator.
    #[must_use]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Split `text` the way [`Pipeline::summarize`] would.
    #[must_use]
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        self.chunker.chunk(text)
    }

    /// The map-reduce state machine wired to this pipeline's settings.
    #[must_use]
    pub fn map_reduce(&self) -> MapReduce<'_, G> {
        let map = MapStage::new(&self.generator, self.retry, self.batch_size).with_pacing(self.batch_pacing);
        let collapse = CollapseStage::new(
            &self.generator,
            self.estimator.as_ref(),
            self.budget,
            self.retry,
            self.batch_size,
        );
        MapReduce::new(map, collapse, self.max_collapse_levels)
    }

    /// The refine state machine wired to this pipeline's settings.
    #[must_use]
    pub fn refine(&self) -> Refine<'_, G> {
        Refine::new(&self.generator, self.estimator.as_ref(), self.budget, self.retry)
    }

    /// Summarize raw text.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyInput`] if the text yields no chunks; no generation
    ///   call is made
    /// - [`Error::DeadlineExceeded`] if a deadline is configured and passes
    /// - any error from the chosen strategy
    pub async fn summarize(&self, text: &str) -> Result<Summary> {
        self.with_deadline(self.run(text)).await
    }

    /// Summarize a document's content.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::summarize`].
    pub async fn summarize_document(&self, document: &Document) -> Result<Summary> {
        tracing::info!(source = document.source(), "summarizing document");
        self.summarize(document.content()).await
    }

    /// Acquire a document from `source`, then summarize it.
    ///
    /// The deadline, if any, covers acquisition too.
    ///
    /// # Errors
    ///
    /// [`Error::Acquisition`] if the source fails (never retried), otherwise
    /// see [`Pipeline::summarize`].
    pub async fn summarize_source<S: DocumentSource>(&self, source: &S, descriptor: &str) -> Result<Summary> {
        self.with_deadline(async {
            let document = source.acquire(descriptor).await?;
            tracing::info!(source = document.source(), bytes = document.content().len(), "acquired");
            self.run(document.content()).await
        })
        .await
    }

    async fn run(&self, text: &str) -> Result<Summary> {
        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            return Err(Error::EmptyInput);
        }
        let n = chunks.len();
        tracing::info!(strategy = %self.strategy, chunks = n, "summarization started");

        let summary = match self.strategy {
            Strategy::MapReduce => {
                let done = self.map_reduce().run(chunks).await?;
                let content = done.final_summary.ok_or_else(|| {
                    Error::Configuration("map-reduce finished without a final summary".into())
                })?;
                Summary {
                    content,
                    strategy: Strategy::MapReduce,
                    chunks: n,
                    collapse_levels: done.collapse_levels,
                    generation_calls: done.generation_calls,
                }
            }
            Strategy::Refine => Summary {
                content: self.refine().run(chunks).await?,
                strategy: Strategy::Refine,
                chunks: n,
                collapse_levels: 0,
                generation_calls: n,
            },
        };

        tracing::info!(
            chunks = summary.chunks,
            collapse_levels = summary.collapse_levels,
            calls = summary.generation_calls,
            "summarization finished"
        );
        Ok(summary)
    }

    async fn with_deadline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.deadline {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Error::DeadlineExceeded(limit))?,
            None => fut.await,
        }
    }
}
