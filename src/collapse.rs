//! Reduce and collapse: shrink partial summaries until one reduce call fits.
//!
//! ## The loop
//!
//! ```text
//!   summaries ──> total <= budget? ──yes──> reduce(all) ──> final summary
//!                      │
//!                      no
//!                      │
//!           group greedily under budget
//!                      │
//!           reduce each group (concurrently)
//!                      │
//!                      └──────> back to the top with fewer, shorter units
//! ```
//!
//! ## Grouping
//!
//! [`group_by_budget`] walks the units in order and starts a new group when
//! adding the next unit would push the group past the budget. A group is
//! measured as the text the reduce call will actually receive: the units'
//! contents joined with newlines, estimated as a whole. That yields maximal
//! contiguous groups, and is the canonical grouping: it is stable for a
//! given input order, which keeps runs reproducible.
//!
//! Two situations cannot converge and are reported as
//! [`Error::Configuration`] before any call is made at that level:
//!
//! - a single unit is larger than the budget
//! - no two adjacent units fit together, so the level would not reduce the
//!   unit count
//!
//! When any two adjacent units fit together once joined, each level at
//! least halves the number of units, so `N` units converge within
//! `ceil(log2 N)` levels.

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::generate::{variables, vars, Generator, PromptKind};
use crate::summary::join_contents;
use crate::{Error, PartialSummary, Result, RetryPolicy, SizeBudget, SizeEstimator};

/// Split `items` into maximal contiguous groups whose size fits `budget`.
///
/// `size_of` measures a contiguous run of items as it will be used, so
/// separators added when the run is joined count against the budget.
///
/// ```rust
/// use precis::{group_by_budget, SizeBudget};
///
/// let sizes = vec![1500, 1500, 1500];
/// let groups = group_by_budget(sizes, |run| run.iter().sum(), SizeBudget::new(4000).unwrap()).unwrap();
/// assert_eq!(groups, vec![vec![1500, 1500], vec![1500]]);
/// ```
///
/// # Errors
///
/// Returns [`Error::Configuration`] if any single item exceeds the budget.
pub fn group_by_budget<T, F>(items: Vec<T>, size_of: F, budget: SizeBudget) -> Result<Vec<Vec<T>>>
where
    F: Fn(&[T]) -> usize,
{
    for (i, item) in items.iter().enumerate() {
        let size = size_of(std::slice::from_ref(item));
        if !budget.admits(size) {
            return Err(Error::Configuration(format!(
                "unit {i} has size {size}, over the budget of {} on its own",
                budget.max()
            )));
        }
    }

    let mut groups = Vec::new();
    let mut current = Vec::new();

    for item in items {
        current.push(item);
        if current.len() > 1 && !budget.admits(size_of(&current)) {
            // The item fits alone, so it opens the next group
            let next = current.split_off(current.len() - 1);
            groups.push(std::mem::replace(&mut current, next));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }

    Ok(groups)
}

/// Collapses partial summaries and produces the final reduce.
pub struct CollapseStage<'g, G> {
    generator: &'g G,
    estimator: &'g dyn SizeEstimator,
    budget: SizeBudget,
    retry: RetryPolicy,
    concurrency: usize,
}

impl<G> std::fmt::Debug for CollapseStage<'_, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollapseStage")
            .field("budget", &self.budget)
            .field("retry", &self.retry)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl<'g, G: Generator> CollapseStage<'g, G> {
    /// Create a stage. `concurrency` bounds the reduce calls in flight within
    /// one level; 0 is treated as 1.
    #[must_use]
    pub fn new(
        generator: &'g G,
        estimator: &'g dyn SizeEstimator,
        budget: SizeBudget,
        retry: RetryPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            generator,
            estimator,
            budget,
            retry,
            concurrency: concurrency.max(1),
        }
    }

    /// Estimated size of `summaries` as one reduce call receives them,
    /// joined with newlines.
    #[must_use]
    pub fn total_size(&self, summaries: &[PartialSummary]) -> usize {
        self.estimator.estimate(&join_contents(summaries))
    }

    /// Whether `summaries` are too large for a single reduce call.
    #[must_use]
    pub fn needs_collapse(&self, summaries: &[PartialSummary]) -> bool {
        !self.budget.admits(self.total_size(summaries))
    }

    /// Run one collapse level: group, then reduce each group.
    ///
    /// Returns the new units, in group order, each covering the union of its
    /// group's chunk indices.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if the level cannot make progress (see the
    ///   module docs); no generation call is made in that case
    /// - any generation error from a group's reduce call
    pub async fn collapse_level(&self, summaries: Vec<PartialSummary>) -> Result<Vec<PartialSummary>> {
        let units = summaries.len();
        let groups = group_by_budget(summaries, |run| self.total_size(run), self.budget)?;

        if units > 1 && groups.len() == units {
            return Err(Error::Configuration(format!(
                "no two adjacent summaries fit together in a budget of {}; collapse cannot converge",
                self.budget.max()
            )));
        }

        tracing::info!(units, groups = groups.len(), "collapsing summaries");

        stream::iter(groups)
            .map(|group| async move {
                let content = self.reduce_raw(&group).await?;
                Ok::<_, Error>(PartialSummary::merged(content, &group))
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    /// The final reduce over summaries that fit the budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `summaries` do not fit (collapse
    /// them first), or any generation error.
    pub async fn reduce(&self, summaries: &[PartialSummary]) -> Result<String> {
        let total = self.total_size(summaries);
        if !self.budget.admits(total) {
            return Err(Error::Configuration(format!(
                "final reduce input of size {total} exceeds the budget of {}",
                self.budget.max()
            )));
        }
        tracing::info!(units = summaries.len(), total, "final reduce");
        self.reduce_raw(summaries).await
    }

    async fn reduce_raw(&self, group: &[PartialSummary]) -> Result<String> {
        let vars = variables([(vars::DOCS, join_contents(group))]);
        self.retry
            .generate(self.generator, PromptKind::Reduce, &vars)
            .await
    }
}
