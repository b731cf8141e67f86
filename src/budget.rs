//! The size budget that bounds every reduce call.
//!
//! ## The Problem
//!
//! Map-reduce only works if the reduce step can see everything it is asked
//! to combine. A dozen chunk summaries of 500 words each will not fit in a
//! context window sized for 4000 words, so they have to be combined in
//! stages:
//!
//! ```text
//! budget = 4000
//!
//! level 0: [1500] [1500] [1500] [1500]          total 6000 > 4000
//!           \_____ ____/ \_____ ____/
//!                 v            v
//! level 1:     [1200]       [1200]              total 2400 <= 4000
//!                   \___ ____/
//!                       v
//! final:             [800]
//! ```
//!
//! `SizeBudget` is the threshold for those decisions. It is measured in the
//! units of whichever [`SizeEstimator`](crate::SizeEstimator) the pipeline
//! uses, usually words.

use std::cmp::Ordering;

use crate::{Error, Result};

/// Maximum estimated size of the context passed to one reduce call.
///
/// # Examples
///
/// ```rust
/// use precis::SizeBudget;
///
/// let budget = SizeBudget::new(4000).unwrap();
/// assert!(budget.admits(4000));
/// assert!(!budget.admits(4001));
/// assert!(budget.would_overflow(3000, 1001));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SizeBudget {
    max: usize,
}

impl SizeBudget {
    /// Create a budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `max == 0`: nothing would fit and
    /// collapsing could never converge.
    pub fn new(max: usize) -> Result<Self> {
        if max == 0 {
            return Err(Error::Configuration("size budget must be > 0".into()));
        }
        Ok(Self { max })
    }

    /// The threshold.
    #[must_use]
    pub const fn max(&self) -> usize {
        self.max
    }

    /// Compare a size against the budget.
    ///
    /// Returns:
    /// - `Ordering::Less`: room to spare
    /// - `Ordering::Equal`: exactly at the budget (still admitted)
    /// - `Ordering::Greater`: over budget, must collapse
    #[must_use]
    pub fn fits(&self, size: usize) -> Ordering {
        size.cmp(&self.max)
    }

    /// Whether `size` is within the budget.
    #[must_use]
    pub fn admits(&self, size: usize) -> bool {
        self.fits(size) != Ordering::Greater
    }

    /// Check if adding `additional` to `current` would exceed the budget.
    ///
    /// Useful for incremental group building.
    #[must_use]
    pub fn would_overflow(&self, current: usize, additional: usize) -> bool {
        current.saturating_add(additional) > self.max
    }
}

impl Default for SizeBudget {
    fn default() -> Self {
        // 4000 words, the budget used for web pages and meeting transcripts
        Self { max: 4000 }
    }
}

impl TryFrom<usize> for SizeBudget {
    type Error = Error;

    fn try_from(max: usize) -> Result<Self> {
        Self::new(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits() {
        let budget = SizeBudget::new(100).unwrap();
        assert_eq!(budget.fits(50), Ordering::Less);
        assert_eq!(budget.fits(100), Ordering::Equal);
        assert_eq!(budget.fits(150), Ordering::Greater);
    }

    #[test]
    fn test_admits_boundary() {
        let budget = SizeBudget::new(100).unwrap();
        assert!(budget.admits(0));
        assert!(budget.admits(100));
        assert!(!budget.admits(101));
    }

    #[test]
    fn test_would_overflow() {
        let budget = SizeBudget::new(100).unwrap();
        assert!(!budget.would_overflow(50, 49));
        assert!(!budget.would_overflow(50, 50));
        assert!(budget.would_overflow(50, 51));
        assert!(budget.would_overflow(usize::MAX, 1));
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(matches!(SizeBudget::new(0), Err(Error::Configuration(_))));
        assert!(SizeBudget::try_from(0).is_err());
    }

    #[test]
    fn test_default() {
        assert_eq!(SizeBudget::default().max(), 4000);
    }
}
