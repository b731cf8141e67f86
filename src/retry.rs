//! Exponential backoff around single generation calls.
//!
//! Retries are local to one call: a chunk summary that keeps failing is
//! retried on its own, and nothing upstream is re-run.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::generate::{GenerationError, Generator, PromptKind, Variables};
use crate::{Error, Result};

/// How often and how patiently to retry a failing call.
///
/// `max_retries` counts attempts, the first one included: with
/// `max_retries = 5` a call that is always rate limited is tried five times
/// and waits four times in between. The wait before attempt `n + 1` is
/// `min(initial_backoff * multiplier^(n - 1), max_backoff)`.
///
/// ```rust
/// use std::time::Duration;
/// use precis::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.delay(1), Duration::from_secs(1));
/// assert_eq!(policy.delay(2), Duration::from_secs(2));
/// assert_eq!(policy.delay(3), Duration::from_secs(4));
/// assert_eq!(policy.delay(5), Duration::from_secs(10)); // capped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first.
    pub max_retries: u32,
    /// Wait after the first failed attempt.
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
    /// Growth factor between successive waits.
    pub multiplier: f64,
    /// Upper bound for any single wait.
    #[serde(with = "millis")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once and never waits.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    /// Wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let nanos = self.initial_backoff.as_nanos() as f64 * self.multiplier.powi(exponent);
        let capped = nanos.min(self.max_backoff.as_nanos() as f64);
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_nanos(capped.round() as u64)
        } else {
            self.max_backoff
        }
    }

    /// The full wait schedule for a call that fails every time.
    #[must_use]
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_retries).map(|attempt| self.delay(attempt)).collect()
    }

    /// Check the policy can make at least one attempt and its waits are sane.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for zero attempts, a multiplier below
    /// 1, or `max_backoff < initial_backoff`.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::Configuration("max_retries must be >= 1".into()));
        }
        if !(self.multiplier.is_finite() && self.multiplier >= 1.0) {
            return Err(Error::Configuration(format!(
                "backoff multiplier must be >= 1, got {}",
                self.multiplier
            )));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(Error::Configuration(
                "max_backoff must be >= initial_backoff".into(),
            ));
        }
        Ok(())
    }

    /// Run `f` until it succeeds, fails fatally, or attempts run out.
    ///
    /// Waits use `tokio::time::sleep`, so concurrent calls keep running
    /// while one of them backs off.
    ///
    /// # Errors
    ///
    /// - [`Error::GenerationFatal`] on the first non-retryable failure
    /// - [`Error::GenerationExhausted`] when every attempt failed retryably
    pub async fn run<F, Fut, T>(&self, what: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, GenerationError>>,
    {
        let attempts = self.max_retries.max(1);
        let mut attempt = 1;

        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => {
                    tracing::error!(call = what, %err, "generation failed permanently");
                    return Err(Error::GenerationFatal(err));
                }
                Err(err) if attempt >= attempts => {
                    tracing::error!(call = what, attempts, %err, "retries exhausted");
                    return Err(Error::GenerationExhausted { attempts, last: err });
                }
                Err(err) => {
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        call = what,
                        %err,
                        "retrying in {:.1}s ({}/{})",
                        delay.as_secs_f64(),
                        attempt,
                        attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Retry one generator call under this policy.
    ///
    /// # Errors
    ///
    /// See [`RetryPolicy::run`].
    pub async fn generate<G: Generator>(
        &self,
        generator: &G,
        kind: PromptKind,
        variables: &Variables,
    ) -> Result<String> {
        self.run(kind.as_str(), || generator.generate(kind, variables))
            .await
    }
}

/// Serialize durations as integer milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
