//! Timeout and exponential-backoff retry around any [`SearchProvider`].
//!
//! # Retry Strategy
//!
//! - Every attempt is bounded by `attempt_timeout`
//! - Only transient failures (transport, timeout, 429, 5xx) are retried
//! - Backoff doubles from `base_delay`, capped at `max_delay`
//! - Random jitter (0-250ms) is added to each delay

use super::{SearchError, SearchProvider};
use crate::config::FetchSettings;
use crate::models::SearchResultItem;
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{error, instrument, warn};

const MAX_JITTER_MS: u64 = 250;

/// Wrapper that adds a per-attempt timeout and retries to a provider.
///
/// Callers see one `search` call; failed attempts are logged and retried
/// here. Non-transient errors such as a 401 are returned on the first try.
///
/// The delay between retries follows:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetrySearch<T> {
    /// The provider being wrapped.
    inner: T,
    /// Retries after the first attempt; `0` means a single attempt.
    max_retries: usize,
    /// Upper bound on one attempt, after which it counts as a timeout.
    attempt_timeout: StdDuration,
    /// Delay before the first retry (doubles with each attempt).
    base_delay: StdDuration,
    /// Cap on any single delay, before jitter.
    max_delay: StdDuration,
}

impl<T> RetrySearch<T>
where
    T: SearchProvider,
{
    /// Create a retry wrapper around an existing [`SearchProvider`].
    ///
    /// # Arguments
    ///
    /// * `inner` - The provider to wrap
    /// * `max_retries` - Retries allowed for transient failures
    /// * `attempt_timeout` - Time limit for each attempt
    /// * `base_delay` - Initial delay between retries
    ///
    /// # Returns
    ///
    /// A wrapper with a 5 second delay cap; see [`RetrySearch::with_max_delay`].
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = NaverBlogClient::new(id, secret);
    /// let provider = RetrySearch::new(client, 1, Duration::from_secs(10), Duration::from_millis(500));
    /// ```
    pub fn new(inner: T, max_retries: usize, attempt_timeout: StdDuration, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            attempt_timeout,
            base_delay,
            max_delay: StdDuration::from_secs(5),
        }
    }

    /// Same as [`RetrySearch::new`], with every knob taken from the `fetch`
    /// section of the settings file.
    pub fn from_settings(inner: T, settings: &FetchSettings) -> Self {
        Self::new(
            inner,
            settings.max_retries,
            settings.attempt_timeout(),
            settings.base_delay(),
        )
        .with_max_delay(settings.max_delay())
    }

    pub fn with_max_delay(mut self, max_delay: StdDuration) -> Self {
        self.max_delay = max_delay;
        self
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=MAX_JITTER_MS);
        delay + StdDuration::from_millis(jitter_ms)
    }

    async fn attempt(&self, query: &str, limit: u32) -> Result<Vec<SearchResultItem>, SearchError> {
        match timeout(self.attempt_timeout, self.inner.search(query, limit)).await {
            Ok(res) => res,
            Err(_) => Err(SearchError::Timeout(self.attempt_timeout)),
        }
    }
}

impl<T> fmt::Debug for RetrySearch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrySearch")
            .field("max_retries", &self.max_retries)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> SearchProvider for RetrySearch<T>
where
    T: SearchProvider,
{
    #[instrument(level = "info", skip_all, fields(query = %truncate_for_log(query, 80)))]
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchResultItem>, SearchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.attempt(query, limit).await {
                Ok(items) => return Ok(items),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !e.is_transient() || attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            transient = e.is_transient(),
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "search() giving up"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "search() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
