//! Rate-limit-aware, restartable pagination over forge API endpoints.
//!
//! A [`Paginator`] owns the page cursor for one endpoint and turns it into a
//! lazy sequence of pages. Before each request it consults the most recently
//! observed quota; when the quota is exhausted it suspends until the
//! forge-reported reset and resumes from the same cursor, so no page is
//! skipped or fetched twice across a suspension. Transient transport errors
//! retry with bounded exponential backoff; exceeding the bound fails only
//! the current fetch unit.

use std::time::Duration;

use async_trait::async_trait;

use super::error::ExtractError;
use super::rate_limit::RateLimitTracker;
use super::retry::{RetryDecision, RetryPolicy};

/// Fetches one page of a paginated resource.
///
/// Implementations perform a single request with no retry logic of their
/// own; the paginator owns suspension and backoff.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Item type the endpoint yields.
    type Item: Send;

    /// Fetches the given 1-based page.
    async fn fetch_page(&self, page: u32, per_page: u8)
    -> Result<Vec<Self::Item>, ExtractError>;
}

/// Restartable sequence of pages with rate-limit suspension and retry.
pub struct Paginator<F> {
    fetcher: F,
    per_page: u8,
    next_page: u32,
    done: bool,
    policy: RetryPolicy,
    rate_limits: RateLimitTracker,
    suspended_for: Duration,
}

impl<F: PageFetcher> Paginator<F> {
    /// Creates a paginator starting at page 1.
    #[must_use]
    pub fn new(fetcher: F, per_page: u8, policy: RetryPolicy, rate_limits: RateLimitTracker) -> Self {
        Self {
            fetcher,
            per_page,
            next_page: 1,
            done: false,
            policy,
            rate_limits,
            suspended_for: Duration::ZERO,
        }
    }

    /// The page the next call will fetch.
    #[must_use]
    pub const fn cursor(&self) -> u32 {
        self.next_page
    }

    /// Cumulative time spent suspended on rate limits.
    #[must_use]
    pub const fn suspended_for(&self) -> Duration {
        self.suspended_for
    }

    /// Fetches the next page, or `None` once the sequence is exhausted.
    ///
    /// A short page (fewer than `per_page` items) ends the sequence after it
    /// is yielded; an empty page ends it immediately.
    ///
    /// # Errors
    ///
    /// Returns the terminal [`ExtractError`] once the retry budget for this
    /// page is exhausted or a fatal error is observed. The cursor is left on
    /// the failed page, so a later call retries it rather than skipping it.
    pub async fn next_page(&mut self) -> Result<Option<Vec<F::Item>>, ExtractError> {
        if self.done {
            return Ok(None);
        }

        if let Some(wait) = self.rate_limits.required_wait() {
            self.suspend(wait).await;
        }

        let mut attempt: u32 = 0;
        loop {
            match self.fetcher.fetch_page(self.next_page, self.per_page).await {
                Ok(items) => {
                    if items.len() < usize::from(self.per_page) {
                        self.done = true;
                    }
                    if items.is_empty() {
                        return Ok(None);
                    }
                    self.next_page = self.next_page.saturating_add(1);
                    return Ok(Some(items));
                }
                Err(error) => {
                    let rate_limited = matches!(error, ExtractError::RateLimited { .. });
                    match self.policy.decide(&error, attempt) {
                        RetryDecision::RetryAfter(wait) => {
                            if rate_limited {
                                self.suspend(wait).await;
                            } else {
                                tracing::warn!(
                                    page = self.next_page,
                                    attempt,
                                    wait_secs = wait.as_secs(),
                                    "transient fetch error, backing off: {error}"
                                );
                                tokio::time::sleep(wait).await;
                                attempt = attempt.saturating_add(1);
                            }
                        }
                        RetryDecision::Fatal(fatal) => return Err(fatal),
                    }
                }
            }
        }
    }

    async fn suspend(&mut self, wait: Duration) {
        tracing::warn!(
            page = self.next_page,
            wait_secs = wait.as_secs(),
            "rate limit exhausted, suspending until reset"
        );
        tokio::time::sleep(wait).await;
        self.suspended_for = self.suspended_for.saturating_add(wait);
        self.rate_limits.note_wait(wait);
    }
}

/// Drains a paginator into a single vector.
///
/// # Errors
///
/// Propagates the first terminal error from [`Paginator::next_page`].
pub async fn collect_all<F: PageFetcher>(
    mut paginator: Paginator<F>,
) -> Result<Vec<F::Item>, ExtractError> {
    let mut items = Vec::new();
    while let Some(page) = paginator.next_page().await? {
        items.extend(page);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    use async_trait::async_trait;

    use super::{PageFetcher, Paginator, collect_all};
    use crate::github::error::ExtractError;
    use crate::github::rate_limit::{RateLimitInfo, RateLimitTracker};
    use crate::github::retry::RetryPolicy;

    /// Scripted fetcher yielding pre-programmed responses in order.
    struct ScriptedFetcher {
        responses: Mutex<VecDeque<Result<Vec<u64>, ExtractError>>>,
        requested_pages: Mutex<Vec<u32>>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<Result<Vec<u64>, ExtractError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                requested_pages: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for &ScriptedFetcher {
        type Item = u64;

        async fn fetch_page(
            &self,
            page: u32,
            _per_page: u8,
        ) -> Result<Vec<u64>, ExtractError> {
            self.requested_pages
                .lock()
                .expect("pages mutex should be available")
                .push(page);
            self.responses
                .lock()
                .expect("responses mutex should be available")
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn transient() -> ExtractError {
        ExtractError::Transient {
            message: "connection reset".to_owned(),
        }
    }

    #[tokio::test]
    async fn yields_pages_until_a_short_page_ends_the_sequence() {
        let fetcher = ScriptedFetcher::new(vec![Ok(vec![1, 2]), Ok(vec![3])]);
        let paginator = Paginator::new(&fetcher, 2, RetryPolicy::default(), RateLimitTracker::new());

        let items = collect_all(paginator).await.expect("pagination should succeed");
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(
            *fetcher.requested_pages.lock().expect("pages mutex"),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn empty_first_page_yields_no_items() {
        let fetcher = ScriptedFetcher::new(vec![Ok(Vec::new())]);
        let paginator = Paginator::new(&fetcher, 2, RetryPolicy::default(), RateLimitTracker::new());
        let items = collect_all(paginator).await.expect("pagination should succeed");
        assert!(items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_error_suspends_and_resumes_from_the_same_page() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be available")
            .as_secs();
        let fetcher = ScriptedFetcher::new(vec![
            Ok(vec![1, 2]),
            Err(ExtractError::RateLimited {
                rate_limit: Some(RateLimitInfo::new(5000, 0, now + 5)),
                message: "API rate limit exceeded".to_owned(),
            }),
            Ok(vec![3]),
        ]);
        let mut paginator =
            Paginator::new(&fetcher, 2, RetryPolicy::default(), RateLimitTracker::new());

        let first = paginator.next_page().await.expect("first page should succeed");
        assert_eq!(first, Some(vec![1, 2]));
        let second = paginator.next_page().await.expect("second page should succeed");
        assert_eq!(second, Some(vec![3]));
        assert_eq!(paginator.next_page().await.expect("end"), None);

        // Page 2 was requested twice: once rate-limited, once after resume.
        assert_eq!(
            *fetcher.requested_pages.lock().expect("pages mutex"),
            vec![1, 2, 2]
        );
        assert!(paginator.suspended_for().as_secs() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_quota_delays_the_next_request() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be available")
            .as_secs();
        let tracker = RateLimitTracker::new();
        tracker.record(RateLimitInfo::new(5000, 0, now + 10));

        let fetcher = ScriptedFetcher::new(vec![Ok(vec![1])]);
        let mut paginator = Paginator::new(&fetcher, 2, RetryPolicy::default(), tracker);

        let page = paginator.next_page().await.expect("page should succeed");
        assert_eq!(page, Some(vec![1]));
        assert!(paginator.suspended_for().as_secs() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retry_then_succeed() {
        let fetcher = ScriptedFetcher::new(vec![Err(transient()), Err(transient()), Ok(vec![9])]);
        let mut paginator =
            Paginator::new(&fetcher, 2, RetryPolicy::default(), RateLimitTracker::new());

        let page = paginator.next_page().await.expect("page should succeed");
        assert_eq!(page, Some(vec![9]));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_beyond_the_bound_fail_the_fetch_unit() {
        let fetcher =
            ScriptedFetcher::new(vec![Err(transient()), Err(transient()), Err(transient())]);
        let mut paginator =
            Paginator::new(&fetcher, 2, RetryPolicy::default(), RateLimitTracker::new());

        let error = paginator.next_page().await.expect_err("should exhaust retries");
        assert!(matches!(error, ExtractError::RetriesExhausted { .. }));
        // The cursor stays on the failed page.
        assert_eq!(paginator.cursor(), 1);
    }

    #[tokio::test]
    async fn authentication_errors_are_not_retried() {
        let fetcher = ScriptedFetcher::new(vec![Err(ExtractError::Authentication {
            message: "bad credentials".to_owned(),
        })]);
        let mut paginator =
            Paginator::new(&fetcher, 2, RetryPolicy::default(), RateLimitTracker::new());

        let error = paginator.next_page().await.expect_err("should fail fast");
        assert!(matches!(error, ExtractError::Authentication { .. }));
        assert_eq!(
            fetcher.requested_pages.lock().expect("pages mutex").len(),
            1
        );
    }
}
