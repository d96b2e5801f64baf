//! Rate limit state observed from forge API responses.
//!
//! The forge reports a remaining-quota count and a reset timestamp with every
//! response. The paginator consults the most recently observed values before
//! each request and suspends until the reset when the quota is exhausted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Rate limit information from the forge's quota endpoint.
///
/// # Example
///
/// ```
/// use magpie::github::rate_limit::RateLimitInfo;
///
/// let info = RateLimitInfo::new(5000, 4999, 1_700_000_000);
/// assert!(!info.is_exhausted());
/// assert_eq!(info.remaining(), 4999);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Maximum requests allowed in the current window.
    limit: u32,
    /// Remaining requests in the current window.
    remaining: u32,
    /// Unix timestamp when the rate limit resets.
    reset_at: u64,
}

impl RateLimitInfo {
    /// Creates a new rate limit info instance.
    #[must_use]
    pub const fn new(limit: u32, remaining: u32, reset_at: u64) -> Self {
        Self {
            limit,
            remaining,
            reset_at,
        }
    }

    /// Returns the maximum requests allowed in the current window.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Returns the remaining requests in the current window.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Returns the Unix timestamp when the rate limit resets.
    #[must_use]
    pub const fn reset_at(&self) -> u64 {
        self.reset_at
    }

    /// Returns true if the rate limit has been exhausted.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Duration until the rate limit resets.
    ///
    /// Returns zero if the reset time has already passed or the system time
    /// cannot be determined.
    #[must_use]
    pub fn until_reset(&self) -> Duration {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_secs())
            .unwrap_or(0);

        Duration::from_secs(self.reset_at.saturating_sub(now))
    }
}

/// Shared holder for the most recently observed rate limit state.
///
/// The gateway records fresh values whenever it queries the quota endpoint
/// or maps a rate-limit error; the paginator reads them before each request
/// and reports every suspension here, so the run summary can expose the
/// total time spent waiting on rate limits.
#[derive(Debug, Clone, Default)]
pub struct RateLimitTracker {
    observed: Arc<Mutex<Option<RateLimitInfo>>>,
    waited_millis: Arc<AtomicU64>,
}

impl RateLimitTracker {
    /// Creates an empty tracker with no observations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly observed rate limit state.
    pub fn record(&self, info: RateLimitInfo) {
        if let Ok(mut slot) = self.observed.lock() {
            *slot = Some(info);
        }
    }

    /// Returns the most recently observed state, if any.
    #[must_use]
    pub fn latest(&self) -> Option<RateLimitInfo> {
        self.observed.lock().ok().and_then(|slot| *slot)
    }

    /// Returns the wait required before the next request may proceed.
    ///
    /// `None` means the quota has headroom (or was never observed) and the
    /// request can go out immediately.
    #[must_use]
    pub fn required_wait(&self) -> Option<Duration> {
        self.latest().and_then(|info| {
            if info.is_exhausted() {
                Some(info.until_reset())
            } else {
                None
            }
        })
    }

    /// Accounts for time spent suspended on a rate limit.
    pub fn note_wait(&self, wait: Duration) {
        let millis = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        self.waited_millis.fetch_add(millis, Ordering::Relaxed);
    }

    /// Total time spent suspended on rate limits across all paginators
    /// sharing this tracker.
    #[must_use]
    pub fn total_waited(&self) -> Duration {
        Duration::from_millis(self.waited_millis.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use super::{RateLimitInfo, RateLimitTracker};

    fn now_unix() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be available")
            .as_secs()
    }

    #[test]
    fn until_reset_is_zero_when_reset_has_passed() {
        let info = RateLimitInfo::new(5000, 0, 0);
        assert_eq!(info.until_reset(), Duration::ZERO);
    }

    #[test]
    fn until_reset_is_positive_for_future_reset() {
        let info = RateLimitInfo::new(5000, 0, now_unix() + 60);
        let wait = info.until_reset();
        assert!(
            wait <= Duration::from_secs(60) && wait >= Duration::from_secs(1),
            "expected 1..=60s until reset, got {wait:?}"
        );
    }

    #[test]
    fn tracker_requires_no_wait_without_observations() {
        let tracker = RateLimitTracker::new();
        assert_eq!(tracker.required_wait(), None);
    }

    #[test]
    fn tracker_requires_no_wait_with_headroom() {
        let tracker = RateLimitTracker::new();
        tracker.record(RateLimitInfo::new(5000, 100, now_unix() + 600));
        assert_eq!(tracker.required_wait(), None);
    }

    #[test]
    fn tracker_requires_wait_when_exhausted() {
        let tracker = RateLimitTracker::new();
        tracker.record(RateLimitInfo::new(5000, 0, now_unix() + 120));
        let wait = tracker.required_wait().expect("wait should be required");
        assert!(wait > Duration::ZERO);
    }

    #[test]
    fn later_observation_replaces_earlier_one() {
        let tracker = RateLimitTracker::new();
        tracker.record(RateLimitInfo::new(5000, 0, now_unix() + 120));
        tracker.record(RateLimitInfo::new(5000, 4999, now_unix() + 120));
        assert_eq!(tracker.required_wait(), None);
    }
}
