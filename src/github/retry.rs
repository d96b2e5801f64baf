//! Retry and backoff policy expressed as an explicit decision type.
//!
//! Instead of nesting error handlers, each failure is classified into a
//! [`RetryDecision`]: wait and try the same request again, or give up. The
//! policy is a pure function of the error and the attempt number, so the
//! orchestrator and paginator can be tested without real network delays.

use std::time::Duration;

use super::error::ExtractError;

/// Default bound on retry attempts for one fetch unit.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Fallback wait when the forge reports a rate limit without a usable
/// reset time.
const RATE_LIMIT_FALLBACK_WAIT: Duration = Duration::from_secs(60);

/// What to do after a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given duration, then retry the same request.
    ///
    /// Rate-limit suspensions use this variant too; they do not consume
    /// retry attempts.
    RetryAfter(Duration),
    /// The error is not recoverable by retrying; fail the fetch unit.
    Fatal(ExtractError),
}

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts for one fetch unit, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Classifies a failure on the given zero-based attempt.
    ///
    /// Transient errors back off exponentially until the attempt bound is
    /// reached. Rate limits always suspend for the forge-reported duration
    /// and never count against the bound. Everything else is fatal.
    #[must_use]
    pub fn decide(&self, error: &ExtractError, attempt: u32) -> RetryDecision {
        match error {
            ExtractError::RateLimited { rate_limit, .. } => {
                let wait = rate_limit
                    .map(|info| info.until_reset())
                    .filter(|wait| *wait > Duration::ZERO)
                    .unwrap_or(RATE_LIMIT_FALLBACK_WAIT);
                // One extra second keeps the retry on the far side of the
                // reset boundary.
                RetryDecision::RetryAfter(wait.saturating_add(Duration::from_secs(1)))
            }
            ExtractError::Transient { .. } => {
                if attempt.saturating_add(1) >= self.max_attempts {
                    RetryDecision::Fatal(ExtractError::RetriesExhausted {
                        attempts: self.max_attempts,
                        message: error.to_string(),
                    })
                } else {
                    RetryDecision::RetryAfter(self.backoff_delay(attempt))
                }
            }
            other => RetryDecision::Fatal(other.clone()),
        }
    }

    /// Exponential delay for the given zero-based attempt.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use super::{RetryDecision, RetryPolicy};
    use crate::github::error::ExtractError;
    use crate::github::rate_limit::RateLimitInfo;

    fn transient() -> ExtractError {
        ExtractError::Transient {
            message: "connection reset".to_owned(),
        }
    }

    #[test]
    fn transient_errors_back_off_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(&transient(), 0),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            policy.decide(&transient(), 1),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
    }

    #[test]
    fn transient_errors_become_fatal_at_the_attempt_bound() {
        let policy = RetryPolicy::default();
        match policy.decide(&transient(), 2) {
            RetryDecision::Fatal(ExtractError::RetriesExhausted { attempts, .. }) => {
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[test]
    fn rate_limits_suspend_until_reset_regardless_of_attempt() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be available")
            .as_secs();
        let error = ExtractError::RateLimited {
            rate_limit: Some(RateLimitInfo::new(5000, 0, now + 30)),
            message: "API rate limit exceeded".to_owned(),
        };

        let policy = RetryPolicy::default();
        match policy.decide(&error, 99) {
            RetryDecision::RetryAfter(wait) => {
                assert!(
                    wait > Duration::from_secs(1) && wait <= Duration::from_secs(32),
                    "unexpected wait {wait:?}"
                );
            }
            RetryDecision::Fatal(fatal) => panic!("rate limit must not be fatal: {fatal}"),
        }
    }

    #[test]
    fn rate_limit_without_reset_uses_fallback_wait() {
        let error = ExtractError::RateLimited {
            rate_limit: None,
            message: "secondary rate limit".to_owned(),
        };
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(&error, 0),
            RetryDecision::RetryAfter(Duration::from_secs(61))
        );
    }

    #[test]
    fn authentication_errors_are_fatal_immediately() {
        let error = ExtractError::Authentication {
            message: "bad credentials".to_owned(),
        };
        let policy = RetryPolicy::default();
        assert!(matches!(
            policy.decide(&error, 0),
            RetryDecision::Fatal(ExtractError::Authentication { .. })
        ));
    }
}
