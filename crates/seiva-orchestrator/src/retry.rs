//! Retry schedule for transient portal failures.
//!
//! Only [`ScrapeError::is_retryable`] failures are ever retried. The delay
//! between attempts grows exponentially from `base_delay`, is capped at
//! `max_delay`, and carries jitter so jobs that failed together do not
//! retry together. A `Retry-After` hint from the portal overrides the
//! exponential schedule (still capped).

use std::time::Duration;

use rand::Rng;

use seiva_core::ScrapeError;

/// Retry behavior knobs.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial one).
    pub max_attempts: u32,
    /// Delay before the first retry, pre-jitter.
    pub base_delay: Duration,
    /// Ceiling for any delay, hinted or computed.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32, error: &ScrapeError) -> Duration {
        if let ScrapeError::Transient {
            retry_after_secs: Some(secs),
            ..
        } = error
        {
            return Duration::from_secs(*secs).min(self.max_delay);
        }
        let exponent = attempt.saturating_sub(1).min(16);
        let uncapped = self.base_delay.saturating_mul(1 << exponent);
        let capped = uncapped.min(self.max_delay);
        // jitter in [0.5, 1.0) keeps the delay under the cap
        capped.mul_f64(rand::thread_rng().gen_range(0.5..1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> ScrapeError {
        ScrapeError::transient("portal timed out")
    }

    #[test]
    fn delays_grow_exponentially_within_jitter_bounds() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
        };
        for attempt in 1..=4 {
            let ceiling = Duration::from_millis(100 * (1 << (attempt - 1)));
            let delay = policy.backoff_delay(attempt, &transient());
            assert!(delay >= ceiling.mul_f64(0.5), "attempt {attempt}: {delay:?}");
            assert!(delay < ceiling, "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn delay_never_exceeds_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 20,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        for attempt in 1..=20 {
            assert!(policy.backoff_delay(attempt, &transient()) <= Duration::from_secs(5));
        }
    }

    #[test]
    fn retry_after_hint_overrides_the_schedule() {
        let policy = RetryPolicy::default();
        let err = ScrapeError::Transient {
            message: "rate limited".into(),
            retry_after_secs: Some(7),
        };
        assert_eq!(policy.backoff_delay(1, &err), Duration::from_secs(7));
    }

    #[test]
    fn retry_after_hint_is_capped() {
        let policy = RetryPolicy::default();
        let err = ScrapeError::Transient {
            message: "rate limited".into(),
            retry_after_secs: Some(3600),
        };
        assert_eq!(policy.backoff_delay(1, &err), policy.max_delay);
    }
}
