//! Retry policy and a generic retry combinator
//!
//! The combinator knows nothing about HTTP. Each attempt reports how it
//! went (`AttemptOutcome`) and the policy decides how long to wait:
//! - transient failures wait a random delay in `[min_delay, max_delay]`
//! - throttled attempts wait longer, in `[2 × max_delay, 4 × max_delay]`
//! - permanent failures stop immediately
//!
//! Randomized delays keep repeated runs from retrying in lockstep.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Result of a single attempt, as classified by the caller
#[derive(Debug)]
pub enum AttemptOutcome<T, E> {
    Success(T),
    /// Network errors, 5xx, timeouts, undecodable bodies
    Transient(E),
    /// Upstream rate limiting / abuse detection (429, 403)
    Throttled(E),
    /// Retrying will not help
    Permanent(E),
}

#[derive(Debug)]
pub enum RetryError<E> {
    Exhausted { attempts: u32, last_error: E },
    Permanent { attempt: u32, error: E },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Throttle delay is drawn from `[max_delay × low, max_delay × high]`
    pub throttle_multiplier: (u32, u32),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1_000), Duration::from_millis(3_000))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_delay: Duration, max_delay: Duration) -> Self {
        let (min_delay, max_delay) = if min_delay <= max_delay {
            (min_delay, max_delay)
        } else {
            (max_delay, min_delay)
        };

        Self {
            max_attempts: max_attempts.max(1),
            min_delay,
            max_delay,
            throttle_multiplier: (2, 4),
        }
    }

    /// Delay before retrying a transient failure
    pub fn retry_delay(&self) -> Duration {
        random_between(self.min_delay, self.max_delay)
    }

    /// Delay before retrying after a throttle response
    pub fn throttle_delay(&self) -> Duration {
        let (low, high) = self.throttle_delay_range();
        random_between(low, high)
    }

    pub fn throttle_delay_range(&self) -> (Duration, Duration) {
        let (low, high) = self.throttle_multiplier;
        (self.max_delay * low, self.max_delay * high.max(low))
    }
}

fn random_between(low: Duration, high: Duration) -> Duration {
    let low_ms = low.as_millis() as u64;
    let high_ms = high.as_millis() as u64;
    if high_ms <= low_ms {
        return low;
    }
    Duration::from_millis(rand::thread_rng().gen_range(low_ms..=high_ms))
}

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// attempt budget is spent
///
/// `operation` receives the 1-based attempt number. Throttled attempts count
/// against the same budget as transient ones.
pub async fn execute_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AttemptOutcome<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let (error, delay, kind) = match operation(attempt).await {
            AttemptOutcome::Success(value) => return Ok(value),
            AttemptOutcome::Permanent(error) => {
                log::error!("❌ {}: permanent failure on attempt {}: {}", label, attempt, error);
                return Err(RetryError::Permanent { attempt, error });
            }
            AttemptOutcome::Transient(error) => (error, policy.retry_delay(), "failed"),
            AttemptOutcome::Throttled(error) => (error, policy.throttle_delay(), "throttled"),
        };

        if attempt >= max_attempts {
            log::error!(
                "❌ {}: giving up after {} attempts (last error: {})",
                label,
                attempt,
                error
            );
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last_error: error,
            });
        }

        log::warn!(
            "⏳ {}: attempt {}/{} {} ({}), retrying in {}ms",
            label,
            attempt,
            max_attempts,
            kind,
            error,
            delay.as_millis()
        );

        sleep(delay).await;
        attempt += 1;
    }
}
