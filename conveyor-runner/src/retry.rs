//! Fixed-delay retry
//!
//! Used by the verify stage: a bounded number of attempts, each preceded by
//! the same delay so a freshly deployed service has time to come up.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use conveyor_core::config::VERIFY_ATTEMPTS;

/// Number of attempts and the delay before each one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Policy of the verify stage
    pub fn verification(delay: Duration) -> Self {
        Self::fixed(VERIFY_ATTEMPTS, delay)
    }
}

/// Result of a retried operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOutcome {
    pub succeeded: bool,
    /// Attempts actually made
    pub attempts: u32,
}

/// Calls `attempt` until it returns `true` or the attempts run out
///
/// The closure receives the 1-based attempt number. The policy delay is
/// slept before every attempt, including the first.
pub async fn retry_fixed<F, Fut>(policy: RetryPolicy, mut attempt: F) -> RetryOutcome
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = bool>,
{
    for n in 1..=policy.attempts {
        tokio::time::sleep(policy.delay).await;

        if attempt(n).await {
            return RetryOutcome {
                succeeded: true,
                attempts: n,
            };
        }
        debug!("Attempt {}/{} failed", n, policy.attempts);
    }

    RetryOutcome {
        succeeded: false,
        attempts: policy.attempts,
    }
}
