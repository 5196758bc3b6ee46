//! Bounded retry for store transactions that lose a serialization race.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::domain::AppError;

/// Exponent cap for [`calculate_backoff`]
const MAX_BACKOFF_EXPONENT: u32 = 8;

/// Retry budget for conflicting transactions
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry, doubled on each further retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    fn delay_for(&self, retry_count: u32) -> Duration {
        self.base_delay * calculate_backoff(retry_count)
    }
}

/// Exponential backoff multiplier, capped at 2^8
pub fn calculate_backoff(retry_count: u32) -> u32 {
    2_u32.pow(retry_count.min(MAX_BACKOFF_EXPONENT))
}

/// Run `op`, re-running it while it fails with a serialization conflict.
///
/// Any other error returns immediately. Once the budget is spent the last
/// conflict is returned to the caller.
pub async fn retry_on_conflict<T, F, Fut>(
    operation: &str,
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_serialization_conflict() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt - 1);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Serialization conflict, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}
