use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

/// Fixed-delay, bounded-attempt retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_millis(max_attempts: u32, delay_ms: u64) -> Self {
        Self::new(max_attempts, Duration::from_millis(delay_ms))
    }
}

/// Run `attempt` until it succeeds or the policy's budget is spent. The last
/// error is returned once every attempt has failed.
pub async fn retry_with_policy<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error: Option<PipelineError> = None;

    for attempt_number in 1..=policy.max_attempts {
        match attempt().await {
            Ok(value) => {
                if attempt_number > 1 {
                    info!("{} succeeded on attempt {}", operation, attempt_number);
                }
                return Ok(value);
            }
            Err(e) => {
                if attempt_number < policy.max_attempts {
                    warn!(
                        "{} failed: {}. Retrying in {}ms (Attempt {}/{})",
                        operation,
                        e,
                        policy.delay.as_millis(),
                        attempt_number,
                        policy.max_attempts
                    );
                    tokio::time::sleep(policy.delay).await;
                } else {
                    warn!(
                        "{} failed: {} (Attempt {}/{}, giving up)",
                        operation, e, attempt_number, policy.max_attempts
                    );
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        PipelineError::BrokerUnavailable(format!("{operation} was never attempted"))
    }))
}
