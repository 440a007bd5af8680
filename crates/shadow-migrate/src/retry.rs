//! Bounded retry for statements that can hit a lock wait timeout.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::core::sleep::Sleeper;
use crate::error::Result;

/// Retries after the first attempt.
pub const LOCK_WAIT_RETRIES: u32 = 10;

/// Wait between attempts.
pub const RETRY_WAIT: Duration = Duration::from_secs(1);

/// How often and how long to wait before retrying a lock wait timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: LOCK_WAIT_RETRIES,
            wait: RETRY_WAIT,
        }
    }
}

/// Run `op`, retrying while it fails with a lock wait timeout.
///
/// At most `policy.max_retries + 1` attempts are made. Any other error, or
/// the last lock wait timeout, is returned unchanged.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    context: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_lock_wait_timeout() && retries < policy.max_retries => {
                retries += 1;
                warn!(
                    "{} - {}: retry {}/{}",
                    context, e, retries, policy.max_retries
                );
                sleeper.sleep(policy.wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}
