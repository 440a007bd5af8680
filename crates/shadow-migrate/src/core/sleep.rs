//! Injectable delays.
//!
//! Retry loops and throttlers sleep through [`Sleeper`] so tests can observe
//! the requested durations without waiting for them.

use std::time::Duration;

use async_trait::async_trait;

/// Something that can suspend the current task.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
