//! Fixed-delay throttler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::Throttler;
use crate::core::sleep::{Sleeper, TokioSleeper};
use crate::error::Result;

pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_STRIDE: usize = 2_000;

/// Sleeps the same delay after every stride.
pub struct TimeThrottler {
    delay: Duration,
    stride: usize,
    sleeper: Arc<dyn Sleeper>,
}

impl TimeThrottler {
    pub fn new(delay: Duration, stride: usize) -> Self {
        Self {
            delay,
            stride,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for TimeThrottler {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY, DEFAULT_STRIDE)
    }
}

#[async_trait]
impl Throttler for TimeThrottler {
    async fn execute(&mut self) -> Result<()> {
        self.sleeper.sleep(self.delay).await;
        Ok(())
    }

    fn stride(&self) -> usize {
        self.stride
    }
}
