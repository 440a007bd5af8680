//! Adaptive throttler driven by replica lag.
//!
//! The delay between strides doubles while the most lagging replica is behind
//! by more than `allowed_lag` seconds and halves back once it catches up. The
//! delay stays within `[initial, initial * 1024]`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::replica::ReplicaTopology;
use super::Throttler;
use crate::config::{ThrottlerConfig, UnknownLagPolicy};
use crate::core::connection::{Connection, ConnectionFactory};
use crate::core::sleep::{Sleeper, TokioSleeper};
use crate::error::{MigrateError, Result};

pub const INITIAL_TIMEOUT: f64 = 0.1;
pub const DEFAULT_STRIDE: usize = 40_000;
pub const DEFAULT_MAX_ALLOWED_LAG: f64 = 10.0;

/// Ratio between the largest and the initial timeout.
const MAX_TIMEOUT_FACTOR: f64 = 1024.0;

pub struct ReplicaLagThrottler {
    timeout_seconds: f64,
    initial_timeout: f64,
    allowed_lag: f64,
    stride: usize,
    unknown_lag: UnknownLagPolicy,
    connection: Arc<dyn Connection>,
    factory: Arc<dyn ConnectionFactory>,
    topology: Option<ReplicaTopology>,
    sleeper: Arc<dyn Sleeper>,
}

impl ReplicaLagThrottler {
    pub fn new(connection: Arc<dyn Connection>, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            timeout_seconds: INITIAL_TIMEOUT,
            initial_timeout: INITIAL_TIMEOUT,
            allowed_lag: DEFAULT_MAX_ALLOWED_LAG,
            stride: DEFAULT_STRIDE,
            unknown_lag: UnknownLagPolicy::default(),
            connection,
            factory,
            topology: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// # Errors
    ///
    /// `MigrateError::Config` when `config` fails validation.
    pub fn from_config(
        config: &ThrottlerConfig,
        connection: Arc<dyn Connection>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<Self> {
        config.validate()?;
        let mut throttler = Self::new(connection, factory);
        throttler.initial_timeout = config.initial_timeout;
        throttler.timeout_seconds = config.initial_timeout;
        throttler.allowed_lag = config.allowed_lag;
        throttler.stride = config.stride.unwrap_or(DEFAULT_STRIDE);
        throttler.unknown_lag = config.unknown_lag;
        Ok(throttler)
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_allowed_lag(mut self, allowed_lag: f64) -> Self {
        self.allowed_lag = allowed_lag;
        self
    }

    pub fn timeout_seconds(&self) -> f64 {
        self.timeout_seconds
    }

    pub fn max_timeout(&self) -> f64 {
        self.initial_timeout * MAX_TIMEOUT_FACTOR
    }

    pub fn allowed_lag(&self) -> f64 {
        self.allowed_lag
    }

    /// Switch to another primary connection. The cached topology belongs to
    /// the old one and is dropped.
    pub fn set_connection(&mut self, connection: Arc<dyn Connection>) {
        self.connection = connection;
        self.topology = None;
    }

    /// Replicas of the current connection, discovered on first use.
    pub async fn topology(&mut self) -> Result<&mut ReplicaTopology> {
        if self.topology.is_none() {
            let topology =
                ReplicaTopology::discover(self.connection.as_ref(), self.factory.as_ref()).await?;
            self.topology = Some(topology);
        }
        Ok(self.topology.get_or_insert_with(ReplicaTopology::default))
    }

    /// Largest lag among connected replicas, 0 without any.
    pub async fn max_replica_lag(&mut self) -> Result<f64> {
        let policy = self.unknown_lag;
        let topology = self.topology().await?;

        let mut max: f64 = 0.0;
        for replica in topology.replicas_mut() {
            if !replica.is_connected() {
                continue;
            }
            match replica.query_lag().await? {
                Some(lag) => max = max.max(lag),
                None => match policy {
                    UnknownLagPolicy::Ignore => {
                        warn!("Replica {} reports no lag, ignoring it", replica.host());
                    }
                    UnknownLagPolicy::Abort => {
                        return Err(MigrateError::replica_query(
                            replica.host(),
                            "replica reports no lag; replication may be stopped",
                        ));
                    }
                },
            }
        }

        debug!("Max current replica lag: {}", max);
        Ok(max)
    }

    /// Adjust the timeout for an observed lag and return the new value.
    pub fn adjust(&mut self, lag: f64) -> f64 {
        let current = self.timeout_seconds;
        if lag > self.allowed_lag && current < self.max_timeout() {
            self.timeout_seconds = current * 2.0;
            info!(
                "Increasing timeout between strides from {} to {} because {} seconds of \
                 replica lag detected is greater than the maximum of {} seconds allowed.",
                current, self.timeout_seconds, lag, self.allowed_lag
            );
        } else if lag <= self.allowed_lag && current > self.initial_timeout {
            self.timeout_seconds = current / 2.0;
            info!(
                "Decreasing timeout between strides from {} to {} because {} seconds of \
                 replica lag detected is less than or equal to the {} seconds allowed.",
                current, self.timeout_seconds, lag, self.allowed_lag
            );
        }
        self.timeout_seconds
    }
}

#[async_trait]
impl Throttler for ReplicaLagThrottler {
    async fn execute(&mut self) -> Result<()> {
        let lag = self.max_replica_lag().await?;
        let timeout = self.adjust(lag);
        let delay = Duration::try_from_secs_f64(timeout).map_err(|e| {
            MigrateError::Config(format!("invalid throttle timeout {}: {}", timeout, e))
        })?;
        self.sleeper.sleep(delay).await;
        Ok(())
    }

    fn stride(&self) -> usize {
        self.stride
    }
}
