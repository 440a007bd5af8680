//! Pacing between copy strides.
//!
//! - [`TimeThrottler`]: fixed delay
//! - [`ReplicaLagThrottler`]: delay adapted to the most lagging replica
//! - [`ReplicaTopology`]: replica discovery used by the lag throttler

pub mod replica;
pub mod replica_lag;
pub mod time;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{ThrottlerConfig, ThrottlerKind};
use crate::core::connection::{Connection, ConnectionFactory};
use crate::error::Result;

pub use replica::{Replica, ReplicaTopology};
pub use replica_lag::ReplicaLagThrottler;
pub use time::TimeThrottler;

/// Called by the copy loop after every stride.
#[async_trait]
pub trait Throttler: Send {
    /// Wait before the next stride.
    async fn execute(&mut self) -> Result<()>;

    /// Rows to copy per stride.
    fn stride(&self) -> usize;
}

/// Build the throttler selected by `config`.
///
/// # Errors
///
/// `MigrateError::Config` when `config` fails validation.
pub fn from_config(
    config: &ThrottlerConfig,
    connection: Arc<dyn Connection>,
    factory: Arc<dyn ConnectionFactory>,
) -> Result<Box<dyn Throttler>> {
    config.validate()?;
    Ok(match config.kind {
        ThrottlerKind::ReplicaLag => Box::new(ReplicaLagThrottler::from_config(
            config, connection, factory,
        )?),
        ThrottlerKind::Time => Box::new(TimeThrottler::new(
            Duration::from_millis(config.delay_ms),
            config.stride.unwrap_or(time::DEFAULT_STRIDE),
        )),
    })
}
