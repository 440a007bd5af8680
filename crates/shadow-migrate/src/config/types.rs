//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Primary database connection.
    pub connection: ConnectionConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// MySQL connection settings for the primary.
///
/// Replica connections reuse these settings with the host replaced.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database (schema) name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never serialized.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// TLS mode: disable, prefer, require, verify-ca, verify-full (default: prefer).
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

impl ConnectionConfig {
    /// Same settings, different host.
    pub fn with_host(&self, host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..self.clone()
        }
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Retries after a lock wait timeout while installing or removing
    /// triggers (default: 10).
    #[serde(default = "default_lock_wait_retries")]
    pub lock_wait_retries: u32,

    /// Wait between lock wait retries in milliseconds (default: 1000).
    #[serde(default = "default_retry_wait_ms")]
    pub retry_wait_ms: u64,

    /// Pacing between copy strides.
    #[serde(default)]
    pub throttler: ThrottlerConfig,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            lock_wait_retries: default_lock_wait_retries(),
            retry_wait_ms: default_retry_wait_ms(),
            throttler: ThrottlerConfig::default(),
        }
    }
}

/// Which throttler paces the copy loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThrottlerKind {
    /// Adapt the delay to observed replica lag.
    #[default]
    ReplicaLag,
    /// Sleep a fixed delay after every stride.
    Time,
}

/// What to do when a replica reports no lag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownLagPolicy {
    /// Leave the replica out of the maximum and log a warning.
    #[default]
    Ignore,
    /// Treat it like a failed replica query.
    Abort,
}

/// Throttler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottlerConfig {
    /// Throttler kind (default: replica_lag).
    #[serde(default)]
    pub kind: ThrottlerKind,

    /// Maximum tolerated replica lag in seconds (default: 10).
    #[serde(default = "default_allowed_lag")]
    pub allowed_lag: f64,

    /// Rows per copy stride. Sizing hint for the copier (default: 40000 for
    /// replica_lag, 2000 for time).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stride: Option<usize>,

    /// Starting delay between strides in seconds (default: 0.1).
    #[serde(default = "default_initial_timeout")]
    pub initial_timeout: f64,

    /// Fixed delay for the time throttler in milliseconds (default: 100).
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Policy for replicas that report no lag (default: ignore).
    #[serde(default)]
    pub unknown_lag: UnknownLagPolicy,
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            kind: ThrottlerKind::default(),
            allowed_lag: default_allowed_lag(),
            stride: None,
            initial_timeout: default_initial_timeout(),
            delay_ms: default_delay_ms(),
            unknown_lag: UnknownLagPolicy::default(),
        }
    }
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_lock_wait_retries() -> u32 {
    10
}

fn default_retry_wait_ms() -> u64 {
    1000
}

fn default_allowed_lag() -> f64 {
    10.0
}

fn default_initial_timeout() -> f64 {
    0.1
}

fn default_delay_ms() -> u64 {
    100
}
