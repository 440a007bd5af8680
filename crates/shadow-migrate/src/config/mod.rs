//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use crate::retry::RetryPolicy;
use std::path::Path;
use std::time::Duration;

impl ThrottlerConfig {
    /// Check the throttler settings without a full [`Config`].
    pub fn validate(&self) -> Result<()> {
        validation::validate_throttler(self)
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl MigrationConfig {
    /// Retry policy for trigger installation and removal.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.lock_wait_retries,
            wait: Duration::from_millis(self.retry_wait_ms),
        }
    }
}

impl ConnectionConfig {
    /// Connection URL for logging, without credentials.
    pub fn display_url(&self) -> String {
        format!("mysql://{}:{}/{}", self.host, self.port, self.database)
    }
}
