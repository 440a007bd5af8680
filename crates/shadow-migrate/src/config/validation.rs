//! Configuration validation.

use super::{Config, ThrottlerConfig, ThrottlerKind};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Connection validation
    if config.connection.host.is_empty() {
        return Err(MigrateError::Config("connection.host is required".into()));
    }
    if config.connection.database.is_empty() {
        return Err(MigrateError::Config(
            "connection.database is required".into(),
        ));
    }
    if config.connection.user.is_empty() {
        return Err(MigrateError::Config("connection.user is required".into()));
    }
    match config.connection.ssl_mode.to_lowercase().as_str() {
        "disable" | "prefer" | "require" | "verify-ca" | "verify_ca" | "verify-full"
        | "verify_identity" => {}
        other => {
            return Err(MigrateError::Config(format!(
                "connection.ssl_mode '{}' is not supported",
                other
            )))
        }
    }

    validate_throttler(&config.migration.throttler)
}

/// Validate throttler settings on their own.
pub fn validate_throttler(throttler: &ThrottlerConfig) -> Result<()> {
    if !(throttler.initial_timeout > 0.0 && throttler.initial_timeout.is_finite()) {
        return Err(MigrateError::Config(
            "migration.throttler.initial_timeout must be positive".into(),
        ));
    }
    if !(throttler.allowed_lag >= 0.0) {
        return Err(MigrateError::Config(
            "migration.throttler.allowed_lag must not be negative".into(),
        ));
    }
    if let Some(0) = throttler.stride {
        return Err(MigrateError::Config(
            "migration.throttler.stride must be at least 1".into(),
        ));
    }
    if throttler.kind == ThrottlerKind::Time && throttler.delay_ms == 0 {
        return Err(MigrateError::Config(
            "migration.throttler.delay_ms must be at least 1 for the time throttler".into(),
        ));
    }

    Ok(())
}
