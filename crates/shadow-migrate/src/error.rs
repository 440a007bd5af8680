//! Error types for the migration library.

use thiserror::Error;

/// MySQL server error code for `ER_LOCK_WAIT_TIMEOUT`.
pub const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;

/// Message fragment MySQL uses for lock wait timeouts. Used when the driver
/// did not surface a server error code.
const LOCK_WAIT_TIMEOUT_MESSAGE: &str = "Lock wait timeout exceeded";

/// Process exit codes used by the CLI.
pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_DATABASE_ERROR: u8 = 2;
pub const EXIT_VALIDATION_ERROR: u8 = 3;
pub const EXIT_REPLICA_ERROR: u8 = 4;
pub const EXIT_CANCELLED: u8 = 5;
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Introspection found no catalog rows for the table.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Origin or destination is missing, or otherwise unfit for entanglement.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Statement or query failed on the server.
    #[error("Database error{}: {message}", code.map(|c| format!(" {}", c)).unwrap_or_default())]
    Database { code: Option<u16>, message: String },

    /// Connection establishment error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A connected replica could not report its state. Lag can no longer be
    /// bounded, so this aborts the migration.
    #[error("Unable to query replica {host} to determine replica lag, aborting: {message}")]
    ReplicaQuery { host: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl From<mysql_async::Error> for MigrateError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Server(server) => MigrateError::Database {
                code: Some(server.code),
                message: server.message,
            },
            other => MigrateError::Database {
                code: None,
                message: other.to_string(),
            },
        }
    }
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a ReplicaQuery error for a host
    pub fn replica_query(host: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::ReplicaQuery {
            host: host.into(),
            message: message.to_string(),
        }
    }

    /// Create a Database error without a server code.
    pub fn database(message: impl Into<String>) -> Self {
        MigrateError::Database {
            code: None,
            message: message.into(),
        }
    }

    /// Whether this error is a lock wait timeout that is safe to retry.
    ///
    /// Matches on the server error code when the driver provides one and
    /// falls back to the message text otherwise.
    pub fn is_lock_wait_timeout(&self) -> bool {
        match self {
            MigrateError::Database { code: Some(code), .. } => *code == ER_LOCK_WAIT_TIMEOUT,
            MigrateError::Database { code: None, message } => {
                message.contains(LOCK_WAIT_TIMEOUT_MESSAGE)
            }
            _ => false,
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Database { .. } | MigrateError::Pool { .. } => EXIT_DATABASE_ERROR,
            MigrateError::TableNotFound(_) | MigrateError::Validation(_) => {
                EXIT_VALIDATION_ERROR
            }
            MigrateError::ReplicaQuery { .. } => EXIT_REPLICA_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_wait_timeout_by_code() {
        let err = MigrateError::Database {
            code: Some(1205),
            message: "anything".to_string(),
        };
        assert!(err.is_lock_wait_timeout());

        let err = MigrateError::Database {
            code: Some(1213),
            message: "Deadlock found when trying to get lock".to_string(),
        };
        assert!(!err.is_lock_wait_timeout());
    }

    #[test]
    fn test_lock_wait_timeout_code_wins_over_message() {
        // A known non-timeout code is not reclassified by its text.
        let err = MigrateError::Database {
            code: Some(1064),
            message: "Lock wait timeout exceeded".to_string(),
        };
        assert!(!err.is_lock_wait_timeout());
    }

    #[test]
    fn test_lock_wait_timeout_message_fallback() {
        let err = MigrateError::database(
            "Lock wait timeout exceeded; try restarting transaction",
        );
        assert!(err.is_lock_wait_timeout());

        let err = MigrateError::database("Table 'users' doesn't exist");
        assert!(!err.is_lock_wait_timeout());
    }

    #[test]
    fn test_other_variants_never_retryable() {
        assert!(!MigrateError::Validation("Lock wait timeout exceeded".into()).is_lock_wait_timeout());
        assert!(!MigrateError::pool("Lock wait timeout exceeded", "ctx").is_lock_wait_timeout());
    }

    #[test]
    fn test_database_error_display() {
        let err = MigrateError::Database {
            code: Some(1205),
            message: "Lock wait timeout exceeded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Database error 1205: Lock wait timeout exceeded"
        );
        assert_eq!(
            MigrateError::database("boom").to_string(),
            "Database error: boom"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(MigrateError::TableNotFound("t".into()).exit_code(), EXIT_VALIDATION_ERROR);
        assert_eq!(MigrateError::replica_query("db2", "gone").exit_code(), EXIT_REPLICA_ERROR);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(MigrateError::from(io).exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_format_detailed_includes_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "config.yaml");
        let detailed = MigrateError::from(io).format_detailed();
        assert!(detailed.starts_with("Error: IO error: config.yaml"));
    }
}
