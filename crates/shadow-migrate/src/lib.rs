//! # shadow-migrate
//!
//! Online schema migration for MySQL tables.
//!
//! A copy of the table (the *destination*) is created with the new schema and
//! filled in the background, while triggers on the *origin* mirror every
//! concurrent write onto it. This library provides:
//!
//! - **Introspection** of columns, primary key, indexes and foreign keys
//! - **DDL rewriting** of the origin's `CREATE TABLE` for the destination
//! - **Entanglement** via insert/update/delete triggers with lock wait retry
//! - **Throttling** of the copy loop, adaptive to replica lag
//! - **Replica discovery** through the binlog dump threads of each server
//!
//! Bulk copying and the final table swap are left to the caller; see
//! [`ChunkCopier`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shadow_migrate::{ChunkCopier, Config, MysqlConnection, MysqlConnectionFactory, Orchestrator};
//!
//! async fn migrate(copier: &mut dyn ChunkCopier) -> shadow_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let conn = Arc::new(MysqlConnection::connect(&config.connection).await?);
//!     let factory = Arc::new(MysqlConnectionFactory::new(config.connection.clone()));
//!
//!     let mut orchestrator = Orchestrator::from_config(&config.migration, conn, factory)?
//!         .with_alteration(|ddl| ddl.replace("PRIMARY KEY", "`note` text NULL, PRIMARY KEY"));
//!     let result = orchestrator.run("users", copier).await?;
//!     println!("Copied {} rows into {}", result.rows_copied, result.destination);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod ddl;
pub mod drivers;
pub mod entangler;
pub mod error;
pub mod intersection;
pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod throttler;

// Re-exports for convenience
pub use config::{Config, ConnectionConfig, MigrationConfig, ThrottlerConfig, UnknownLagPolicy};
pub use crate::core::{Connection, ConnectionFactory, PrimaryKey, Row, Table};
pub use drivers::mysql::introspect;
pub use drivers::{MysqlConnection, MysqlConnectionFactory};
pub use entangler::{Entangler, EntanglerState};
pub use error::{MigrateError, Result};
pub use intersection::Intersection;
pub use orchestrator::{ChunkCopier, ChunkOutcome, MigrationResult, Orchestrator};
pub use registry::SchemaConstraintRegistry;
pub use retry::RetryPolicy;
pub use throttler::{ReplicaLagThrottler, ReplicaTopology, Throttler, TimeThrottler};
