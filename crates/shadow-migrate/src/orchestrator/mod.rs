//! Migration orchestrator - drives one table through the shadow copy.
//!
//! The orchestrator owns the sequence, not the data movement: chunked copying
//! is delegated to a [`ChunkCopier`] and the final swap is left to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::MigrationConfig;
use crate::core::connection::{Connection, ConnectionFactory};
use crate::core::schema::Table;
use crate::core::sleep::{Sleeper, TokioSleeper};
use crate::ddl::{destination_ddl, destination_name};
use crate::drivers::mysql::introspect;
use crate::entangler::Entangler;
use crate::error::{MigrateError, Result};
use crate::intersection::Intersection;
use crate::registry::SchemaConstraintRegistry;
use crate::retry::RetryPolicy;
use crate::throttler::{self, Throttler};

/// Progress reported by a [`ChunkCopier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// A chunk was copied; more may follow.
    Copied { rows: u64 },
    /// Every row has been copied.
    Done,
}

/// Copies origin rows into the destination one chunk at a time.
#[async_trait]
pub trait ChunkCopier: Send {
    async fn copy_next(
        &mut self,
        origin: &Table,
        destination: &Table,
        intersection: &Intersection,
    ) -> Result<ChunkOutcome>;
}

/// Rewrites the destination DDL before it is executed, e.g. to add a column.
pub type Alteration = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Origin table name.
    pub origin: String,

    /// Destination (shadow) table name.
    pub destination: String,

    /// Chunks copied.
    pub chunks: u64,

    /// Rows reported by the copier.
    pub rows_copied: u64,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Foreign keys in other tables that reference the origin and must be
    /// handled at swap time.
    pub referencing_constraints: Vec<String>,
}

impl MigrationResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Migration orchestrator.
pub struct Orchestrator {
    connection: Arc<dyn Connection>,
    throttler: Box<dyn Throttler>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    renames: HashMap<String, String>,
    alteration: Option<Alteration>,
}

impl Orchestrator {
    pub fn new(connection: Arc<dyn Connection>, throttler: Box<dyn Throttler>) -> Self {
        Self {
            connection,
            throttler,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            renames: HashMap::new(),
            alteration: None,
        }
    }

    /// Create an orchestrator with the retry policy and throttler from `config`.
    ///
    /// # Errors
    ///
    /// `MigrateError::Config` when the throttler settings are invalid.
    pub fn from_config(
        config: &MigrationConfig,
        connection: Arc<dyn Connection>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<Self> {
        let throttler = throttler::from_config(&config.throttler, connection.clone(), factory)?;
        Ok(Self::new(connection, throttler).with_retry_policy(config.retry_policy()))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Origin to destination column renames applied by the alteration.
    pub fn with_renames(mut self, renames: HashMap<String, String>) -> Self {
        self.renames = renames;
        self
    }

    pub fn with_alteration<F>(mut self, alteration: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.alteration = Some(Box::new(alteration));
        self
    }

    /// Rows per chunk the copier should aim for.
    pub fn stride(&self) -> usize {
        self.throttler.stride()
    }

    /// Run the migration of `origin_name` up to, but not including, the swap.
    pub async fn run(
        &mut self,
        origin_name: &str,
        copier: &mut dyn ChunkCopier,
    ) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run {} for {}", run_id, origin_name);

        let mut registry = SchemaConstraintRegistry::new();

        // Phase 1: origin schema
        let origin = introspect(origin_name, self.connection.as_ref(), &mut registry).await?;

        // Phase 2: destination table
        let destination = self.create_destination(&origin, &mut registry).await?;
        let intersection = Intersection::between(&origin, &destination, &self.renames);
        if intersection.is_empty() {
            return Err(MigrateError::Validation(format!(
                "{} and {} share no columns",
                origin.name, destination.name
            )));
        }
        debug!(
            "Intersection: {} -> {}",
            intersection.joined_origin(),
            intersection.joined_destination()
        );

        // Phase 3: entangle
        let mut entangler = Entangler::new(
            origin.clone(),
            destination.clone(),
            intersection.clone(),
            self.connection.clone(),
        )
        .with_retry_policy(self.retry)
        .with_sleeper(self.sleeper.clone());

        entangler.validate().await?;
        if let Err(e) = entangler.before().await {
            error!("Entangling {} failed, reverting triggers: {}", origin.name, e);
            if let Err(revert_err) = entangler.revert().await {
                error!("Failed to revert triggers on {}: {}", origin.name, revert_err);
            }
            return Err(e);
        }

        // Phase 4: copy
        let copied = self
            .copy_all(&origin, &destination, &intersection, copier)
            .await;
        let (chunks, rows_copied) = match copied {
            Ok(counts) => counts,
            Err(e) => {
                error!("Copy of {} failed, reverting triggers: {}", origin.name, e);
                if let Err(revert_err) = entangler.revert().await {
                    error!("Failed to revert triggers on {}: {}", origin.name, revert_err);
                }
                return Err(e);
            }
        };

        // Phase 5: untangle
        entangler.after().await?;

        let referencing_constraints = registry
            .referencing(&origin.schema, &origin.name)
            .into_iter()
            .map(|c| c.name.clone())
            .collect();

        let completed_at = Utc::now();
        let result = MigrationResult {
            run_id,
            origin: origin.name,
            destination: destination.name,
            chunks,
            rows_copied,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            started_at,
            completed_at,
            referencing_constraints,
        };

        info!(
            "Copied {} rows of {} into {} in {} chunks ({:.1}s)",
            result.rows_copied,
            result.origin,
            result.destination,
            result.chunks,
            result.duration_seconds
        );
        Ok(result)
    }

    async fn create_destination(
        &self,
        origin: &Table,
        registry: &mut SchemaConstraintRegistry,
    ) -> Result<Table> {
        let name = destination_name(&origin.name);
        if self.connection.data_source_exists(&name).await? {
            return Err(MigrateError::Validation(format!(
                "{} already exists; drop it or finish the previous run",
                name
            )));
        }

        let mut ddl = destination_ddl(origin);
        if let Some(alteration) = &self.alteration {
            ddl = alteration(&ddl);
        }

        info!("Creating destination table {}", name);
        self.connection.execute(&ddl).await?;

        introspect(&name, self.connection.as_ref(), registry).await
    }

    async fn copy_all(
        &mut self,
        origin: &Table,
        destination: &Table,
        intersection: &Intersection,
        copier: &mut dyn ChunkCopier,
    ) -> Result<(u64, u64)> {
        let mut chunks = 0;
        let mut rows = 0;
        loop {
            match copier.copy_next(origin, destination, intersection).await? {
                ChunkOutcome::Copied { rows: n } => {
                    chunks += 1;
                    rows += n;
                    debug!("Chunk {}: {} rows", chunks, n);
                    self.throttler.execute().await?;
                }
                ChunkOutcome::Done => return Ok((chunks, rows)),
            }
        }
    }
}
