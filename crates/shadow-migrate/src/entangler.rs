//! Trigger-based mirroring of origin writes onto the destination table.
//!
//! While the copy runs, three `AFTER` triggers on the origin replay every
//! insert, update and delete onto the destination. Inserts and updates become
//! `REPLACE INTO`, so rows the copier has not reached yet are simply created.
//! Deletes use `DELETE IGNORE`, so a row that was never copied is not an error.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::connection::Connection;
use crate::core::identifier::{quote_unchecked, truncate_identifier, MAX_IDENTIFIER_LENGTH};
use crate::core::schema::Table;
use crate::core::sleep::{Sleeper, TokioSleeper};
use crate::error::{MigrateError, Result};
use crate::intersection::Intersection;
use crate::retry::{with_retry, RetryPolicy};

/// Prefix of every trigger name.
pub const TRIGGER_PREFIX: &str = "shmt";

/// Comment attached to every statement this crate sends, so they can be
/// recognized in the processlist and binary logs.
pub const SQL_MARKER: &str = "/* shadow-migrate */";

/// The three mirrored events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Insert,
    Update,
    Delete,
}

impl TriggerKind {
    /// Installation and removal order.
    pub const ALL: [TriggerKind; 3] = [TriggerKind::Delete, TriggerKind::Insert, TriggerKind::Update];

    fn abbrev(self) -> &'static str {
        match self {
            TriggerKind::Insert => "ins",
            TriggerKind::Update => "upd",
            TriggerKind::Delete => "del",
        }
    }

    fn event(self) -> &'static str {
        match self {
            TriggerKind::Insert => "INSERT",
            TriggerKind::Update => "UPDATE",
            TriggerKind::Delete => "DELETE",
        }
    }
}

/// Lifecycle of an [`Entangler`]. Tracked for reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntanglerState {
    Unvalidated,
    Validated,
    Entangled,
    Untangled,
}

impl fmt::Display for EntanglerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntanglerState::Unvalidated => "unvalidated",
            EntanglerState::Validated => "validated",
            EntanglerState::Entangled => "entangled",
            EntanglerState::Untangled => "untangled",
        };
        f.write_str(s)
    }
}

pub struct Entangler {
    origin: Table,
    destination: Table,
    intersection: Intersection,
    connection: Arc<dyn Connection>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    state: EntanglerState,
    installed: Vec<TriggerKind>,
}

impl Entangler {
    pub fn new(
        origin: Table,
        destination: Table,
        intersection: Intersection,
        connection: Arc<dyn Connection>,
    ) -> Self {
        let full = untruncated_trigger_name(TriggerKind::Insert, &origin.name);
        if full.chars().count() > MAX_IDENTIFIER_LENGTH {
            warn!(
                "Trigger names for {} exceed {} characters and are truncated; \
                 tables sharing this prefix would collide",
                origin.name, MAX_IDENTIFIER_LENGTH
            );
        }

        Self {
            origin,
            destination,
            intersection,
            connection,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            state: EntanglerState::Unvalidated,
            installed: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn state(&self) -> EntanglerState {
        self.state
    }

    pub fn origin(&self) -> &Table {
        &self.origin
    }

    pub fn destination(&self) -> &Table {
        &self.destination
    }

    /// Trigger name for `kind`, at most 64 characters.
    pub fn trigger_name(&self, kind: TriggerKind) -> String {
        truncate_identifier(&untruncated_trigger_name(kind, &self.origin.name)).to_string()
    }

    /// Check that both tables exist and the origin has a primary key.
    pub async fn validate(&mut self) -> Result<()> {
        for name in [&self.origin.name, &self.destination.name] {
            if !self.connection.data_source_exists(name).await? {
                return Err(MigrateError::Validation(format!("{} does not exist", name)));
            }
        }

        if !self.origin.has_pk() {
            return Err(MigrateError::Validation(format!(
                "{} has no primary key; deletes cannot be mirrored",
                self.origin.name
            )));
        }

        self.state = EntanglerState::Validated;
        Ok(())
    }

    /// Triggers installed by [`before`](Self::before) and not yet removed.
    pub fn installed(&self) -> &[TriggerKind] {
        &self.installed
    }

    /// Install the mirroring triggers.
    ///
    /// Stops at the first failure. Triggers created before it stay in place
    /// and are listed by [`installed`](Self::installed) for [`revert`](Self::revert).
    pub async fn before(&mut self) -> Result<()> {
        for kind in TriggerKind::ALL {
            let stmt = self.create_trigger(kind);
            self.run(&stmt, "entangle").await?;
            if !self.installed.contains(&kind) {
                self.installed.push(kind);
            }
        }
        self.state = EntanglerState::Entangled;
        info!(
            "Entangled {} -> {}",
            self.origin.name, self.destination.name
        );
        Ok(())
    }

    /// Remove the mirroring triggers.
    pub async fn after(&mut self) -> Result<()> {
        for stmt in self.untangle_statements() {
            self.run(&stmt, "untangle").await?;
        }
        self.installed.clear();
        self.state = EntanglerState::Untangled;
        info!(
            "Untangled {} -> {}",
            self.origin.name, self.destination.name
        );
        Ok(())
    }

    /// Undo [`before`](Self::before), dropping only the triggers it created.
    ///
    /// Every installed trigger is attempted. The first error is returned and
    /// the triggers that could not be dropped remain in [`installed`](Self::installed).
    pub async fn revert(&mut self) -> Result<()> {
        let mut first_err = None;
        for kind in std::mem::take(&mut self.installed) {
            let stmt = self.drop_trigger(kind);
            if let Err(e) = self.run(&stmt, "revert").await {
                warn!("Could not drop {}: {}", self.trigger_name(kind), e);
                self.installed.push(kind);
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => {
                self.state = EntanglerState::Untangled;
                info!("Reverted triggers on {}", self.origin.name);
                Ok(())
            }
        }
    }

    /// `CREATE TRIGGER` statements, in installation order.
    pub fn entangle_statements(&self) -> Vec<String> {
        TriggerKind::ALL
            .iter()
            .map(|&kind| self.create_trigger(kind))
            .collect()
    }

    /// `DROP TRIGGER` statements, in removal order.
    pub fn untangle_statements(&self) -> Vec<String> {
        TriggerKind::ALL
            .iter()
            .map(|&kind| self.drop_trigger(kind))
            .collect()
    }

    fn drop_trigger(&self, kind: TriggerKind) -> String {
        format!("DROP TRIGGER {}", quote(&self.trigger_name(kind)))
    }

    fn create_trigger(&self, kind: TriggerKind) -> String {
        let destination = quote(&self.destination.name);
        let body = match kind {
            TriggerKind::Insert | TriggerKind::Update => format!(
                "REPLACE INTO {} ({}) {}\nVALUES ({})",
                destination,
                self.intersection.joined_destination(),
                SQL_MARKER,
                self.intersection.typed_origin("NEW")
            ),
            TriggerKind::Delete => format!(
                "DELETE IGNORE FROM {} {}\nWHERE {}",
                destination,
                SQL_MARKER,
                self.pk_match()
            ),
        };

        format!(
            "CREATE TRIGGER {}\nAFTER {} ON {} FOR EACH ROW\n{}",
            quote(&self.trigger_name(kind)),
            kind.event(),
            quote(&self.origin.name),
            body
        )
    }

    /// `` `dest`.`pk` = OLD.`pk` `` per key column, joined with `AND`.
    fn pk_match(&self) -> String {
        let destination = quote(&self.destination.name);
        self.origin
            .pk
            .columns()
            .into_iter()
            .map(|pk| {
                format!(
                    "{}.{} = OLD.{}",
                    destination,
                    quote(self.destination_column(pk)),
                    quote(pk)
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Destination name of an origin column, following renames.
    fn destination_column<'a>(&'a self, origin_column: &'a str) -> &'a str {
        self.intersection
            .origin()
            .iter()
            .position(|c| c == origin_column)
            .map(|i| self.intersection.destination()[i].as_str())
            .unwrap_or(origin_column)
    }

    async fn run(&self, stmt: &str, context: &str) -> Result<()> {
        let sql = tagged(stmt);
        debug!("{}: {}", context, sql);
        with_retry(&self.retry, self.sleeper.as_ref(), context, || {
            self.connection.execute(&sql)
        })
        .await
    }
}

fn untruncated_trigger_name(kind: TriggerKind, origin: &str) -> String {
    format!("{}_{}_{}", TRIGGER_PREFIX, kind.abbrev(), origin)
}

fn quote(name: &str) -> String {
    quote_unchecked(name, '`')
}

fn tagged(sql: &str) -> String {
    format!("{} {}", sql, SQL_MARKER)
}
