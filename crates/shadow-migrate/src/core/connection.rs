//! Database connection abstraction consumed by the migration core.
//!
//! The core never talks to a driver directly. Introspection, entanglement and
//! throttling all go through [`Connection`], which keeps them testable against
//! an in-memory double and lets the MySQL driver stay in `drivers::mysql`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// One result row: ordered column names with nullable textual values.
///
/// Column lookup is case-insensitive, since MySQL 8 upper-cases
/// `information_schema` column names while 5.7 and `SHOW` statements do not.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    columns: Vec<(String, Option<String>)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column value, builder style.
    pub fn with(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.push(name, value.map(str::to_string));
        self
    }

    /// Append a column value.
    pub fn push(&mut self, name: impl Into<String>, value: Option<String>) {
        self.columns.push((name.into(), value));
    }

    /// Value of a column, `None` when the column is absent or NULL.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(col, _)| col.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_deref())
    }

    /// Whether the row has a column with this name, NULL or not.
    pub fn contains(&self, name: &str) -> bool {
        self.columns
            .iter()
            .any(|(col, _)| col.eq_ignore_ascii_case(name))
    }

    /// Value of the last column, as returned by `SHOW CREATE TABLE`.
    pub fn last(&self) -> Option<&str> {
        self.columns.last().and_then(|(_, value)| value.as_deref())
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Capabilities required from a database connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run a statement that returns no rows.
    ///
    /// Failures must keep enough information (server code or message) for
    /// [`MigrateError::is_lock_wait_timeout`](crate::error::MigrateError::is_lock_wait_timeout).
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Run a query and return every row.
    async fn select_all(&self, sql: &str) -> Result<Vec<Row>>;

    /// Run a query and return the first column of every row.
    async fn select_values(&self, sql: &str) -> Result<Vec<Option<String>>> {
        let rows = self.select_all(sql).await?;
        Ok(rows
            .into_iter()
            .map(|row| row.columns.into_iter().next().and_then(|(_, v)| v))
            .collect())
    }

    /// Whether a table or view with this name exists in the current database.
    async fn data_source_exists(&self, name: &str) -> Result<bool>;

    /// Name of the current database (schema).
    async fn current_database(&self) -> Result<String>;

    /// Host this connection talks to.
    fn host(&self) -> &str;
}

#[async_trait]
impl<T: Connection + ?Sized> Connection for Arc<T> {
    async fn execute(&self, sql: &str) -> Result<()> {
        (**self).execute(sql).await
    }

    async fn select_all(&self, sql: &str) -> Result<Vec<Row>> {
        (**self).select_all(sql).await
    }

    async fn select_values(&self, sql: &str) -> Result<Vec<Option<String>>> {
        (**self).select_values(sql).await
    }

    async fn data_source_exists(&self, name: &str) -> Result<bool> {
        (**self).data_source_exists(name).await
    }

    async fn current_database(&self) -> Result<String> {
        (**self).current_database().await
    }

    fn host(&self) -> &str {
        (**self).host()
    }
}

/// Opens connections to replica hosts discovered at runtime.
///
/// Implementations derive the replica's settings from the primary's with only
/// the host replaced.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Host of the primary the topology is discovered from.
    fn primary_host(&self) -> &str;

    /// Connect to `host` using the primary's credentials.
    async fn connect(&self, host: &str) -> Result<Box<dyn Connection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup_is_case_insensitive() {
        let row = Row::new()
            .with("COLUMN_NAME", Some("id"))
            .with("Column_Default", None);

        assert_eq!(row.get("column_name"), Some("id"));
        assert_eq!(row.get("COLUMN_NAME"), Some("id"));
        assert_eq!(row.get("column_default"), None);
        assert!(row.contains("COLUMN_DEFAULT"));
        assert!(!row.contains("missing"));
    }

    #[test]
    fn test_row_last_returns_final_column() {
        let row = Row::new()
            .with("Table", Some("users"))
            .with("Create Table", Some("CREATE TABLE `users` (...)"));
        assert_eq!(row.last(), Some("CREATE TABLE `users` (...)"));
        assert_eq!(row.len(), 2);
        assert!(Row::new().is_empty());
    }
}
