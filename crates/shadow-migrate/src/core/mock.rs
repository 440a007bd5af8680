//! In-memory connection doubles for unit tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::connection::{Connection, ConnectionFactory, Row};
use crate::error::{MigrateError, Result};

struct Failure {
    pattern: String,
    code: Option<u16>,
    message: String,
    remaining: usize,
}

/// Scripted connection.
///
/// Queries are answered by the first registered response whose pattern is a
/// substring of the SQL. `CREATE TRIGGER` / `DROP TRIGGER` statements are
/// tracked so tests can check which triggers exist, and fail the way MySQL
/// does on duplicates and missing triggers. `CREATE TABLE` registers the
/// table as an existing data source.
pub struct MockConnection {
    host: String,
    database: String,
    tables: Mutex<HashSet<String>>,
    responses: Mutex<Vec<(String, Vec<Row>)>>,
    failures: Mutex<Vec<Failure>>,
    statements: Mutex<Vec<String>>,
    triggers: Mutex<BTreeSet<String>>,
}

impl MockConnection {
    pub fn new(host: &str, database: &str) -> Self {
        Self {
            host: host.to_string(),
            database: database.to_string(),
            tables: Mutex::new(HashSet::new()),
            responses: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            statements: Mutex::new(Vec::new()),
            triggers: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn with_tables(self, tables: &[&str]) -> Self {
        self.tables
            .lock()
            .unwrap()
            .extend(tables.iter().map(|t| t.to_string()));
        self
    }

    /// Answer queries containing `pattern` with `rows`, replacing any earlier
    /// answer for the same pattern.
    pub fn respond(&self, pattern: &str, rows: Vec<Row>) {
        let mut responses = self.responses.lock().unwrap();
        match responses.iter_mut().find(|(p, _)| p == pattern) {
            Some(existing) => existing.1 = rows,
            None => responses.push((pattern.to_string(), rows)),
        }
    }

    /// Fail the next `times` statements containing `pattern`.
    pub fn fail(&self, pattern: &str, code: Option<u16>, message: &str, times: usize) {
        self.failures.lock().unwrap().push(Failure {
            pattern: pattern.to_string(),
            code,
            message: message.to_string(),
            remaining: times,
        });
    }

    /// Every statement and query seen, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    /// Names of currently installed triggers.
    pub fn triggers(&self) -> Vec<String> {
        self.triggers.lock().unwrap().iter().cloned().collect()
    }

    fn record(&self, sql: &str) -> Result<()> {
        self.statements.lock().unwrap().push(sql.to_string());

        let mut failures = self.failures.lock().unwrap();
        if let Some(failure) = failures
            .iter_mut()
            .find(|f| f.remaining > 0 && sql.contains(&f.pattern))
        {
            failure.remaining -= 1;
            return Err(MigrateError::Database {
                code: failure.code,
                message: failure.message.clone(),
            });
        }
        Ok(())
    }

    fn apply_ddl(&self, sql: &str) -> Result<()> {
        let upper = sql.to_uppercase();
        let mut triggers = self.triggers.lock().unwrap();

        if upper.starts_with("CREATE TRIGGER") {
            let name = quoted_name(sql);
            if !triggers.insert(name.clone()) {
                return Err(MigrateError::Database {
                    code: Some(1359),
                    message: "Trigger already exists".to_string(),
                });
            }
        } else if upper.starts_with("CREATE TABLE") {
            self.tables.lock().unwrap().insert(quoted_name(sql));
        } else if upper.starts_with("DROP TRIGGER") {
            let name = quoted_name(sql);
            if !triggers.remove(&name) {
                return Err(MigrateError::Database {
                    code: Some(1360),
                    message: "Trigger does not exist".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// First backtick-quoted name in a statement.
fn quoted_name(sql: &str) -> String {
    sql.split('`').nth(1).unwrap_or_default().to_string()
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&self, sql: &str) -> Result<()> {
        self.record(sql)?;
        self.apply_ddl(sql)
    }

    async fn select_all(&self, sql: &str) -> Result<Vec<Row>> {
        self.record(sql)?;
        let responses = self.responses.lock().unwrap();
        Ok(responses
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn data_source_exists(&self, name: &str) -> Result<bool> {
        Ok(self.tables.lock().unwrap().contains(name))
    }

    async fn current_database(&self) -> Result<String> {
        Ok(self.database.clone())
    }

    fn host(&self) -> &str {
        &self.host
    }
}

/// Factory handing out pre-built mock connections by host.
///
/// Hosts without a registered connection fail to connect.
pub struct MockConnectionFactory {
    primary_host: String,
    hosts: HashMap<String, Arc<MockConnection>>,
    attempts: Mutex<Vec<String>>,
}

impl MockConnectionFactory {
    pub fn new(primary_host: &str) -> Self {
        Self {
            primary_host: primary_host.to_string(),
            hosts: HashMap::new(),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_host(mut self, conn: Arc<MockConnection>) -> Self {
        self.hosts.insert(conn.host().to_string(), conn);
        self
    }

    /// Hosts connected to, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    fn primary_host(&self) -> &str {
        &self.primary_host
    }

    async fn connect(&self, host: &str) -> Result<Box<dyn Connection>> {
        self.attempts.lock().unwrap().push(host.to_string());
        match self.hosts.get(host) {
            Some(conn) => Ok(Box::new(Arc::clone(conn))),
            None => Err(MigrateError::pool(
                format!("Can't connect to MySQL server on '{}'", host),
                "connecting to replica",
            )),
        }
    }
}

/// Row with a single `host` column, as returned by the processlist query.
pub fn host_row(host: &str) -> Row {
    Row::new().with("host", Some(host))
}

/// `SHOW SLAVE STATUS` row reporting `lag` seconds.
pub fn lag_row(lag: Option<&str>) -> Row {
    Row::new()
        .with("Slave_IO_State", Some("Waiting for master to send event"))
        .with("Seconds_Behind_Master", lag)
}
