//! MySQL connection backed by mysql_async.
//!
//! One [`MysqlConnection`] wraps a single server session. Triggers and the
//! replica status queries do not benefit from pooling, and a dedicated session
//! keeps `DATABASE()` and session variables stable across calls.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, SslOpts, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::core::connection::{Connection, ConnectionFactory, Row};
use crate::error::{MigrateError, Result};

/// A single MySQL session.
pub struct MysqlConnection {
    conn: Mutex<Conn>,
    host: String,
}

impl MysqlConnection {
    /// Open a session using `config`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let opts = build_opts(config);
        let mut conn = Conn::new(opts)
            .await
            .map_err(|e| MigrateError::pool(e, format!("connecting to MySQL at {}", config.host)))?;

        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| MigrateError::pool(e, "testing MySQL connection"))?;

        info!("Connected to MySQL: {}", config.display_url());

        Ok(Self {
            conn: Mutex::new(conn),
            host: config.host.clone(),
        })
    }

    /// Server version string, e.g. `8.0.36`.
    pub async fn server_version(&self) -> Result<String> {
        let rows = self.select_values("SELECT VERSION()").await?;
        Ok(rows.into_iter().next().flatten().unwrap_or_default())
    }
}

fn build_opts(config: &ConnectionConfig) -> Opts {
    let ssl_opts = match config.ssl_mode.to_lowercase().as_str() {
        "disable" => {
            warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
            None
        }
        "prefer" | "require" => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
        "verify-ca" | "verify_ca" | "verify-full" | "verify_identity" => Some(SslOpts::default()),
        _ => {
            warn!(
                "Unknown ssl_mode '{}', defaulting to Preferred",
                config.ssl_mode
            );
            Some(SslOpts::default().with_danger_accept_invalid_certs(true))
        }
    };

    let mut builder = OptsBuilder::default()
        .ip_or_hostname(&config.host)
        .tcp_port(config.port)
        .db_name(Some(&config.database))
        .user(Some(&config.user))
        .pass(Some(&config.password))
        .init(vec!["SET NAMES utf8mb4"]);

    if let Some(ssl) = ssl_opts {
        builder = builder.ssl_opts(ssl);
    }

    builder.into()
}

/// Render a text-protocol value the way the server would print it.
fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Value::Int(v) => Some(v.to_string()),
        Value::UInt(v) => Some(v.to_string()),
        Value::Float(v) => Some(v.to_string()),
        Value::Double(v) => Some(v.to_string()),
        Value::Date(year, month, day, hour, minute, second, micros) => Some(format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
            year, month, day, hour, minute, second, micros
        )),
        Value::Time(negative, days, hours, minutes, seconds, micros) => Some(format!(
            "{}{:02}:{:02}:{:02}.{:06}",
            if negative { "-" } else { "" },
            u32::from(days) * 24 + u32::from(hours),
            minutes,
            seconds,
            micros
        )),
    }
}

#[async_trait]
impl Connection for MysqlConnection {
    async fn execute(&self, sql: &str) -> Result<()> {
        debug!("{}: {}", self.host, sql);
        let mut conn = self.conn.lock().await;
        conn.query_drop(sql).await?;
        Ok(())
    }

    async fn select_all(&self, sql: &str) -> Result<Vec<Row>> {
        debug!("{}: {}", self.host, sql);
        let mut conn = self.conn.lock().await;
        let rows: Vec<mysql_async::Row> = conn.query(sql).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let columns = row.columns();
                let mut out = Row::new();
                for (column, value) in columns.iter().zip(row.unwrap_raw()) {
                    out.push(
                        column.name_str().into_owned(),
                        value.and_then(value_to_string),
                    );
                }
                out
            })
            .collect())
    }

    async fn data_source_exists(&self, name: &str) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let count: Option<i64> = conn
            .exec_first(
                "SELECT COUNT(*) FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
                (name,),
            )
            .await?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn current_database(&self) -> Result<String> {
        let mut conn = self.conn.lock().await;
        let db: Option<Option<String>> = conn.query_first("SELECT DATABASE()").await?;
        db.flatten()
            .ok_or_else(|| MigrateError::Config("No database selected on connection".into()))
    }

    fn host(&self) -> &str {
        &self.host
    }
}

/// Connects to replicas with the primary's settings and a different host.
#[derive(Debug, Clone)]
pub struct MysqlConnectionFactory {
    config: ConnectionConfig,
}

impl MysqlConnectionFactory {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionFactory for MysqlConnectionFactory {
    fn primary_host(&self) -> &str {
        &self.config.host
    }

    async fn connect(&self, host: &str) -> Result<Box<dyn Connection>> {
        let conn = MysqlConnection::connect(&self.config.with_host(host)).await?;
        Ok(Box::new(conn))
    }
}
