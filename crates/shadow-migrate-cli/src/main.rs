//! shadow-migrate CLI - online schema migration tooling for MySQL.

use clap::{Parser, Subcommand};
use serde::Serialize;
use shadow_migrate::ddl::{destination_ddl, destination_name};
use shadow_migrate::{
    introspect, Config, Connection, Entangler, Intersection, MigrateError, MysqlConnection,
    MysqlConnectionFactory, ReplicaTopology, SchemaConstraintRegistry, Table,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "shadow-migrate")]
#[command(about = "Online schema migration tooling for MySQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a table's schema and the DDL of its shadow table
    Inspect {
        /// Table to inspect
        table: String,
    },

    /// Install the mirroring triggers from origin to destination
    Entangle {
        /// Table receiving live writes
        #[arg(long)]
        origin: String,

        /// Shadow table [default: shmn_<origin>]
        #[arg(long)]
        destination: Option<String>,
    },

    /// Remove the mirroring triggers
    Untangle {
        /// Table receiving live writes
        #[arg(long)]
        origin: String,

        /// Shadow table [default: shmn_<origin>]
        #[arg(long)]
        destination: Option<String>,
    },

    /// Discover replicas and report their lag
    Replicas {
        /// Keep polling until interrupted
        #[arg(long)]
        watch: bool,

        /// Seconds between polls in watch mode
        #[arg(long, default_value = "5")]
        interval: u64,
    },

    /// Test the database connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Inspect { table } => {
            let conn = MysqlConnection::connect(&config.connection).await?;
            let mut registry = SchemaConstraintRegistry::new();
            let table = introspect(&table, &conn, &mut registry).await?;
            let report = InspectReport::new(&table, &registry);

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_inspect(&report);
            }
        }

        Commands::Entangle {
            origin,
            destination,
        } => {
            let mut entangler = build_entangler(&config, &origin, destination).await?;
            entangler.validate().await?;
            if let Err(e) = entangler.before().await {
                if let Err(revert_err) = entangler.revert().await {
                    error!("Failed to revert triggers on {}: {}", origin, revert_err);
                }
                return Err(e);
            }
            print_triggers(&entangler, "Installed", cli.output_json)?;
        }

        Commands::Untangle {
            origin,
            destination,
        } => {
            let mut entangler = build_entangler(&config, &origin, destination).await?;
            entangler.after().await?;
            print_triggers(&entangler, "Removed", cli.output_json)?;
        }

        Commands::Replicas { watch, interval } => {
            let conn = MysqlConnection::connect(&config.connection).await?;
            let factory = MysqlConnectionFactory::new(config.connection.clone());
            let mut topology = ReplicaTopology::discover(&conn, &factory).await?;

            if !watch {
                let report = replica_report(&mut topology).await?;
                print_replicas(&report, cli.output_json)?;
                return Ok(());
            }

            let cancel_token = setup_signal_handler();
            loop {
                let report = replica_report(&mut topology).await?;
                print_replicas(&report, cli.output_json)?;

                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
                }
            }
        }

        Commands::HealthCheck => {
            let result = health_check(&config).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  MySQL {}: {} ({}ms)",
                    config.connection.display_url(),
                    if result.connected { "OK" } else { "FAILED" },
                    result.latency_ms
                );
                if let Some(ref version) = result.server_version {
                    println!("    Version: {}", version);
                }
                if let Some(ref err) = result.error {
                    println!("    Error: {}", err);
                }
            }

            if !result.connected {
                return Err(MigrateError::pool(
                    result.error.unwrap_or_default(),
                    "health check",
                ));
            }
        }
    }

    Ok(())
}

/// Schema summary printed by `inspect`.
#[derive(Serialize)]
struct InspectReport<'a> {
    table: &'a Table,
    satisfies_pk_requirement: bool,
    destination: String,
    destination_ddl: String,
    referenced_by: Vec<String>,
}

impl<'a> InspectReport<'a> {
    fn new(table: &'a Table, registry: &SchemaConstraintRegistry) -> Self {
        Self {
            table,
            satisfies_pk_requirement: table.satisfies_pk_requirement(),
            destination: destination_name(&table.name),
            destination_ddl: destination_ddl(table),
            referenced_by: registry
                .referencing(&table.schema, &table.name)
                .into_iter()
                .map(|c| format!("{}.{} ({})", c.table, c.column, c.name))
                .collect(),
        }
    }
}

fn print_inspect(report: &InspectReport<'_>) {
    let table = report.table;
    println!("Table {}", table.full_name());
    println!("  Primary key: {}", table.pk.columns().join(", "));
    if !report.satisfies_pk_requirement {
        println!("  Warning: chunked copy needs a single integer primary key");
    }

    println!("  Columns:");
    for col in &table.columns {
        println!(
            "    {} {}{}",
            col.name,
            col.data_type,
            if col.is_nullable { "" } else { " NOT NULL" }
        );
    }

    if !table.indices.is_empty() {
        println!("  Indexes:");
        for idx in &table.indices {
            println!("    {} ({})", idx.name, idx.columns.join(", "));
        }
    }

    let foreign_keys: Vec<_> = table.foreign_keys().collect();
    if !foreign_keys.is_empty() {
        println!("  Foreign keys:");
        for fk in foreign_keys {
            println!(
                "    {} {} -> {}.{}",
                fk.name,
                fk.column,
                fk.referenced_table.as_deref().unwrap_or_default(),
                fk.referenced_column.as_deref().unwrap_or_default()
            );
        }
    }

    if !report.referenced_by.is_empty() {
        println!("  Referenced by:");
        for r in &report.referenced_by {
            println!("    {}", r);
        }
    }

    println!("\nDestination {}:\n{}", report.destination, report.destination_ddl);
}

async fn build_entangler(
    config: &Config,
    origin: &str,
    destination: Option<String>,
) -> Result<Entangler, MigrateError> {
    let conn: Arc<dyn Connection> = Arc::new(MysqlConnection::connect(&config.connection).await?);
    let destination = destination.unwrap_or_else(|| destination_name(origin));

    let mut registry = SchemaConstraintRegistry::new();
    let origin = introspect(origin, conn.as_ref(), &mut registry).await?;
    let destination = introspect(&destination, conn.as_ref(), &mut registry).await?;
    let intersection = Intersection::between(&origin, &destination, &HashMap::new());

    Ok(Entangler::new(origin, destination, intersection, conn)
        .with_retry_policy(config.migration.retry_policy()))
}

fn print_triggers(entangler: &Entangler, verb: &str, json: bool) -> Result<(), MigrateError> {
    let names: Vec<String> = shadow_migrate::entangler::TriggerKind::ALL
        .iter()
        .map(|&kind| entangler.trigger_name(kind))
        .collect();

    if json {
        let report = serde_json::json!({
            "origin": entangler.origin().name,
            "destination": entangler.destination().name,
            "state": entangler.state().to_string(),
            "triggers": names,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} triggers on {} -> {}:",
            verb,
            entangler.origin().name,
            entangler.destination().name
        );
        for name in names {
            println!("  {}", name);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ReplicaStatus {
    host: String,
    connected: bool,
    lag_seconds: Option<f64>,
}

async fn replica_report(topology: &mut ReplicaTopology) -> Result<Vec<ReplicaStatus>, MigrateError> {
    let mut report = Vec::with_capacity(topology.len());
    for replica in topology.replicas_mut() {
        let lag_seconds = replica.query_lag().await?;
        report.push(ReplicaStatus {
            host: replica.host().to_string(),
            connected: replica.is_connected(),
            lag_seconds,
        });
    }
    Ok(report)
}

fn print_replicas(report: &[ReplicaStatus], json: bool) -> Result<(), MigrateError> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }

    if report.is_empty() {
        println!("No replicas found");
    }
    for status in report {
        let lag = match (status.connected, status.lag_seconds) {
            (false, _) => "unreachable".to_string(),
            (true, Some(lag)) => format!("{}s", lag),
            (true, None) => "unknown".to_string(),
        };
        println!("  {:<40} {}", status.host, lag);
    }
    Ok(())
}

#[derive(Serialize)]
struct HealthCheckResult {
    connected: bool,
    latency_ms: u64,
    server_version: Option<String>,
    error: Option<String>,
}

async fn health_check(config: &Config) -> HealthCheckResult {
    let start = Instant::now();
    let outcome = match MysqlConnection::connect(&config.connection).await {
        Ok(conn) => conn.server_version().await,
        Err(e) => Err(e),
    };
    let latency_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(version) => HealthCheckResult {
            connected: true,
            latency_ms,
            server_version: Some(version),
            error: None,
        },
        Err(e) => HealthCheckResult {
            connected: false,
            latency_ms,
            server_version: None,
            error: Some(e.to_string()),
        },
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping...", name);
                    token.cancel();
                }
                Err(e) => warn!("Failed to set up {} handler: {}", name, e),
            }
        });
    }

    cancel_token
}

/// Cancel the returned token on Ctrl-C.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("\nReceived Ctrl-C. Stopping...");
                token.cancel();
            }
            Err(e) => warn!("Failed to set up Ctrl-C handler: {}", e),
        }
    });

    cancel_token
}
