//! Replica discovery.
//!
//! A primary lists the replicas streaming from it as `Binlog Dump` threads in
//! its processlist. Discovery walks that graph breadth-first, connecting to
//! each replica to find replicas chained behind it.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, info, warn};

use crate::core::connection::{Connection, ConnectionFactory};
use crate::error::{MigrateError, Result};

/// Lists the hosts of replicas streaming binlogs from the queried server.
pub const SELECT_REPLICA_HOSTS: &str = "SELECT host FROM information_schema.processlist \
     WHERE command IN ('Binlog Dump', 'Binlog Dump GTID')";

/// Replication status of the queried replica.
pub const SELECT_REPLICA_STATUS: &str = "SHOW SLAVE STATUS";

const LOOPBACK_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// Strip ports from processlist hosts and drop loopback entries.
///
/// Accepts `host:port`, `[v6addr]:port` and bare hosts. A bare IPv6 address
/// is left untouched.
pub fn format_hosts<I, S>(hosts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    hosts
        .into_iter()
        .map(|h| strip_port(h.as_ref()).to_string())
        .filter(|h| !h.is_empty() && !LOOPBACK_HOSTS.contains(&h.as_str()))
        .collect()
}

fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.split_once(':') {
        Some((name, port)) if !port.contains(':') => name,
        _ => host,
    }
}

/// A server replicating from the primary, directly or through another replica.
pub struct Replica {
    host: String,
    connection: Option<Box<dyn Connection>>,
    lag: Option<f64>,
}

impl Replica {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether a connection could be opened during discovery.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Lag observed by the last [`query_lag`](Self::query_lag) call.
    pub fn last_lag(&self) -> Option<f64> {
        self.lag
    }

    /// Query the current replication lag in seconds.
    ///
    /// A multi-source replica reports one row per channel; the largest lag
    /// wins. `Ok(None)` when the replica is not connected or no channel
    /// reports a lag, as happens while replication is stopped.
    ///
    /// # Errors
    ///
    /// `MigrateError::ReplicaQuery` when the status query fails.
    pub async fn query_lag(&mut self) -> Result<Option<f64>> {
        let Some(conn) = &self.connection else {
            return Ok(None);
        };

        let rows = conn
            .select_all(SELECT_REPLICA_STATUS)
            .await
            .map_err(|e| MigrateError::replica_query(&self.host, e))?;

        let lag = rows
            .iter()
            .filter_map(|row| {
                row.get("Seconds_Behind_Master")
                    .or_else(|| row.get("Seconds_Behind_Source"))
                    .and_then(|v| v.trim().parse::<f64>().ok())
            })
            .reduce(f64::max);

        debug!("Replica {} lag: {:?}", self.host, lag);
        self.lag = lag;
        Ok(lag)
    }

    async fn replica_hosts(&self) -> Result<Vec<String>> {
        let Some(conn) = &self.connection else {
            return Ok(Vec::new());
        };
        let hosts = conn
            .select_values(SELECT_REPLICA_HOSTS)
            .await
            .map_err(|e| MigrateError::replica_query(&self.host, e))?;
        Ok(format_hosts(hosts.into_iter().flatten()))
    }
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("host", &self.host)
            .field("connected", &self.is_connected())
            .field("lag", &self.lag)
            .finish()
    }
}

/// Replicas reachable from one primary.
#[derive(Debug, Default)]
pub struct ReplicaTopology {
    replicas: Vec<Replica>,
}

impl ReplicaTopology {
    /// Discover every replica reachable from `primary`.
    ///
    /// Hosts that cannot be connected to are kept without a connection and
    /// not explored further.
    ///
    /// # Errors
    ///
    /// Fails if the primary cannot list its replicas, or with
    /// `MigrateError::ReplicaQuery` if a connected replica cannot.
    pub async fn discover(
        primary: &dyn Connection,
        factory: &dyn ConnectionFactory,
    ) -> Result<Self> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(factory.primary_host().to_string());
        visited.insert(primary.host().to_string());

        let primary_hosts = primary.select_values(SELECT_REPLICA_HOSTS).await?;
        let mut queue: VecDeque<String> = VecDeque::new();
        for host in format_hosts(primary_hosts.into_iter().flatten()) {
            if visited.insert(host.clone()) {
                queue.push_back(host);
            }
        }

        let mut replicas = Vec::new();
        while let Some(host) = queue.pop_front() {
            let connection = match factory.connect(&host).await {
                Ok(conn) => Some(conn),
                Err(e) => {
                    warn!("Error connecting to replica {}: {}", host, e);
                    None
                }
            };

            let replica = Replica {
                host,
                connection,
                lag: None,
            };

            for next in replica.replica_hosts().await? {
                if visited.insert(next.clone()) {
                    queue.push_back(next);
                }
            }
            replicas.push(replica);
        }

        let topology = Self { replicas };
        info!("Discovered replicas: {:?}", topology.hosts());
        Ok(topology)
    }

    pub fn hosts(&self) -> Vec<&str> {
        self.replicas.iter().map(Replica::host).collect()
    }

    pub fn replicas(&self) -> &[Replica] {
        &self.replicas
    }

    pub fn replicas_mut(&mut self) -> &mut [Replica] {
        &mut self.replicas
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }
}
