//! # Client Configuration
//!
//! Resolved, typed configuration for [`StoreClient`](crate::StoreClient).
//! Every field carries the client library default until the builder applies
//! a configured value over it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use keyline_common::{Codec, ConfigError, JsonCodec};

/// Port used when an address omits one.
pub const DEFAULT_PORT: u16 = 6379;

const DEFAULT_THREADS: usize = 16;
const DEFAULT_IO_THREADS: usize = 32;
const DEFAULT_POOL_SIZE: usize = 64;
const DEFAULT_MINIMUM_IDLE: usize = 1;
const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(30);

/// A `host:port` pair parsed from `redis://host:port` or `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        NodeAddress {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for NodeAddress {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::Address {
            address: raw.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw.trim();
        let rest = match trimmed.split_once("://") {
            Some(("redis", rest)) => rest,
            Some(("rediss", _)) => return Err(invalid("TLS connections are not supported")),
            Some((scheme, _)) => return Err(invalid(&format!("unsupported scheme `{scheme}`"))),
            None => trimmed,
        };
        let rest = rest.trim_end_matches('/');
        if rest.contains('@') {
            return Err(invalid("credentials belong in the password field"));
        }

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| invalid("port is not a number"))?;
                (host, port)
            }
            None => (rest, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        Ok(NodeAddress::new(host, port))
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Connection tuning shared by every topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub password: Option<String>,
    /// Idle pooled connections older than this are closed on checkout.
    pub idle_connection_timeout: Duration,
    pub connect_timeout: Duration,
    /// Socket read/write timeout for a single command.
    pub timeout: Duration,
    /// Extra attempts after a transport failure.
    pub retry_attempts: u32,
    pub retry_interval: Duration,
    /// Carried for pub/sub connections; this client does not subscribe.
    pub subscriptions_per_connection: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            password: None,
            idle_connection_timeout: Duration::from_millis(10_000),
            connect_timeout: Duration::from_millis(10_000),
            timeout: Duration::from_millis(3_000),
            retry_attempts: 3,
            retry_interval: Duration::from_millis(1_500),
            subscriptions_per_connection: 5,
        }
    }
}

/// Single-node topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleServer {
    pub address: NodeAddress,
    pub connection_pool_size: usize,
    pub connection_minimum_idle_size: usize,
    pub settings: ConnectionSettings,
}

impl SingleServer {
    /// Targets `address` with library defaults for everything else.
    pub fn new(address: NodeAddress) -> Self {
        SingleServer {
            address,
            connection_pool_size: DEFAULT_POOL_SIZE,
            connection_minimum_idle_size: DEFAULT_MINIMUM_IDLE,
            settings: ConnectionSettings::default(),
        }
    }
}

/// Clustered topology. Node addresses are seeds for slot discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterServers {
    pub node_addresses: Vec<NodeAddress>,
    pub master_connection_pool_size: usize,
    pub slave_connection_pool_size: usize,
    pub master_connection_minimum_idle_size: usize,
    pub settings: ConnectionSettings,
}

impl Default for ClusterServers {
    fn default() -> Self {
        ClusterServers {
            node_addresses: Vec::new(),
            master_connection_pool_size: DEFAULT_POOL_SIZE,
            slave_connection_pool_size: DEFAULT_POOL_SIZE,
            master_connection_minimum_idle_size: DEFAULT_MINIMUM_IDLE,
            settings: ConnectionSettings::default(),
        }
    }
}

/// Deployment shape of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    Single(SingleServer),
    Cluster(ClusterServers),
}

impl Topology {
    pub fn settings(&self) -> &ConnectionSettings {
        match self {
            Topology::Single(single) => &single.settings,
            Topology::Cluster(cluster) => &cluster.settings,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Topology::Single(_) => "single",
            Topology::Cluster(_) => "cluster",
        }
    }
}

/// Full client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound on threads used to fan out multi-node commands.
    pub threads: usize,
    /// Upper bound on threads used to open connections at startup.
    pub io_threads: usize,
    pub codec: Arc<dyn Codec>,
    /// Lease applied when a lock is requested with a zero lease.
    pub lock_lease: Duration,
    /// `None` until a topology is selected.
    pub topology: Option<Topology>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            threads: DEFAULT_THREADS,
            io_threads: DEFAULT_IO_THREADS,
            codec: Arc::new(JsonCodec),
            lock_lease: DEFAULT_LOCK_LEASE,
            topology: None,
        }
    }
}

impl ClientConfig {
    /// Default configuration targeting one node.
    pub fn single(address: NodeAddress) -> Self {
        ClientConfig {
            topology: Some(Topology::Single(SingleServer::new(address))),
            ..ClientConfig::default()
        }
    }
}
