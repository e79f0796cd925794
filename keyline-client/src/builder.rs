//! # Store Configuration Builder
//!
//! Turns [`StoreProperties`] into a connected [`StoreClient`].
//!
//! Client-wide settings are applied only when present. The topology is then
//! chosen by an ordered list of selectors: each inspects the properties and,
//! if its block is present, applies every present sub-field and claims the
//! configuration. The first selector to claim wins. New deployment modes are
//! added by appending a selector.

use std::time::Duration;

use keyline_common::{
    instantiate, ClusterServersConfig, Config, ConfigError, ConfigResult, SingleServerConfig,
    StoreProperties,
};
use thiserror::Error;
use tracing::info;

use crate::client::StoreClient;
use crate::config::{ClientConfig, ClusterServers, ConnectionSettings, NodeAddress, SingleServer, Topology};
use crate::error::ClientError;

/// Why a client could not be built.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to connect store client: {0}")]
    Connect(#[from] ClientError),
}

/// Applies one topology block if it is present. Returns true when it did.
type Selector = fn(&Config, &mut ClientConfig) -> ConfigResult<bool>;

/// Evaluated in order; the first match wins.
const SELECTORS: &[(&str, Selector)] = &[("cluster", select_cluster), ("single", select_single)];

/// Builds and connects the store client described by `properties`.
///
/// # Errors
/// `BuildError::Config` when no topology block is present, the codec cannot
/// be instantiated, or a selected block is unusable. `BuildError::Connect`
/// when the store cannot be reached.
pub fn build(properties: &StoreProperties) -> Result<StoreClient, BuildError> {
    let config = resolve(properties)?;
    if let Some(topology) = &config.topology {
        info!(topology = topology.name(), threads = config.threads, "building store client");
    }
    Ok(StoreClient::connect(config)?)
}

/// Resolves `properties` into a client configuration without connecting.
pub fn resolve(properties: &StoreProperties) -> ConfigResult<ClientConfig> {
    let props = &properties.config;
    let mut config = ClientConfig::default();

    if let Some(threads) = props.threads {
        config.threads = positive("threads", threads)?;
    }
    if let Some(threads) = props.netty_threads {
        config.io_threads = positive("nettyThreads", threads)?;
    }
    if let Some(id) = &props.codec {
        config.codec = instantiate(id).map_err(|source| ConfigError::Codec {
            id: id.clone(),
            source,
        })?;
    }

    for (_name, select) in SELECTORS {
        if select(props, &mut config)? {
            return Ok(config);
        }
    }
    Err(ConfigError::NoTopology)
}

fn select_cluster(props: &Config, config: &mut ClientConfig) -> ConfigResult<bool> {
    let Some(cluster_props) = &props.cluster_servers_config else {
        return Ok(false);
    };
    let ClusterServersConfig {
        node_addresses,
        password,
        slave_connection_pool_size,
        master_connection_pool_size,
        idle_connection_timeout,
        connect_timeout,
        timeout,
        retry_attempts,
        retry_interval,
        subscriptions_per_connection,
    } = cluster_props;

    let mut cluster = ClusterServers::default();
    if let Some(addresses) = node_addresses {
        cluster.node_addresses = addresses
            .iter()
            .map(|raw| raw.parse::<NodeAddress>())
            .collect::<ConfigResult<_>>()?;
    }
    if cluster.node_addresses.is_empty() {
        return Err(ConfigError::invalid(
            "clusterServersConfig.nodeAddresses",
            "at least one node address is required",
        ));
    }
    if let Some(size) = slave_connection_pool_size {
        cluster.slave_connection_pool_size = positive("slaveConnectionPoolSize", *size)?;
    }
    if let Some(size) = master_connection_pool_size {
        cluster.master_connection_pool_size = positive("masterConnectionPoolSize", *size)?;
    }
    apply_settings(
        &mut cluster.settings,
        Tuning {
            password: password.as_deref(),
            idle_connection_timeout: *idle_connection_timeout,
            connect_timeout: *connect_timeout,
            timeout: *timeout,
            retry_attempts: *retry_attempts,
            retry_interval: *retry_interval,
            subscriptions_per_connection: *subscriptions_per_connection,
        },
    )?;

    config.topology = Some(Topology::Cluster(cluster));
    Ok(true)
}

fn select_single(props: &Config, config: &mut ClientConfig) -> ConfigResult<bool> {
    let Some(single_props) = &props.single_server_config else {
        return Ok(false);
    };
    let SingleServerConfig {
        address,
        password,
        connection_pool_size,
        connection_minimum_idle_size,
        idle_connection_timeout,
        connect_timeout,
        timeout,
        retry_attempts,
        retry_interval,
        subscriptions_per_connection,
    } = single_props;

    let address = address
        .as_deref()
        .ok_or_else(|| ConfigError::invalid("singleServerConfig.address", "address is required"))?
        .parse::<NodeAddress>()?;

    let mut single = SingleServer::new(address);
    if let Some(size) = connection_pool_size {
        single.connection_pool_size = positive("connectionPoolSize", *size)?;
    }
    if let Some(size) = connection_minimum_idle_size {
        single.connection_minimum_idle_size = *size as usize;
    }
    if single.connection_minimum_idle_size > single.connection_pool_size {
        return Err(ConfigError::invalid(
            "connectionMinimumIdleSize",
            "must not exceed connectionPoolSize",
        ));
    }
    apply_settings(
        &mut single.settings,
        Tuning {
            password: password.as_deref(),
            idle_connection_timeout: *idle_connection_timeout,
            connect_timeout: *connect_timeout,
            timeout: *timeout,
            retry_attempts: *retry_attempts,
            retry_interval: *retry_interval,
            subscriptions_per_connection: *subscriptions_per_connection,
        },
    )?;

    config.topology = Some(Topology::Single(single));
    Ok(true)
}

/// Tuning fields common to every topology block.
struct Tuning<'a> {
    password: Option<&'a str>,
    idle_connection_timeout: Option<u64>,
    connect_timeout: Option<u64>,
    timeout: Option<u64>,
    retry_attempts: Option<u32>,
    retry_interval: Option<u64>,
    subscriptions_per_connection: Option<u32>,
}

fn apply_settings(settings: &mut ConnectionSettings, tuning: Tuning<'_>) -> ConfigResult<()> {
    if let Some(password) = tuning.password {
        settings.password = Some(password.to_string());
    }
    if let Some(ms) = tuning.idle_connection_timeout {
        settings.idle_connection_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = tuning.connect_timeout {
        settings.connect_timeout = positive_millis("connectTimeout", ms)?;
    }
    if let Some(ms) = tuning.timeout {
        settings.timeout = positive_millis("timeout", ms)?;
    }
    if let Some(attempts) = tuning.retry_attempts {
        settings.retry_attempts = attempts;
    }
    if let Some(ms) = tuning.retry_interval {
        settings.retry_interval = Duration::from_millis(ms);
    }
    if let Some(count) = tuning.subscriptions_per_connection {
        settings.subscriptions_per_connection = count;
    }
    Ok(())
}

fn positive(field: &'static str, value: u32) -> ConfigResult<usize> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    Ok(value as usize)
}

// Socket timeouts of zero are rejected by the OS.
fn positive_millis(field: &'static str, ms: u64) -> ConfigResult<Duration> {
    if ms == 0 {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    Ok(Duration::from_millis(ms))
}
