//! # Store Properties
//!
//! Configuration surface for the store client, loaded once at process start.
//!
//! Every tuning field is optional: an absent field means "keep the client
//! library default", never zero. Field names follow the camelCase keys of the
//! configuration document.
//!
//! ```text
//! {
//!   "keyline": {
//!     "store": {
//!       "config": {
//!         "threads": 16,
//!         "codec": "json",
//!         "singleServerConfig": { "address": "redis://localhost:6379" }
//!       }
//!     }
//!   }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, ConfigResult};

/// Dotted path of the store block inside the configuration document.
pub const NAMESPACE: &str = "keyline.store";

/// Root of the store configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreProperties {
    #[serde(default)]
    pub config: Config,
}

/// Client-wide settings plus the topology blocks.
///
/// Both topology blocks may be present; the cluster block governs when it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub cluster_servers_config: Option<ClusterServersConfig>,
    pub single_server_config: Option<SingleServerConfig>,
    /// Worker threads for client-internal execution.
    pub threads: Option<u32>,
    /// Threads used for connection I/O.
    pub netty_threads: Option<u32>,
    /// Codec identifier, e.g. `json` or `string`.
    pub codec: Option<String>,
}

/// Clustered deployment. Times are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServersConfig {
    pub node_addresses: Option<Vec<String>>,
    pub password: Option<String>,
    pub slave_connection_pool_size: Option<u32>,
    pub master_connection_pool_size: Option<u32>,
    pub idle_connection_timeout: Option<u64>,
    pub connect_timeout: Option<u64>,
    pub timeout: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_interval: Option<u64>,
    pub subscriptions_per_connection: Option<u32>,
}

/// Single-node deployment. Times are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleServerConfig {
    pub address: Option<String>,
    pub password: Option<String>,
    pub connection_pool_size: Option<u32>,
    pub connection_minimum_idle_size: Option<u32>,
    pub idle_connection_timeout: Option<u64>,
    pub connect_timeout: Option<u64>,
    pub timeout: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_interval: Option<u64>,
    pub subscriptions_per_connection: Option<u32>,
}

impl StoreProperties {
    /// Parses the store block from a full configuration document.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingNamespace` when the document has no
    /// `keyline.store` block, or `ConfigError::Parse` when it is malformed.
    pub fn from_json_str(document: &str) -> ConfigResult<Self> {
        let root: Value = serde_json::from_str(document)?;
        Self::from_document(root)
    }

    /// Reads and parses a configuration document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let document = fs::read_to_string(path)?;
        Self::from_json_str(&document)
    }

    fn from_document(mut root: Value) -> ConfigResult<Self> {
        for segment in NAMESPACE.split('.') {
            root = match root {
                Value::Object(mut map) => map
                    .remove(segment)
                    .ok_or_else(|| ConfigError::MissingNamespace(NAMESPACE.to_string()))?,
                _ => return Err(ConfigError::MissingNamespace(NAMESPACE.to_string())),
            };
        }
        Ok(serde_json::from_value(root)?)
    }
}
