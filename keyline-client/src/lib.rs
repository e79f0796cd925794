//! # keyline-client
//!
//! Blocking client for Redis-compatible stores speaking RESP2.
//!
//! A [`StoreClient`] is built once from resolved configuration, either a
//! single node or a cluster discovered through `CLUSTER SLOTS`, and shared by
//! every thread of the process. It owns the connection pools, the retry
//! policy and the distributed lock primitive.
//!
//! ```no_run
//! use keyline_client::{ClientConfig, NodeAddress, StoreClient};
//!
//! let client = StoreClient::connect(ClientConfig::single(NodeAddress::new("127.0.0.1", 6379)))?;
//! client.set(b"greeting", b"hello")?;
//! assert_eq!(client.get(b"greeting")?, Some(b"hello".to_vec()));
//! client.shutdown();
//! # Ok::<(), keyline_client::ClientError>(())
//! ```

pub mod builder;
mod client;
mod cluster;
mod config;
mod error;
mod lock;
mod pool;
mod resp;

pub use builder::{build, resolve, BuildError};
pub use client::{KeyTtl, StoreClient};
pub use cluster::{key_slot, SLOT_COUNT};
pub use config::{
    ClientConfig, ClusterServers, ConnectionSettings, NodeAddress, SingleServer, Topology,
    DEFAULT_PORT,
};
pub use error::{ClientError, ClientResult};
