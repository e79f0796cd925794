//! # Cluster Routing
//!
//! Purpose: Map keys to the node serving their hash slot, discover the slot
//! layout from seed nodes, and follow `MOVED`/`ASK` redirects.
//!
//! ## Structure Overview
//!
//! ```text
//! ClusterRouter
//!   ├── slots: RwLock<SlotTable>
//!   │     ├── owner: [u16; 16384]   index into shards, NO_OWNER if uncovered
//!   │     └── shards: Vec<Shard { master, replicas }>
//!   ├── masters: RwLock<HashMap<NodeAddress, ConnectionPool>>
//!   └── replicas: RwLock<HashMap<NodeAddress, ConnectionPool>>   READONLY
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::{ClusterServers, NodeAddress};
use crate::error::{ClientError, ClientResult};
use crate::pool::{ConnectionPool, PoolConfig};
use crate::resp::RespValue;

/// Number of hash slots in a cluster.
pub const SLOT_COUNT: usize = 16384;

const NO_OWNER: u16 = u16::MAX;

/// Returns the hash slot of `key`, honoring `{hash tags}`.
pub fn key_slot(key: &[u8]) -> u16 {
    let hashed = hash_tag(key).unwrap_or(key);
    crc16(hashed) % SLOT_COUNT as u16
}

fn hash_tag(key: &[u8]) -> Option<&[u8]> {
    let open = key.iter().position(|&b| b == b'{')?;
    let len = key[open + 1..].iter().position(|&b| b == b'}')?;
    if len == 0 {
        return None;
    }
    Some(&key[open + 1..open + 1 + len])
}

// CRC16-CCITT (XMODEM), the hash used for cluster key slots.
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// A redirect reply from a cluster node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Redirect {
    Moved { slot: u16, addr: NodeAddress },
    Ask { addr: NodeAddress },
}

impl Redirect {
    /// Parses `MOVED <slot> <host:port>` or `ASK <slot> <host:port>`.
    pub fn parse(message: &[u8]) -> Option<Redirect> {
        let text = std::str::from_utf8(message).ok()?;
        let mut parts = text.split_ascii_whitespace();
        let kind = parts.next()?;
        let slot: u16 = parts.next()?.parse().ok()?;
        let (host, port) = parts.next()?.rsplit_once(':')?;
        let addr = NodeAddress::new(host, port.parse().ok()?);
        match kind {
            "MOVED" => Some(Redirect::Moved { slot, addr }),
            "ASK" => Some(Redirect::Ask { addr }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Shard {
    master: NodeAddress,
    replicas: Vec<NodeAddress>,
}

struct SlotTable {
    owner: Vec<u16>,
    shards: Vec<Shard>,
}

impl SlotTable {
    fn empty() -> Self {
        SlotTable {
            owner: vec![NO_OWNER; SLOT_COUNT],
            shards: Vec::new(),
        }
    }

    fn shard(&self, slot: u16) -> Option<&Shard> {
        match self.owner[slot as usize] {
            NO_OWNER => None,
            idx => self.shards.get(idx as usize),
        }
    }

    fn shard_index(&mut self, master: &NodeAddress) -> u16 {
        if let Some(idx) = self.shards.iter().position(|s| &s.master == master) {
            return idx as u16;
        }
        self.shards.push(Shard {
            master: master.clone(),
            replicas: Vec::new(),
        });
        (self.shards.len() - 1) as u16
    }
}

/// Routes commands across cluster nodes.
pub(crate) struct ClusterRouter {
    config: ClusterServers,
    slots: RwLock<SlotTable>,
    masters: RwLock<HashMap<NodeAddress, ConnectionPool>>,
    replicas: RwLock<HashMap<NodeAddress, ConnectionPool>>,
    next_replica: AtomicUsize,
}

impl ClusterRouter {
    /// Discovers the slot layout from the first seed that answers.
    pub fn discover(config: ClusterServers) -> ClientResult<Self> {
        let router = ClusterRouter {
            config,
            slots: RwLock::new(SlotTable::empty()),
            masters: RwLock::new(HashMap::new()),
            replicas: RwLock::new(HashMap::new()),
            next_replica: AtomicUsize::new(0),
        };
        router.refresh()?;
        Ok(router)
    }

    /// Reloads the slot table with `CLUSTER SLOTS`.
    pub fn refresh(&self) -> ClientResult<()> {
        let mut last_err = ClientError::SlotUncovered(0);
        for seed in &self.config.node_addresses {
            let reply = self
                .master_pool(seed)
                .acquire()
                .and_then(|mut conn| conn.exec(&["CLUSTER", "SLOTS"]));
            match reply.and_then(|reply| parse_slots(reply, seed)) {
                Ok(table) => {
                    debug!(seed = %seed, shards = table.shards.len(), "loaded cluster slots");
                    *self.slots.write() = table;
                    return Ok(());
                }
                Err(err) => {
                    warn!(seed = %seed, error = %err, "cluster slot discovery failed");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    /// Pool of the node that should serve `slot`.
    pub fn route(&self, slot: u16, read: bool) -> ClientResult<ConnectionPool> {
        let slots = self.slots.read();
        let shard = slots.shard(slot).ok_or(ClientError::SlotUncovered(slot))?;
        if read && !shard.replicas.is_empty() {
            let pick = self.next_replica.fetch_add(1, Ordering::Relaxed) % shard.replicas.len();
            let addr = shard.replicas[pick].clone();
            drop(slots);
            return Ok(self.replica_pool(&addr));
        }
        let addr = shard.master.clone();
        drop(slots);
        Ok(self.master_pool(&addr))
    }

    /// Records that `slot` now lives on `addr`.
    pub fn moved(&self, slot: u16, addr: &NodeAddress) {
        let mut slots = self.slots.write();
        let idx = slots.shard_index(addr);
        slots.owner[slot as usize] = idx;
        warn!(slot, node = %addr, "slot moved");
    }

    /// Pool for an arbitrary master, created on first use.
    pub fn master_pool(&self, addr: &NodeAddress) -> ConnectionPool {
        self.pool_in(&self.masters, addr, false)
    }

    /// Every known master pool.
    pub fn all_masters(&self) -> Vec<ConnectionPool> {
        let addrs: Vec<NodeAddress> = {
            let slots = self.slots.read();
            slots.shards.iter().map(|s| s.master.clone()).collect()
        };
        addrs.iter().map(|addr| self.master_pool(addr)).collect()
    }

    /// Closes every pool.
    pub fn close(&self) {
        for pool in self.masters.read().values() {
            pool.close();
        }
        for pool in self.replicas.read().values() {
            pool.close();
        }
    }

    fn replica_pool(&self, addr: &NodeAddress) -> ConnectionPool {
        self.pool_in(&self.replicas, addr, true)
    }

    fn pool_in(
        &self,
        pools: &RwLock<HashMap<NodeAddress, ConnectionPool>>,
        addr: &NodeAddress,
        readonly: bool,
    ) -> ConnectionPool {
        if let Some(pool) = pools.read().get(addr) {
            return pool.clone();
        }
        let (max_total, min_idle) = if readonly {
            (self.config.slave_connection_pool_size, 0)
        } else {
            (
                self.config.master_connection_pool_size,
                self.config.master_connection_minimum_idle_size,
            )
        };
        pools
            .write()
            .entry(addr.clone())
            .or_insert_with(|| {
                ConnectionPool::new(PoolConfig {
                    addr: addr.clone(),
                    max_total,
                    min_idle,
                    readonly,
                    settings: self.config.settings.clone(),
                })
            })
            .clone()
    }
}

// Reply shape: [[start, end, [host, port, id?], [replica host, port, id?]...], ...]
fn parse_slots(reply: RespValue, seed: &NodeAddress) -> ClientResult<SlotTable> {
    let ranges = match reply {
        RespValue::Array(ranges) => ranges,
        RespValue::Error(message) => return Err(ClientError::server(&message)),
        _ => return Err(ClientError::UnexpectedResponse),
    };

    let mut table = SlotTable::empty();
    for range in ranges {
        let RespValue::Array(fields) = range else {
            return Err(ClientError::UnexpectedResponse);
        };
        let mut fields = fields.into_iter();
        let (Some(RespValue::Integer(start)), Some(RespValue::Integer(end))) =
            (fields.next(), fields.next())
        else {
            return Err(ClientError::UnexpectedResponse);
        };
        if start < 0 || end < start || end as usize >= SLOT_COUNT {
            return Err(ClientError::UnexpectedResponse);
        }

        let master = fields
            .next()
            .and_then(|node| parse_node(node, seed))
            .ok_or(ClientError::UnexpectedResponse)?;
        let replicas: Vec<NodeAddress> = fields.filter_map(|node| parse_node(node, seed)).collect();

        let idx = table.shard_index(&master);
        let shard = &mut table.shards[idx as usize];
        for replica in replicas {
            if !shard.replicas.contains(&replica) {
                shard.replicas.push(replica);
            }
        }
        for slot in start as usize..=end as usize {
            table.owner[slot] = idx;
        }
    }

    if table.owner.iter().all(|&owner| owner == NO_OWNER) {
        return Err(ClientError::SlotUncovered(0));
    }
    Ok(table)
}

fn parse_node(node: RespValue, seed: &NodeAddress) -> Option<NodeAddress> {
    let RespValue::Array(parts) = node else {
        return None;
    };
    let mut parts = parts.into_iter();
    let host = match parts.next()? {
        RespValue::Bulk(Some(host)) => String::from_utf8(host).ok()?,
        _ => return None,
    };
    let port = match parts.next()? {
        RespValue::Integer(port) => u16::try_from(port).ok()?,
        _ => return None,
    };
    // An empty host means "the node you asked".
    let host = if host.is_empty() { seed.host.clone() } else { host };
    Some(NodeAddress::new(host, port))
}

/// Runs `task` over `items` on at most `max_threads` scoped threads.
pub(crate) fn fan_out<T, R, F>(items: Vec<T>, max_threads: usize, task: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    if items.len() <= 1 || max_threads <= 1 {
        return items.into_iter().map(&task).collect();
    }

    let per_thread = items.len().div_ceil(max_threads);
    let mut batches: Vec<Vec<T>> = Vec::new();
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        batches.push(items.by_ref().take(per_thread).collect());
    }

    let task = &task;
    std::thread::scope(|scope| {
        let handles: Vec<_> = batches
            .into_iter()
            .map(|batch| scope.spawn(move || batch.into_iter().map(task).collect::<Vec<R>>()))
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(results) => results,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}
