//! # Store Client
//!
//! Purpose: Expose a compact, blocking API for Redis-compatible commands over
//! RESP2, hiding topology, pooling and retries behind one handle.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `StoreClient` hides routing, pooling and protocol.
//! 2. **Shared Handle**: Clones share one set of pools; the handle is built
//!    once at startup and released once at shutdown.
//! 3. **Borrow-Friendly API**: Keys and values are `&[u8]`.
//! 4. **Transport Retries Only**: I/O failures are retried per the configured
//!    policy; server error replies are returned as-is.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use keyline_common::Codec;
use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cluster::{fan_out, key_slot, ClusterRouter, Redirect};
use crate::config::{ClientConfig, ConnectionSettings, Topology};
use crate::error::{ClientError, ClientResult};
use crate::pool::{ConnectionPool, PoolConfig};
use crate::resp::RespValue;

const MAX_REDIRECTS: usize = 5;

/// TTL state of a key, mirroring `PTTL` semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key is missing or already expired.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the provided duration.
    ExpiresIn(Duration),
}

impl KeyTtl {
    /// Milliseconds remaining, with `-1` for no expiry and `-2` for missing.
    pub fn as_millis(&self) -> i64 {
        match self {
            KeyTtl::Missing => -2,
            KeyTtl::NoExpiry => -1,
            KeyTtl::ExpiresIn(ttl) => ttl.as_millis() as i64,
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) enum Route<'a> {
    /// Any node will do.
    Any,
    /// Read of a key; may be served by a replica.
    Read(&'a [u8]),
    /// Write to a key; always the slot master.
    Write(&'a [u8]),
}

enum Router {
    Single(ConnectionPool),
    Cluster(ClusterRouter),
}

impl Router {
    fn close(&self) {
        match self {
            Router::Single(pool) => pool.close(),
            Router::Cluster(cluster) => cluster.close(),
        }
    }
}

/// One-shot shutdown flag that sleeping threads can wait on.
pub(crate) struct Shutdown {
    closed: Mutex<bool>,
    wake: Condvar,
}

impl Shutdown {
    fn new() -> Self {
        Shutdown {
            closed: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    /// Returns true only for the call that flipped the flag.
    fn trigger(&self) -> bool {
        let mut closed = self.closed.lock();
        if *closed {
            return false;
        }
        *closed = true;
        self.wake.notify_all();
        true
    }

    fn is_triggered(&self) -> bool {
        *self.closed.lock()
    }

    /// Sleeps for `timeout` unless shutdown happens first. Returns true on shutdown.
    /// A timeout too large to add to the current instant waits for shutdown alone.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut closed = self.closed.lock();
        while !*closed {
            match deadline {
                Some(deadline) => {
                    if self.wake.wait_until(&mut closed, deadline).timed_out() {
                        break;
                    }
                }
                None => self.wake.wait(&mut closed),
            }
        }
        *closed
    }
}

struct ClientInner {
    id: Uuid,
    config: ClientConfig,
    settings: ConnectionSettings,
    router: Router,
    shutdown: Shutdown,
}

impl ClientInner {
    fn close(&self) -> bool {
        if !self.shutdown.trigger() {
            return false;
        }
        self.router.close();
        true
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle to a live set of store connections.
///
/// Clone-able, `Send + Sync`. All clones share the same pools.
#[derive(Clone)]
pub struct StoreClient {
    inner: Arc<ClientInner>,
}

impl StoreClient {
    /// Connects using `config`.
    ///
    /// Opens the minimum idle connections of every pool (authenticating when
    /// a password is set) and, for clusters, discovers the slot layout.
    pub fn connect(config: ClientConfig) -> ClientResult<Self> {
        let topology = config.topology.clone().ok_or(ClientError::NotConfigured)?;
        let settings = topology.settings().clone();
        let kind = topology.name();

        let router = match topology {
            Topology::Single(single) => {
                let pool = ConnectionPool::new(PoolConfig {
                    addr: single.address,
                    max_total: single.connection_pool_size,
                    min_idle: single.connection_minimum_idle_size,
                    readonly: false,
                    settings: single.settings,
                });
                pool.prefill()?;
                Router::Single(pool)
            }
            Topology::Cluster(cluster) => {
                let router = ClusterRouter::discover(cluster)?;
                let masters = router.all_masters();
                for result in fan_out(masters, config.io_threads, |pool| pool.prefill()) {
                    result?;
                }
                Router::Cluster(router)
            }
        };

        let id = Uuid::new_v4();
        info!(client = %id, topology = kind, codec = config.codec.name(), "store client connected");
        Ok(StoreClient {
            inner: Arc::new(ClientInner {
                id,
                config,
                settings,
                router,
                shutdown: Shutdown::new(),
            }),
        })
    }

    /// Unique id of this client instance.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Codec used for stored values.
    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.inner.config.codec
    }

    /// Closes all pools and wakes lock waiters. Only the first call has effect.
    pub fn shutdown(&self) {
        if self.inner.close() {
            info!(client = %self.inner.id, "store client shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_triggered()
    }

    pub(crate) fn shutdown_signal(&self) -> &Shutdown {
        &self.inner.shutdown
    }

    /// Pings a node.
    pub fn ping(&self) -> ClientResult<()> {
        expect_ok(self.exec(Route::Any, &[b"PING"])?)
    }

    /// Fetches a value. Returns `Ok(None)` when the key is missing.
    pub fn get(&self, key: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        expect_bulk(self.exec(Route::Read(key), &[b"GET", key])?)
    }

    /// Stores a value without expiration.
    pub fn set(&self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        expect_ok(self.exec(Route::Write(key), &[b"SET", key, value])?)
    }

    /// Stores a value that expires after `ttl`.
    pub fn set_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> ClientResult<()> {
        let millis = millis_arg(ttl);
        expect_ok(self.exec(
            Route::Write(key),
            &[b"SET", key, value, b"PX", millis.as_bytes()],
        )?)
    }

    /// Deletes one key. Returns true when it existed.
    pub fn delete(&self, key: &[u8]) -> ClientResult<bool> {
        Ok(expect_int(self.exec(Route::Write(key), &[b"DEL", key])?)? > 0)
    }

    /// Deletes several keys and returns how many existed.
    ///
    /// In a cluster the keys are grouped per slot and the groups are deleted
    /// in parallel on up to `threads` threads.
    pub fn delete_many(&self, keys: &[&[u8]]) -> ClientResult<u64> {
        let Some(first) = keys.first() else {
            return Ok(0);
        };
        if let Router::Single(_) = self.inner.router {
            return self.delete_group(first, keys);
        }

        let mut groups: HashMap<u16, Vec<&[u8]>> = HashMap::new();
        for key in keys {
            groups.entry(key_slot(key)).or_default().push(*key);
        }
        let groups: Vec<Vec<&[u8]>> = groups.into_values().collect();
        let results = fan_out(groups, self.inner.config.threads, |group| {
            self.delete_group(group[0], &group)
        });

        let mut removed = 0;
        for result in results {
            removed += result?;
        }
        Ok(removed)
    }

    fn delete_group(&self, route_key: &[u8], keys: &[&[u8]]) -> ClientResult<u64> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(keys.len() + 1);
        args.push(b"DEL");
        args.extend_from_slice(keys);
        Ok(expect_int(self.exec(Route::Write(route_key), &args)?)?.max(0) as u64)
    }

    /// Returns true when the key exists.
    pub fn exists(&self, key: &[u8]) -> ClientResult<bool> {
        Ok(expect_int(self.exec(Route::Read(key), &[b"EXISTS", key])?)? > 0)
    }

    /// Sets a time-to-live. Returns true when the key exists and the TTL was set.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> ClientResult<bool> {
        let millis = millis_arg(ttl);
        Ok(expect_int(self.exec(Route::Write(key), &[b"PEXPIRE", key, millis.as_bytes()])?)? == 1)
    }

    /// Returns the TTL status of a key.
    pub fn ttl(&self, key: &[u8]) -> ClientResult<KeyTtl> {
        match expect_int(self.exec(Route::Read(key), &[b"PTTL", key])?)? {
            -2 => Ok(KeyTtl::Missing),
            -1 => Ok(KeyTtl::NoExpiry),
            millis if millis >= 0 => Ok(KeyTtl::ExpiresIn(Duration::from_millis(millis as u64))),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Fetches one hash field.
    pub fn hget(&self, key: &[u8], field: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        expect_bulk(self.exec(Route::Read(key), &[b"HGET", key, field])?)
    }

    /// Fetches every field of a hash as `(field, value)` pairs.
    pub fn hgetall(&self, key: &[u8]) -> ClientResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let flat = expect_bulk_list(self.exec(Route::Read(key), &[b"HGETALL", key])?)?;
        if flat.len() % 2 != 0 {
            return Err(ClientError::UnexpectedResponse);
        }
        let mut pairs = Vec::with_capacity(flat.len() / 2);
        let mut items = flat.into_iter();
        while let (Some(field), Some(value)) = (items.next(), items.next()) {
            pairs.push((field, value));
        }
        Ok(pairs)
    }

    /// Writes hash fields. Returns the number of fields that were new.
    pub fn hset(&self, key: &[u8], fields: &[(&[u8], &[u8])]) -> ClientResult<u64> {
        if fields.is_empty() {
            return Ok(0);
        }
        let mut args: Vec<&[u8]> = Vec::with_capacity(2 + fields.len() * 2);
        args.push(b"HSET");
        args.push(key);
        for (field, value) in fields {
            args.push(field);
            args.push(value);
        }
        Ok(expect_int(self.exec(Route::Write(key), &args)?)?.max(0) as u64)
    }

    /// Removes one hash field. Returns true when it existed.
    pub fn hdel(&self, key: &[u8], field: &[u8]) -> ClientResult<bool> {
        Ok(expect_int(self.exec(Route::Write(key), &[b"HDEL", key, field])?)? > 0)
    }

    /// Fetches every member of a set.
    pub fn smembers(&self, key: &[u8]) -> ClientResult<Vec<Vec<u8>>> {
        expect_bulk_list(self.exec(Route::Read(key), &[b"SMEMBERS", key])?)
    }

    /// Returns true when `member` belongs to the set.
    pub fn sismember(&self, key: &[u8], member: &[u8]) -> ClientResult<bool> {
        Ok(expect_int(self.exec(Route::Read(key), &[b"SISMEMBER", key, member])?)? == 1)
    }

    /// Adds members to a set. Returns how many were not already present.
    pub fn sadd(&self, key: &[u8], members: &[&[u8]]) -> ClientResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut args: Vec<&[u8]> = Vec::with_capacity(members.len() + 2);
        args.push(b"SADD");
        args.push(key);
        args.extend_from_slice(members);
        Ok(expect_int(self.exec(Route::Write(key), &args)?)?.max(0) as u64)
    }

    /// Returns list elements from `start` to `stop`, both inclusive.
    /// Negative indexes count from the tail.
    pub fn lrange(&self, key: &[u8], start: i64, stop: i64) -> ClientResult<Vec<Vec<u8>>> {
        let start = start.to_string();
        let stop = stop.to_string();
        expect_bulk_list(self.exec(
            Route::Read(key),
            &[b"LRANGE", key, start.as_bytes(), stop.as_bytes()],
        )?)
    }

    /// Number of elements in a list; zero when the key is missing.
    pub fn llen(&self, key: &[u8]) -> ClientResult<u64> {
        Ok(expect_int(self.exec(Route::Read(key), &[b"LLEN", key])?)?.max(0) as u64)
    }

    /// Appends values to a list. Returns the new list length.
    pub fn rpush(&self, key: &[u8], values: &[&[u8]]) -> ClientResult<u64> {
        if values.is_empty() {
            return Ok(0);
        }
        let mut args: Vec<&[u8]> = Vec::with_capacity(values.len() + 2);
        args.push(b"RPUSH");
        args.push(key);
        args.extend_from_slice(values);
        Ok(expect_int(self.exec(Route::Write(key), &args)?)?.max(0) as u64)
    }

    /// Runs a script against one key.
    pub(crate) fn eval(&self, script: &str, key: &[u8], args: &[&[u8]]) -> ClientResult<RespValue> {
        let mut cmd: Vec<&[u8]> = Vec::with_capacity(args.len() + 4);
        cmd.push(b"EVAL");
        cmd.push(script.as_bytes());
        cmd.push(b"1");
        cmd.push(key);
        cmd.extend_from_slice(args);
        match self.exec(Route::Write(key), &cmd)? {
            RespValue::Error(message) => Err(ClientError::server(&message)),
            reply => Ok(reply),
        }
    }

    /// Sends a command, retrying transport failures per the retry policy.
    pub(crate) fn exec(&self, route: Route<'_>, args: &[&[u8]]) -> ClientResult<RespValue> {
        let mut attempt = 0;
        loop {
            if self.is_shut_down() {
                return Err(ClientError::Closed);
            }
            match self.exec_once(route, args) {
                Err(err) if err.is_retryable() && attempt < self.inner.settings.retry_attempts => {
                    attempt += 1;
                    warn!(attempt, error = %err, "store command failed, retrying");
                    if self.inner.shutdown.wait(self.inner.settings.retry_interval) {
                        return Err(ClientError::Closed);
                    }
                }
                result => return result,
            }
        }
    }

    fn exec_once(&self, route: Route<'_>, args: &[&[u8]]) -> ClientResult<RespValue> {
        match &self.inner.router {
            Router::Single(pool) => pool.acquire()?.exec(args),
            Router::Cluster(cluster) => exec_cluster(cluster, route, args),
        }
    }
}

fn exec_cluster(cluster: &ClusterRouter, route: Route<'_>, args: &[&[u8]]) -> ClientResult<RespValue> {
    let mut pool = match route {
        Route::Any => cluster
            .all_masters()
            .into_iter()
            .next()
            .ok_or(ClientError::SlotUncovered(0))?,
        Route::Read(key) => cluster.route(key_slot(key), true)?,
        Route::Write(key) => cluster.route(key_slot(key), false)?,
    };

    for _ in 0..MAX_REDIRECTS {
        let reply = pool.acquire()?.exec(args)?;
        let redirect = match &reply {
            RespValue::Error(message) => Redirect::parse(message),
            _ => None,
        };
        match redirect {
            None => return Ok(reply),
            Some(Redirect::Moved { slot, addr }) => {
                cluster.moved(slot, &addr);
                pool = cluster.master_pool(&addr);
            }
            Some(Redirect::Ask { addr }) => {
                let mut conn = cluster.master_pool(&addr).acquire()?;
                expect_ok(conn.exec(&["ASKING"])?)?;
                return conn.exec(args);
            }
        }
    }
    Err(ClientError::TooManyRedirects)
}

// PX rejects zero, so sub-millisecond TTLs round up.
fn millis_arg(ttl: Duration) -> String {
    ttl.as_millis().max(1).to_string()
}

fn expect_ok(reply: RespValue) -> ClientResult<()> {
    match reply {
        RespValue::Simple(_) => Ok(()),
        RespValue::Error(message) => Err(ClientError::server(&message)),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

fn expect_int(reply: RespValue) -> ClientResult<i64> {
    match reply {
        RespValue::Integer(value) => Ok(value),
        RespValue::Error(message) => Err(ClientError::server(&message)),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

fn expect_bulk(reply: RespValue) -> ClientResult<Option<Vec<u8>>> {
    match reply {
        RespValue::Bulk(data) => Ok(data),
        RespValue::Error(message) => Err(ClientError::server(&message)),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

fn expect_bulk_list(reply: RespValue) -> ClientResult<Vec<Vec<u8>>> {
    match reply {
        RespValue::Array(items) => items
            .into_iter()
            .map(|item| match item {
                RespValue::Bulk(Some(data)) => Ok(data),
                _ => Err(ClientError::UnexpectedResponse),
            })
            .collect(),
        RespValue::Error(message) => Err(ClientError::server(&message)),
        _ => Err(ClientError::UnexpectedResponse),
    }
}
