//! # Connection Pool
//!
//! Purpose: Keep a bounded set of authenticated TCP connections per store
//! node so commands skip the handshake on the hot path.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Connections are checked out, used for one
//!    command exchange, and returned by an RAII guard.
//! 2. **Minimal Locking**: The mutex guards only the idle queue and counters,
//!    never socket I/O.
//! 3. **Bounded Waits**: A caller finding every slot in use waits for a
//!    returned connection, up to the response timeout.
//! 4. **Broken Connections Never Return**: Any I/O or framing failure drops
//!    the connection and frees its slot.

use std::collections::VecDeque;
use std::io::{BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::config::{ConnectionSettings, NodeAddress};
use crate::error::{ClientError, ClientResult};
use crate::resp::{encode_command, read_response, RespValue};

/// Pool configuration for one node.
#[derive(Debug, Clone)]
pub(crate) struct PoolConfig {
    pub addr: NodeAddress,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    /// Connections opened eagerly by [`ConnectionPool::prefill`].
    pub min_idle: usize,
    /// Issue `READONLY` after connecting (cluster replicas).
    pub readonly: bool,
    pub settings: ConnectionSettings,
}

struct IdleConnection {
    conn: Connection,
    since: Instant,
}

struct PoolState {
    idle: VecDeque<IdleConnection>,
    total: usize,
    closed: bool,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    /// Signalled when a slot or idle connection frees up, and on close.
    available: Condvar,
}

/// Connection pool handle for one node.
#[derive(Clone)]
pub(crate) struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_total.min(64)),
            total: 0,
            closed: false,
        };
        ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
                available: Condvar::new(),
            }),
        }
    }

    pub fn addr(&self) -> &NodeAddress {
        &self.inner.config.addr
    }

    /// Opens connections until `min_idle` are pooled.
    pub fn prefill(&self) -> ClientResult<()> {
        let wanted = self.inner.config.min_idle.min(self.inner.config.max_total);
        while self.total() < wanted {
            let conn = self.open()?;
            self.give_back(conn);
        }
        Ok(())
    }

    /// Checks out a connection, opening one if none is idle.
    ///
    /// When every slot is in use the caller blocks until a connection comes
    /// back or the response timeout elapses, which yields `PoolExhausted`.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        let config = &self.inner.config;
        let deadline = Instant::now().checked_add(config.settings.timeout);
        let mut state = self.inner.state.lock();
        let mut expired = false;

        loop {
            if state.closed {
                return Err(ClientError::Closed);
            }
            while let Some(idle) = state.idle.pop_front() {
                if idle.since.elapsed() <= config.settings.idle_connection_timeout {
                    drop(state);
                    return Ok(PooledConnection::new(self.clone(), idle.conn));
                }
                state.total = state.total.saturating_sub(1);
                debug!(node = %config.addr, "closed idle connection");
            }
            if state.total < config.max_total {
                state.total += 1;
                break;
            }
            if expired {
                return Err(ClientError::PoolExhausted);
            }
            expired = match deadline {
                Some(deadline) => self.inner.available.wait_until(&mut state, deadline).timed_out(),
                None => {
                    self.inner.available.wait(&mut state);
                    false
                }
            };
        }
        drop(state);

        let conn = self.connect_reserved()?;
        Ok(PooledConnection::new(self.clone(), conn))
    }

    /// Drops idle connections, rejects further checkouts and wakes waiters.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        state.closed = true;
        let dropped = state.idle.len();
        state.idle.clear();
        state.total = state.total.saturating_sub(dropped);
        self.inner.available.notify_all();
    }

    fn total(&self) -> usize {
        self.inner.state.lock().total
    }

    #[cfg(test)]
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    // Non-blocking; used only to pre-fill.
    fn open(&self) -> ClientResult<Connection> {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(ClientError::Closed);
            }
            if state.total >= self.inner.config.max_total {
                return Err(ClientError::PoolExhausted);
            }
            state.total += 1;
        }
        self.connect_reserved()
    }

    // The caller has already counted this connection in `total`.
    fn connect_reserved(&self) -> ClientResult<Connection> {
        match Connection::connect(&self.inner.config) {
            Ok(conn) => Ok(conn),
            Err(err) => {
                self.release_slot();
                Err(err)
            }
        }
    }

    fn release_slot(&self) {
        let mut state = self.inner.state.lock();
        state.total = state.total.saturating_sub(1);
        self.inner.available.notify_one();
    }

    fn give_back(&self, conn: Connection) {
        let mut state = self.inner.state.lock();
        if state.closed {
            state.total = state.total.saturating_sub(1);
            return;
        }
        state.idle.push_back(IdleConnection {
            conn,
            since: Instant::now(),
        });
        self.inner.available.notify_one();
    }
}

/// RAII guard returning a healthy connection to its pool on drop.
pub(crate) struct PooledConnection {
    pool: ConnectionPool,
    conn: Option<Connection>,
    healthy: bool,
}

impl PooledConnection {
    fn new(pool: ConnectionPool, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            healthy: true,
        }
    }

    /// Sends one command and reads its reply.
    pub fn exec<A: AsRef<[u8]>>(&mut self, args: &[A]) -> ClientResult<RespValue> {
        let conn = match self.conn.as_mut() {
            Some(conn) => conn,
            None => return Err(ClientError::Closed),
        };
        let reply = conn.exec(args);
        if reply.is_err() {
            self.healthy = false;
        }
        reply
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.healthy {
            self.pool.give_back(conn);
        } else {
            self.pool.release_slot();
        }
    }
}

/// Single TCP connection with reusable buffers.
struct Connection {
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl Connection {
    fn connect(config: &PoolConfig) -> ClientResult<Self> {
        let settings = &config.settings;
        let stream = connect_stream(&config.addr, settings.connect_timeout)?;
        stream.set_read_timeout(Some(settings.timeout))?;
        stream.set_write_timeout(Some(settings.timeout))?;
        stream.set_nodelay(true)?;

        let mut conn = Connection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
        };

        if let Some(password) = settings.password.as_deref() {
            conn.expect_ok(&[b"AUTH".as_slice(), password.as_bytes()])?;
        }
        if config.readonly {
            conn.expect_ok(&[b"READONLY".as_slice()])?;
        }
        debug!(node = %config.addr, readonly = config.readonly, "opened connection");
        Ok(conn)
    }

    fn exec<A: AsRef<[u8]>>(&mut self, args: &[A]) -> ClientResult<RespValue> {
        self.write_buf.clear();
        encode_command(args, &mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        read_response(&mut self.reader, &mut self.line_buf)
    }

    fn expect_ok(&mut self, args: &[&[u8]]) -> ClientResult<()> {
        match self.exec(args)? {
            RespValue::Simple(_) => Ok(()),
            RespValue::Error(message) => Err(ClientError::server(&message)),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }
}

fn connect_stream(addr: &NodeAddress, timeout: Duration) -> ClientResult<TcpStream> {
    let candidates = (addr.host.as_str(), addr.port)
        .to_socket_addrs()
        .map_err(|_| ClientError::Unresolved(addr.to_string()))?;

    let mut last_err = None;
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    match last_err {
        Some(err) => Err(ClientError::Io(err)),
        None => Err(ClientError::Unresolved(addr.to_string())),
    }
}
