//! Single-node fake store speaking RESP2 for the façade tests.
//!
//! Connections share one keyspace. Tests can reject a command by name or drop
//! connections to make individual commands fail.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use keyline_client::NodeAddress;
use parking_lot::Mutex;

const LOCK_MARKER: &str = "redis.call('hincrby', KEYS[1], ARGV[2], 1)";
const UNLOCK_MARKER: &str = "redis.call('hincrby', KEYS[1], ARGV[1], -1)";

#[derive(Debug, Clone)]
enum Value {
    Str(Vec<u8>),
    Hash(BTreeMap<Vec<u8>, Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
    List(Vec<Vec<u8>>),
}

#[derive(Default)]
struct State {
    data: HashMap<Vec<u8>, Value>,
    expiries: HashMap<Vec<u8>, Instant>,
    drop_next: usize,
    rejected: BTreeSet<String>,
    commands: Vec<Vec<Vec<u8>>>,
}

impl State {
    fn purge(&mut self, key: &[u8]) {
        if let Some(deadline) = self.expiries.get(key) {
            if Instant::now() >= *deadline {
                self.expiries.remove(key);
                self.data.remove(key);
            }
        }
    }

    fn live(&mut self, key: &[u8]) -> Option<&mut Value> {
        self.purge(key);
        self.data.get_mut(key)
    }

    fn remove(&mut self, key: &[u8]) -> bool {
        self.purge(key);
        self.expiries.remove(key);
        self.data.remove(key).is_some()
    }
}

/// Handle to a running fake store.
#[derive(Clone)]
pub struct FakeStore {
    addr: NodeAddress,
    state: Arc<Mutex<State>>,
}

impl FakeStore {
    pub fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let store = FakeStore {
            addr: NodeAddress::new("127.0.0.1", port),
            state: Arc::new(Mutex::new(State::default())),
        };

        let state = store.state.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let state = state.clone();
                thread::spawn(move || serve(stream, state));
            }
        });
        store
    }

    pub fn addr(&self) -> NodeAddress {
        self.addr.clone()
    }

    pub fn url(&self) -> String {
        format!("redis://{}", self.addr)
    }

    /// Closes the connection instead of answering the next `count` commands.
    pub fn drop_next(&self, count: usize) {
        self.state.lock().drop_next = count;
    }

    /// Answers every later command named `name` with an error reply.
    pub fn reject(&self, name: &str) {
        self.state.lock().rejected.insert(name.to_ascii_uppercase());
    }

    pub fn string(&self, key: &str) -> Option<Vec<u8>> {
        match self.state.lock().live(key.as_bytes()) {
            Some(Value::Str(data)) => Some(data.clone()),
            _ => None,
        }
    }

    /// Hold count of `token` on the lock hash at `key`.
    pub fn lock_holds(&self, key: &str, token: &str) -> Option<i64> {
        match self.state.lock().live(key.as_bytes()) {
            Some(Value::Hash(fields)) => fields.get(token.as_bytes()).map(|count| parse_i64(count)),
            _ => None,
        }
    }

    /// Field names of the hash at `key`.
    pub fn hash_fields(&self, key: &str) -> Vec<String> {
        match self.state.lock().live(key.as_bytes()) {
            Some(Value::Hash(fields)) => fields
                .keys()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().live(key.as_bytes()).is_some()
    }

    /// Milliseconds until `key` expires, if it has an expiry.
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let state = self.state.lock();
        state
            .expiries
            .get(key.as_bytes())
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Every command received so far with the given name.
    pub fn commands_named(&self, name: &str) -> Vec<Vec<Vec<u8>>> {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|args| args[0].eq_ignore_ascii_case(name.as_bytes()))
            .cloned()
            .collect()
    }
}

fn serve(stream: TcpStream, state: Arc<Mutex<State>>) {
    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(_) => return,
    };
    let mut reader = BufReader::new(stream);

    while let Ok(args) = read_command(&mut reader) {
        if args.is_empty() {
            break;
        }
        let mut out = Vec::new();
        {
            let mut state = state.lock();
            if state.drop_next > 0 {
                state.drop_next -= 1;
                return;
            }
            state.commands.push(args.clone());
            dispatch(&mut state, &args, &mut out);
        }
        if writer.write_all(&out).is_err() {
            break;
        }
    }
}

fn dispatch(state: &mut State, args: &[Vec<u8>], out: &mut Vec<u8>) {
    let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();

    if state.rejected.contains(&name) {
        return write_error(out, &format!("ERR '{name}' is disabled"));
    }

    match name.as_str() {
        "PING" => write_simple(out, "PONG"),
        "GET" => match state.live(&args[1]) {
            Some(Value::Str(data)) => write_bulk(out, data),
            Some(_) => write_wrong_type(out),
            None => write_null(out),
        },
        "SET" => set(state, args, out),
        "DEL" => {
            let removed = args[1..].iter().filter(|key| state.remove(key)).count();
            write_integer(out, removed as i64);
        }
        "EXISTS" => {
            let found = args[1..].iter().filter(|key| state.live(key).is_some()).count();
            write_integer(out, found as i64);
        }
        "PEXPIRE" => {
            let millis = parse_i64(&args[2]);
            if state.live(&args[1]).is_some() {
                let deadline = Instant::now() + Duration::from_millis(millis.max(0) as u64);
                state.expiries.insert(args[1].clone(), deadline);
                write_integer(out, 1);
            } else {
                write_integer(out, 0);
            }
        }
        "PTTL" => {
            if state.live(&args[1]).is_none() {
                write_integer(out, -2);
            } else {
                match state.expiries.get(&args[1]) {
                    Some(deadline) => {
                        let left = deadline.saturating_duration_since(Instant::now());
                        write_integer(out, left.as_millis() as i64);
                    }
                    None => write_integer(out, -1),
                }
            }
        }
        "HGET" => match state.live(&args[1]) {
            Some(Value::Hash(fields)) => match fields.get(&args[2]) {
                Some(value) => write_bulk(out, value),
                None => write_null(out),
            },
            Some(_) => write_wrong_type(out),
            None => write_null(out),
        },
        "HGETALL" => match state.live(&args[1]) {
            Some(Value::Hash(fields)) => {
                let flat: Vec<&Vec<u8>> = fields.iter().flat_map(|(f, v)| [f, v]).collect();
                write_bulk_array(out, &flat);
            }
            Some(_) => write_wrong_type(out),
            None => write_bulk_array(out, &[]),
        },
        "HSET" => {
            let entry = state
                .live(&args[1])
                .cloned()
                .unwrap_or_else(|| Value::Hash(BTreeMap::new()));
            let Value::Hash(mut fields) = entry else {
                return write_wrong_type(out);
            };
            let mut added = 0;
            for pair in args[2..].chunks(2) {
                if fields.insert(pair[0].clone(), pair[1].clone()).is_none() {
                    added += 1;
                }
            }
            state.data.insert(args[1].clone(), Value::Hash(fields));
            write_integer(out, added);
        }
        "HDEL" => match state.live(&args[1]) {
            Some(Value::Hash(fields)) => {
                let removed = args[2..].iter().filter(|f| fields.remove(*f).is_some()).count();
                write_integer(out, removed as i64);
            }
            Some(_) => write_wrong_type(out),
            None => write_integer(out, 0),
        },
        "SMEMBERS" => match state.live(&args[1]) {
            Some(Value::Set(members)) => {
                let members: Vec<&Vec<u8>> = members.iter().collect();
                write_bulk_array(out, &members);
            }
            Some(_) => write_wrong_type(out),
            None => write_bulk_array(out, &[]),
        },
        "SISMEMBER" => match state.live(&args[1]) {
            Some(Value::Set(members)) => write_integer(out, members.contains(&args[2]) as i64),
            Some(_) => write_wrong_type(out),
            None => write_integer(out, 0),
        },
        "SADD" => {
            let entry = state
                .live(&args[1])
                .cloned()
                .unwrap_or_else(|| Value::Set(BTreeSet::new()));
            let Value::Set(mut members) = entry else {
                return write_wrong_type(out);
            };
            let added = args[2..].iter().filter(|m| members.insert((*m).clone())).count();
            state.data.insert(args[1].clone(), Value::Set(members));
            write_integer(out, added as i64);
        }
        "LRANGE" => match state.live(&args[1]) {
            Some(Value::List(items)) => {
                let slice = list_range(items, parse_i64(&args[2]), parse_i64(&args[3]));
                let slice: Vec<&Vec<u8>> = slice.iter().collect();
                write_bulk_array(out, &slice);
            }
            Some(_) => write_wrong_type(out),
            None => write_bulk_array(out, &[]),
        },
        "LLEN" => match state.live(&args[1]) {
            Some(Value::List(items)) => write_integer(out, items.len() as i64),
            Some(_) => write_wrong_type(out),
            None => write_integer(out, 0),
        },
        "RPUSH" => {
            let entry = state
                .live(&args[1])
                .cloned()
                .unwrap_or_else(|| Value::List(Vec::new()));
            let Value::List(mut items) = entry else {
                return write_wrong_type(out);
            };
            items.extend(args[2..].iter().cloned());
            let len = items.len();
            state.data.insert(args[1].clone(), Value::List(items));
            write_integer(out, len as i64);
        }
        "EVAL" => {
            let script = String::from_utf8_lossy(&args[1]).into_owned();
            if script.contains(LOCK_MARKER) {
                lock(state, &args[3], parse_i64(&args[4]), &args[5], out);
            } else if script.contains(UNLOCK_MARKER) {
                unlock(state, &args[3], &args[4], out);
            } else {
                write_error(out, "ERR unsupported script");
            }
        }
        _ => write_error(out, &format!("ERR unknown command '{name}'")),
    }
}

// Reentrant hash lock: nil when acquired, else the holder's PTTL.
fn lock(state: &mut State, key: &[u8], lease_ms: i64, token: &[u8], out: &mut Vec<u8>) {
    let existing = state.live(key).cloned();
    let mut fields = match existing {
        None => BTreeMap::new(),
        Some(Value::Hash(fields)) if fields.contains_key(token) => fields,
        Some(Value::Hash(_)) => {
            return match state.expiries.get(key) {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    write_integer(out, left.as_millis() as i64)
                }
                None => write_integer(out, -1),
            };
        }
        Some(_) => return write_wrong_type(out),
    };
    let count = fields.get(token).map(|count| parse_i64(count)).unwrap_or(0) + 1;
    fields.insert(token.to_vec(), count.to_string().into_bytes());
    state.data.insert(key.to_vec(), Value::Hash(fields));
    let deadline = Instant::now() + Duration::from_millis(lease_ms.max(0) as u64);
    state.expiries.insert(key.to_vec(), deadline);
    write_null(out);
}

// nil when not held by `token`, 0 when still held, 1 when deleted.
fn unlock(state: &mut State, key: &[u8], token: &[u8], out: &mut Vec<u8>) {
    let count = match state.live(key) {
        Some(Value::Hash(fields)) => match fields.get_mut(token) {
            Some(count) => {
                let left = parse_i64(count) - 1;
                *count = left.to_string().into_bytes();
                left
            }
            None => return write_null(out),
        },
        _ => return write_null(out),
    };
    if count > 0 {
        write_integer(out, 0);
    } else {
        state.remove(key);
        write_integer(out, 1);
    }
}

fn set(state: &mut State, args: &[Vec<u8>], out: &mut Vec<u8>) {
    let mut ttl = None;
    let mut idx = 3;
    while idx < args.len() {
        match args[idx].to_ascii_uppercase().as_slice() {
            b"PX" => {
                idx += 1;
                let millis = parse_i64(&args[idx]);
                if millis <= 0 {
                    return write_error(out, "ERR invalid expire time in 'set' command");
                }
                ttl = Some(Duration::from_millis(millis as u64));
            }
            _ => return write_error(out, "ERR syntax error"),
        }
        idx += 1;
    }

    state.data.insert(args[1].clone(), Value::Str(args[2].clone()));
    match ttl {
        Some(ttl) => {
            state.expiries.insert(args[1].clone(), Instant::now() + ttl);
        }
        None => {
            state.expiries.remove(&args[1]);
        }
    }
    write_simple(out, "OK");
}

fn list_range(items: &[Vec<u8>], start: i64, stop: i64) -> Vec<Vec<u8>> {
    let len = items.len() as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return Vec::new();
    }
    items[start as usize..=stop as usize].to_vec()
}

fn read_command(reader: &mut BufReader<TcpStream>) -> std::io::Result<Vec<Vec<u8>>> {
    let mut line = Vec::new();
    if !read_line(reader, &mut line)? {
        return Ok(Vec::new());
    }
    if line.first() != Some(&b'*') {
        return Err(invalid("expected array"));
    }
    let count = parse_i64(&line[1..]).max(0) as usize;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        if !read_line(reader, &mut line)? || line.first() != Some(&b'$') {
            return Err(invalid("expected bulk"));
        }
        let len = parse_i64(&line[1..]).max(0) as usize;
        let mut data = vec![0u8; len + 2];
        reader.read_exact(&mut data)?;
        data.truncate(len);
        args.push(data);
    }
    Ok(args)
}

fn read_line(reader: &mut BufReader<TcpStream>, buf: &mut Vec<u8>) -> std::io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    if !buf.ends_with(b"\r\n") {
        return Err(invalid("invalid line"));
    }
    buf.truncate(buf.len() - 2);
    Ok(true)
}

fn invalid(reason: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, reason.to_string())
}

fn parse_i64(data: &[u8]) -> i64 {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .unwrap_or(0)
}

fn write_simple(out: &mut Vec<u8>, msg: &str) {
    out.extend_from_slice(format!("+{msg}\r\n").as_bytes());
}

fn write_error(out: &mut Vec<u8>, msg: &str) {
    out.extend_from_slice(format!("-{msg}\r\n").as_bytes());
}

fn write_wrong_type(out: &mut Vec<u8>) {
    write_error(out, "WRONGTYPE Operation against a key holding the wrong kind of value");
}

fn write_integer(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(format!(":{value}\r\n").as_bytes());
}

fn write_null(out: &mut Vec<u8>) {
    out.extend_from_slice(b"$-1\r\n");
}

fn write_bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

fn write_bulk_array(out: &mut Vec<u8>, items: &[&Vec<u8>]) {
    out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
    for item in items {
        write_bulk(out, item);
    }
}
