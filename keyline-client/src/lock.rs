//! # Distributed Lock
//!
//! A lock is a hash keyed by owner token whose value counts how many times
//! that owner holds it. Both acquire and release run as scripts, so checking
//! the owner and changing the count is atomic on the server.
//!
//! 1. **Reentrant**: The holder may acquire again; each acquire needs a
//!    matching release before the key is deleted.
//! 2. **Leased**: Every acquire resets the key's expiry to the lease, so a
//!    crashed holder frees the lock once the lease runs out.
//!
//! Tokens are `<client id>:<thread ordinal>`: every thread of a process gets
//! its own identity, matching the blocking, thread-per-caller model.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::client::StoreClient;
use crate::error::{ClientError, ClientResult};
use crate::resp::RespValue;

/// Longest single sleep between acquisition attempts.
const POLL_STEP: Duration = Duration::from_millis(100);

// ARGV[1] is the lease in milliseconds, ARGV[2] the owner token.
// Replies nil when acquired, otherwise the holder's remaining TTL.
const LOCK_SCRIPT: &str = "if (redis.call('exists', KEYS[1]) == 0) or \
                           (redis.call('hexists', KEYS[1], ARGV[2]) == 1) then \
                           redis.call('hincrby', KEYS[1], ARGV[2], 1); \
                           redis.call('pexpire', KEYS[1], ARGV[1]); \
                           return nil; end; \
                           return redis.call('pttl', KEYS[1]);";

// ARGV[1] is the owner token. Replies nil when not held, 0 when still held
// after this release, 1 when the lock was deleted.
const UNLOCK_SCRIPT: &str = "if (redis.call('hexists', KEYS[1], ARGV[1]) == 0) then \
                             return nil; end; \
                             local counter = redis.call('hincrby', KEYS[1], ARGV[1], -1); \
                             if (counter > 0) then return 0; end; \
                             redis.call('del', KEYS[1]); \
                             return 1;";

static NEXT_THREAD: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ORDINAL: u64 = NEXT_THREAD.fetch_add(1, Ordering::Relaxed);
}

/// Outcome of one acquisition attempt.
enum Attempt {
    Acquired,
    /// Held by another owner; carries its remaining lease when known.
    Held(Option<Duration>),
}

impl StoreClient {
    /// Token identifying the calling thread of this client as a lock owner.
    pub fn lock_token(&self) -> String {
        let ordinal = THREAD_ORDINAL.with(|ordinal| *ordinal);
        format!("{}:{}", self.id(), ordinal)
    }

    /// Tries to acquire the lock on `key`, blocking up to `wait`.
    ///
    /// An acquired lock expires after `lease` unless released first; a zero
    /// lease uses the configured default. A zero `wait` makes one attempt.
    /// The calling thread may acquire a lock it already holds.
    ///
    /// # Errors
    /// Returns `ClientError::Interrupted` when the client is shut down while
    /// the caller is waiting.
    pub fn try_lock(&self, key: &[u8], wait: Duration, lease: Duration) -> ClientResult<bool> {
        let lease = if lease.is_zero() {
            self.config().lock_lease
        } else {
            lease
        };
        let token = self.lock_token();
        // None: the wait is too long to represent, so it never runs out.
        let deadline = Instant::now().checked_add(wait);

        loop {
            let remaining_lease = match self.interruptible(self.attempt_lock(key, &token, lease))? {
                Attempt::Acquired => {
                    debug!(key = %String::from_utf8_lossy(key), "lock acquired");
                    return Ok(true);
                }
                Attempt::Held(remaining) => remaining,
            };

            // Sleep until the holder's lease runs out, but keep polling so an
            // early release is noticed.
            let mut pause = POLL_STEP;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(false);
                }
                pause = pause.min(deadline - now);
            }
            if let Some(remaining) = remaining_lease {
                pause = pause.min(remaining.max(Duration::from_millis(1)));
            }
            if self.shutdown_signal().wait(pause) {
                return Err(ClientError::Interrupted);
            }
        }
    }

    fn attempt_lock(&self, key: &[u8], token: &str, lease: Duration) -> ClientResult<Attempt> {
        let millis = lease.as_millis().max(1).to_string();
        match self.eval(LOCK_SCRIPT, key, &[millis.as_bytes(), token.as_bytes()])? {
            RespValue::Bulk(None) => Ok(Attempt::Acquired),
            RespValue::Integer(ttl) if ttl > 0 => {
                Ok(Attempt::Held(Some(Duration::from_millis(ttl as u64))))
            }
            RespValue::Integer(_) => Ok(Attempt::Held(None)),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    // A waiter that finds the client closed was interrupted, whichever step it was on.
    fn interruptible<T>(&self, result: ClientResult<T>) -> ClientResult<T> {
        match result {
            Err(ClientError::Closed) if self.is_shut_down() => Err(ClientError::Interrupted),
            other => other,
        }
    }

    /// Releases one hold on the lock on `key` by the calling thread. The key
    /// is deleted once every nested acquire has been released.
    ///
    /// # Errors
    /// Returns `ClientError::LockNotHeld` when the lock is missing or owned by
    /// someone else.
    pub fn unlock(&self, key: &[u8]) -> ClientResult<()> {
        let token = self.lock_token();
        match self.eval(UNLOCK_SCRIPT, key, &[token.as_bytes()])? {
            RespValue::Bulk(None) => Err(ClientError::LockNotHeld),
            RespValue::Integer(1) => {
                debug!(key = %String::from_utf8_lossy(key), "lock released");
                Ok(())
            }
            RespValue::Integer(_) => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }
}
