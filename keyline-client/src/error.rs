//! # Client Errors

use thiserror::Error;

/// Result type for the store client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the store client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or IO failure while connecting, reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// RESP2 framing or parse error.
    #[error("protocol error")]
    Protocol,

    /// Server returned an error reply.
    #[error("server error: {message}")]
    Server { message: String },

    /// Response type did not match the expected command response.
    #[error("unexpected response")]
    UnexpectedResponse,

    /// Pool is at capacity and no idle connections are available.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Host name did not resolve to any socket address.
    #[error("cannot resolve address: {0}")]
    Unresolved(String),

    /// Configuration carries no topology.
    #[error("no topology configured")]
    NotConfigured,

    /// The client was shut down.
    #[error("client is shut down")]
    Closed,

    /// A waiter was woken by shutdown before acquiring the lock.
    #[error("interrupted while waiting for lock")]
    Interrupted,

    /// Cluster kept redirecting the command.
    #[error("too many cluster redirects")]
    TooManyRedirects,

    /// No known node serves the slot.
    #[error("no node serves slot {0}")]
    SlotUncovered(u16),

    /// Unlock was attempted by a caller that does not hold the lock.
    #[error("lock is not held by this client")]
    LockNotHeld,
}

impl ClientError {
    /// Returns true for transport failures that the retry policy covers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Io(_))
    }

    pub(crate) fn server(message: &[u8]) -> Self {
        ClientError::Server {
            message: String::from_utf8_lossy(message).into_owned(),
        }
    }
}
