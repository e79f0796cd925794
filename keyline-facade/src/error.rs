//! # Façade Errors

use keyline_client::ClientError;
use keyline_common::CodecError;
use thiserror::Error;

/// Result type of the checked façade surface.
pub type StoreResult<T> = Result<T, StoreError>;

/// Why a checked façade operation failed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or rejected the command.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A value could not be converted to or from its stored form.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A list range fell outside the list.
    #[error("range {start}..={end} out of bounds for list of length {len}")]
    Range { start: i64, end: i64, len: u64 },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Codec(CodecError::Json(err))
    }
}

impl From<std::string::FromUtf8Error> for StoreError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        StoreError::Codec(CodecError::Utf8(err))
    }
}

/// A lock wait was cut short because the client shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interrupted while waiting for lock")]
pub struct LockInterrupted;
