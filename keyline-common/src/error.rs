//! # Error Types
//!
//! Startup-time configuration failures and value codec failures.

use thiserror::Error;

/// Result type for configuration loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Fatal configuration errors. Raised only while the process starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither a cluster nor a single-server block was configured.
    #[error("no valid server configuration provided")]
    NoTopology,

    /// The configured codec identifier could not be instantiated.
    #[error("failed to instantiate codec `{id}`: {source}")]
    Codec {
        id: String,
        #[source]
        source: CodecError,
    },

    /// A field holds a value the client cannot use.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// A node address could not be parsed.
    #[error("invalid address `{address}`: {reason}")]
    Address { address: String, reason: String },

    /// The configuration namespace is missing from the document.
    #[error("configuration namespace `{0}` not found")]
    MissingNamespace(String),

    /// The configuration source could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration document is malformed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors produced while encoding or decoding stored values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// No codec is registered under the identifier.
    #[error("unknown codec identifier")]
    Unknown,

    /// The codec cannot represent this value.
    #[error("codec `{codec}` cannot encode {kind} values")]
    Unsupported { codec: &'static str, kind: &'static str },

    /// Stored bytes are not valid UTF-8 text.
    #[error("stored value is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
