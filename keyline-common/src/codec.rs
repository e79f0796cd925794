//! # Value Codecs
//!
//! Purpose: Turn façade values into the bytes stored under a key, and back.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: The client carries one `Codec` chosen at startup.
//! 2. **Zero-Argument Construction**: Codecs are looked up by identifier and
//!    built without parameters, so configuration can name them as strings.
//! 3. **Self-Describing Values**: Codecs operate on `serde_json::Value`, keeping
//!    the façade generic over any `Serialize`/`DeserializeOwned` type.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{CodecError, CodecResult};

/// Serialization strategy for stored values.
pub trait Codec: Send + Sync {
    /// Stable identifier, as accepted by [`instantiate`].
    fn name(&self) -> &'static str;

    /// Encodes a value into stored bytes.
    fn encode(&self, value: &Value) -> CodecResult<Vec<u8>>;

    /// Decodes stored bytes into a value.
    fn decode(&self, bytes: &[u8]) -> CodecResult<Value>;
}

impl fmt::Debug for dyn Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Codec({})", self.name())
    }
}

/// Stores values as compact JSON documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &Value) -> CodecResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Stores strings as raw UTF-8, interoperable with plain `redis-cli` values.
///
/// Numbers and booleans are written in their textual form; structured values
/// are rejected. Decoding always yields a string.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringCodec;

impl Codec for StringCodec {
    fn name(&self) -> &'static str {
        "string"
    }

    fn encode(&self, value: &Value) -> CodecResult<Vec<u8>> {
        match value {
            Value::String(text) => Ok(text.as_bytes().to_vec()),
            Value::Number(number) => Ok(number.to_string().into_bytes()),
            Value::Bool(flag) => Ok(flag.to_string().into_bytes()),
            Value::Null => Err(unsupported("null")),
            Value::Array(_) => Err(unsupported("array")),
            Value::Object(_) => Err(unsupported("object")),
        }
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Value> {
        Ok(Value::String(String::from_utf8(bytes.to_vec())?))
    }
}

fn unsupported(kind: &'static str) -> CodecError {
    CodecError::Unsupported {
        codec: "string",
        kind,
    }
}

/// Builds the codec registered under `id` (case-insensitive).
pub fn instantiate(id: &str) -> CodecResult<Arc<dyn Codec>> {
    match id.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(Arc::new(JsonCodec)),
        "string" | "utf8" => Ok(Arc::new(StringCodec)),
        _ => Err(CodecError::Unknown),
    }
}
