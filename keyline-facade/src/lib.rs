//! # keyline-facade
//!
//! Per-data-shape operations over a shared [`StoreClient`].
//!
//! [`StoreFacade`] is the boundary used by request handlers: mutating
//! operations report success as a `bool`, reads fall back to `None` or an
//! empty collection, and every failure is logged with the operation and key.
//! Lock acquisition is the exception: a wait cut short by shutdown returns
//! [`LockInterrupted`].
//!
//! [`StoreFacade::checked`] exposes the same operations returning
//! [`StoreResult`], so callers that need to tell an absent value from an
//! unreachable store can do so.
//!
//! Values are serialized with `serde` and encoded by the client's codec.

mod error;
mod hash;
mod keys;
mod list;
mod lock;
mod scalar;
mod set;

pub use error::{LockInterrupted, StoreError, StoreResult};

use keyline_client::StoreClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

/// Boolean/log boundary over the store. Cheap to clone.
#[derive(Clone)]
pub struct StoreFacade {
    client: StoreClient,
}

impl StoreFacade {
    pub fn new(client: StoreClient) -> Self {
        StoreFacade { client }
    }

    pub fn client(&self) -> &StoreClient {
        &self.client
    }

    /// The same operations with failures returned instead of logged.
    pub fn checked(&self) -> Checked<'_> {
        Checked {
            client: &self.client,
        }
    }
}

/// Operations that return their failure cause.
#[derive(Clone, Copy)]
pub struct Checked<'a> {
    client: &'a StoreClient,
}

impl Checked<'_> {
    fn encode<V: Serialize + ?Sized>(&self, value: &V) -> StoreResult<Vec<u8>> {
        let value = serde_json::to_value(value)?;
        Ok(self.client.codec().encode(&value)?)
    }

    fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> StoreResult<V> {
        let value = self.client.codec().decode(bytes)?;
        Ok(serde_json::from_value(value)?)
    }

    fn encode_all<V: Serialize>(&self, values: &[V]) -> StoreResult<Vec<Vec<u8>>> {
        values.iter().map(|value| self.encode(value)).collect()
    }

    fn decode_all<V: DeserializeOwned>(&self, items: Vec<Vec<u8>>) -> StoreResult<Vec<V>> {
        items.iter().map(|item| self.decode(item)).collect()
    }
}

fn logged<T>(op: &'static str, key: &str, result: StoreResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            error!(op, key, error = %err, "store operation failed");
            None
        }
    }
}
