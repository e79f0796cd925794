//! Set keys.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{logged, Checked, StoreFacade, StoreResult};

impl Checked<'_> {
    pub fn set_members<V: DeserializeOwned>(&self, key: &str) -> StoreResult<Vec<V>> {
        let members = self.client.smembers(key.as_bytes())?;
        self.decode_all(members)
    }

    pub fn set_contains<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> StoreResult<bool> {
        let member = self.encode(value)?;
        Ok(self.client.sismember(key.as_bytes(), &member)?)
    }

    /// Adds `values` and returns how many were new. Empty input sends nothing.
    pub fn set_add<V: Serialize>(&self, key: &str, values: &[V]) -> StoreResult<u64> {
        let encoded = self.encode_all(values)?;
        let members: Vec<&[u8]> = encoded.iter().map(Vec::as_slice).collect();
        Ok(self.client.sadd(key.as_bytes(), &members)?)
    }
}

impl StoreFacade {
    /// Every member of the set; empty when missing or unreadable.
    pub fn set_members<V: DeserializeOwned>(&self, key: &str) -> Vec<V> {
        logged("set_members", key, self.checked().set_members(key)).unwrap_or_default()
    }

    pub fn set_contains<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> bool {
        logged("set_contains", key, self.checked().set_contains(key, value)).unwrap_or(false)
    }

    /// True when at least one value was added. Empty input returns false.
    pub fn set_add<V: Serialize>(&self, key: &str, values: &[V]) -> bool {
        if values.is_empty() {
            return false;
        }
        logged("set_add", key, self.checked().set_add(key, values)).is_some_and(|added| added > 0)
    }
}
