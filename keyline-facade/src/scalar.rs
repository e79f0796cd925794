//! Single-value keys.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{logged, Checked, StoreFacade, StoreResult};

impl Checked<'_> {
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<V>> {
        match self.client.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(self.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> StoreResult<()> {
        let bytes = self.encode(value)?;
        Ok(self.client.set(key.as_bytes(), &bytes)?)
    }

    /// Stores `value` expiring after `ttl`. A zero `ttl` stores it without expiry.
    pub fn set_with_ttl<V: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &V,
        ttl: Duration,
    ) -> StoreResult<()> {
        if ttl.is_zero() {
            return self.set(key, value);
        }
        let bytes = self.encode(value)?;
        Ok(self.client.set_with_ttl(key.as_bytes(), &bytes, ttl)?)
    }
}

impl StoreFacade {
    /// Stored value, or `None` when the key is `None`, missing or unreadable.
    pub fn get<V: DeserializeOwned>(&self, key: Option<&str>) -> Option<V> {
        let key = key?;
        logged("get", key, self.checked().get(key)).flatten()
    }

    pub fn set<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> bool {
        logged("set", key, self.checked().set(key, value)).is_some()
    }

    pub fn set_with_ttl<V: Serialize + ?Sized>(&self, key: &str, value: &V, ttl: Duration) -> bool {
        logged("set_with_ttl", key, self.checked().set_with_ttl(key, value, ttl)).is_some()
    }
}
