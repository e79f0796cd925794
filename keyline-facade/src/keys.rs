//! Operations that apply to a key of any shape.

use std::time::Duration;

use keyline_client::KeyTtl;

use crate::{logged, Checked, StoreFacade, StoreResult};

impl Checked<'_> {
    /// Sets a TTL on `key`. A zero `ttl` sends nothing and succeeds.
    /// Returns true when the key existed.
    pub fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        if ttl.is_zero() {
            return Ok(true);
        }
        Ok(self.client.expire(key.as_bytes(), ttl)?)
    }

    pub fn get_expire(&self, key: &str) -> StoreResult<KeyTtl> {
        Ok(self.client.ttl(key.as_bytes())?)
    }

    pub fn has_key(&self, key: &str) -> StoreResult<bool> {
        Ok(self.client.exists(key.as_bytes())?)
    }

    /// Deletes `keys` and returns how many existed.
    pub fn delete(&self, keys: &[&str]) -> StoreResult<u64> {
        match keys {
            [] => Ok(0),
            [key] => Ok(self.client.delete(key.as_bytes())? as u64),
            _ => {
                let keys: Vec<&[u8]> = keys.iter().map(|key| key.as_bytes()).collect();
                Ok(self.client.delete_many(&keys)?)
            }
        }
    }
}

impl StoreFacade {
    /// Sets a TTL on `key`; a zero duration is a successful no-op.
    pub fn expire(&self, key: &str, ttl: Duration) -> bool {
        logged("expire", key, self.checked().expire(key, ttl)).is_some()
    }

    /// Remaining TTL in milliseconds: `-1` without expiry, `-2` when the key
    /// is missing or the store cannot be asked.
    pub fn get_expire(&self, key: &str) -> i64 {
        logged("get_expire", key, self.checked().get_expire(key))
            .unwrap_or(KeyTtl::Missing)
            .as_millis()
    }

    pub fn has_key(&self, key: &str) -> bool {
        logged("has_key", key, self.checked().has_key(key)).unwrap_or(false)
    }

    pub fn delete(&self, keys: &[&str]) {
        let label = keys.join(",");
        logged("delete", &label, self.checked().delete(keys));
    }
}
