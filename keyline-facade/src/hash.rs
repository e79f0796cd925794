//! Hash keys. Field names are stored as raw UTF-8; field values go through
//! the codec.

use std::collections::HashMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

use crate::{logged, Checked, StoreFacade, StoreResult};

impl Checked<'_> {
    pub fn hash_get<V: DeserializeOwned>(&self, key: &str, field: &str) -> StoreResult<Option<V>> {
        match self.client.hget(key.as_bytes(), field.as_bytes())? {
            Some(bytes) => Ok(Some(self.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn hash_get_all<V: DeserializeOwned>(&self, key: &str) -> StoreResult<HashMap<String, V>> {
        self.client
            .hgetall(key.as_bytes())?
            .into_iter()
            .map(|(field, value)| -> StoreResult<(String, V)> {
                Ok((String::from_utf8(field)?, self.decode(&value)?))
            })
            .collect()
    }

    /// Writes every entry of `fields`. An empty map sends nothing.
    pub fn hash_set_all<V: Serialize>(&self, key: &str, fields: &HashMap<String, V>) -> StoreResult<()> {
        let mut encoded = Vec::with_capacity(fields.len());
        for (field, value) in fields {
            encoded.push((field.as_bytes(), self.encode(value)?));
        }
        let pairs: Vec<(&[u8], &[u8])> = encoded
            .iter()
            .map(|(field, value)| (*field, value.as_slice()))
            .collect();
        self.client.hset(key.as_bytes(), &pairs)?;
        Ok(())
    }

    /// Writes `fields`, then applies `ttl` to the whole hash when non-zero.
    /// A failed expire is logged; the write still counts as done.
    pub fn hash_set_all_with_ttl<V: Serialize>(
        &self,
        key: &str,
        fields: &HashMap<String, V>,
        ttl: Duration,
    ) -> StoreResult<()> {
        self.hash_set_all(key, fields)?;
        self.expire_after_write("hash_set_all_with_ttl", key, ttl);
        Ok(())
    }

    pub fn hash_set<V: Serialize + ?Sized>(&self, key: &str, field: &str, value: &V) -> StoreResult<()> {
        let bytes = self.encode(value)?;
        self.client
            .hset(key.as_bytes(), &[(field.as_bytes(), bytes.as_slice())])?;
        Ok(())
    }

    pub fn hash_set_with_ttl<V: Serialize + ?Sized>(
        &self,
        key: &str,
        field: &str,
        value: &V,
        ttl: Duration,
    ) -> StoreResult<()> {
        self.hash_set(key, field, value)?;
        self.expire_after_write("hash_set_with_ttl", key, ttl);
        Ok(())
    }

    // The write already happened, so an expire failure only gets logged.
    fn expire_after_write(&self, op: &'static str, key: &str, ttl: Duration) {
        if let Err(err) = self.expire(key, ttl) {
            warn!(op, key, error = %err, "failed to set expiry after write");
        }
    }

    /// Removes one field. Returns true when it existed.
    pub fn hash_delete(&self, key: &str, field: &str) -> StoreResult<bool> {
        Ok(self.client.hdel(key.as_bytes(), field.as_bytes())?)
    }
}

impl StoreFacade {
    pub fn hash_get<V: DeserializeOwned>(&self, key: &str, field: &str) -> Option<V> {
        logged("hash_get", key, self.checked().hash_get(key, field)).flatten()
    }

    /// Every field of the hash; empty when missing or unreadable.
    pub fn hash_get_all<V: DeserializeOwned>(&self, key: &str) -> HashMap<String, V> {
        logged("hash_get_all", key, self.checked().hash_get_all(key)).unwrap_or_default()
    }

    pub fn hash_set_all<V: Serialize>(&self, key: &str, fields: &HashMap<String, V>) -> bool {
        logged("hash_set_all", key, self.checked().hash_set_all(key, fields)).is_some()
    }

    pub fn hash_set_all_with_ttl<V: Serialize>(
        &self,
        key: &str,
        fields: &HashMap<String, V>,
        ttl: Duration,
    ) -> bool {
        let result = self.checked().hash_set_all_with_ttl(key, fields, ttl);
        logged("hash_set_all_with_ttl", key, result).is_some()
    }

    pub fn hash_set<V: Serialize + ?Sized>(&self, key: &str, field: &str, value: &V) -> bool {
        logged("hash_set", key, self.checked().hash_set(key, field, value)).is_some()
    }

    pub fn hash_set_with_ttl<V: Serialize + ?Sized>(
        &self,
        key: &str,
        field: &str,
        value: &V,
        ttl: Duration,
    ) -> bool {
        let result = self.checked().hash_set_with_ttl(key, field, value, ttl);
        logged("hash_set_with_ttl", key, result).is_some()
    }

    /// Removes each field on its own; a failed field does not stop the rest.
    pub fn hash_delete(&self, key: &str, fields: &[&str]) {
        for field in fields {
            if let Err(err) = self.checked().hash_delete(key, field) {
                error!(op = "hash_delete", key, field, error = %err, "store operation failed");
            }
        }
    }
}
