//! List keys.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{logged, Checked, StoreError, StoreFacade, StoreResult};

impl Checked<'_> {
    /// Elements from `start` to `end`, both inclusive, checked against the
    /// list's current length.
    ///
    /// # Errors
    /// `StoreError::Range` when `start` is negative, `end + 1` passes the
    /// length, or `start` passes `end + 1`. `start == end + 1` is an empty range.
    pub fn list_range<V: DeserializeOwned>(&self, key: &str, start: i64, end: i64) -> StoreResult<Vec<V>> {
        let len = self.client.llen(key.as_bytes())?;
        let stop = end.saturating_add(1);
        if start < 0 || stop < start || stop > len as i64 {
            return Err(StoreError::Range { start, end, len });
        }
        if start == stop {
            return Ok(Vec::new());
        }
        let items = self.client.lrange(key.as_bytes(), start, end)?;
        self.decode_all(items)
    }

    /// Appends `values` and returns the new length. Empty input sends nothing.
    pub fn list_append<V: Serialize>(&self, key: &str, values: &[V]) -> StoreResult<u64> {
        let encoded = self.encode_all(values)?;
        let items: Vec<&[u8]> = encoded.iter().map(Vec::as_slice).collect();
        Ok(self.client.rpush(key.as_bytes(), &items)?)
    }
}

impl StoreFacade {
    /// Inclusive range of the list, or `None` when the range is out of bounds
    /// or the store cannot be read.
    pub fn list_range<V: DeserializeOwned>(&self, key: &str, start: i64, end: i64) -> Option<Vec<V>> {
        logged("list_range", key, self.checked().list_range(key, start, end))
    }

    pub fn list_append<V: Serialize>(&self, key: &str, values: &[V]) -> bool {
        logged("list_append", key, self.checked().list_append(key, values)).is_some()
    }
}
