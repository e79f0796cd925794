//! Distributed locks.

use std::time::Duration;

use keyline_client::ClientError;
use tracing::error;

use crate::{logged, Checked, LockInterrupted, StoreError, StoreFacade, StoreResult};

impl Checked<'_> {
    /// Tries to acquire the lock on `key` for the calling thread, waiting up
    /// to `wait`. A zero `lease` uses the client's default lease.
    pub fn try_lock(&self, key: &str, wait: Duration, lease: Duration) -> StoreResult<bool> {
        Ok(self.client.try_lock(key.as_bytes(), wait, lease)?)
    }

    pub fn unlock(&self, key: &str) -> StoreResult<()> {
        Ok(self.client.unlock(key.as_bytes())?)
    }
}

impl StoreFacade {
    /// Tries to acquire the lock on `key`, blocking the calling thread up to
    /// `wait`. Store failures count as not acquired.
    ///
    /// # Errors
    /// Returns [`LockInterrupted`] when the client shuts down while waiting.
    pub fn try_lock(&self, key: &str, wait: Duration, lease: Duration) -> Result<bool, LockInterrupted> {
        match self.checked().try_lock(key, wait, lease) {
            Ok(acquired) => Ok(acquired),
            Err(StoreError::Client(ClientError::Interrupted)) => Err(LockInterrupted),
            Err(err) => {
                error!(op = "try_lock", key, error = %err, "store operation failed");
                Ok(false)
            }
        }
    }

    /// Releases the lock on `key`. Not holding it is logged, never surfaced.
    pub fn unlock(&self, key: &str) {
        logged("unlock", key, self.checked().unlock(key));
    }
}
