use crate::error::StoreError;
use async_trait::async_trait;
use std::time::Duration;

/// Key/value cache with per-key expiry, used as a secondary token index.
#[async_trait]
pub trait FastCache: Send + Sync {
    /// Returns the value stored under `key`, if present and not expired.
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, StoreError>;

    /// Stores `value` under `key` for `ttl`.
    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> std::result::Result<(), StoreError>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> std::result::Result<(), StoreError>;
}

/// No-op cache implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl FastCache for NoCache {
    async fn get(&self, _key: &str) -> std::result::Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &str,
        _value: String,
        _ttl: Duration,
    ) -> std::result::Result<(), StoreError> {
        Ok(())
    }

    async fn remove(&self, _key: &str) -> std::result::Result<(), StoreError> {
        Ok(())
    }
}
