// src/core/cache/mod.rs

//! The expiring value cache.

mod store_cache;

pub use store_cache::StoreCache;

use crate::connection::Openable;
use crate::core::StoreError;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A cache of serialized values with a time-to-live.
///
/// Each operation maps to exactly one atomic store command; no client-side
/// read-modify-write is involved.
#[async_trait]
pub trait Cache: Openable {
    /// Returns the value under `key`, `None` if it is missing or expired, or
    /// `StoreError::Decode` if it does not deserialize into `T`.
    async fn retrieve<T>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send;

    /// Writes `value` under `key` for `ttl_ms` milliseconds, or the configured
    /// default TTL when `ttl_ms` is 0.
    ///
    /// Returns `Some(value)` when the write applied and `None` when the store
    /// reported that it did not. The `None` case is not an error.
    async fn store<T>(&self, key: &str, value: T, ttl_ms: u64) -> Result<Option<T>, StoreError>
    where
        T: Serialize + Send;

    /// Deletes `key`. Missing keys are not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}
