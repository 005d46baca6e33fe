// src/core/cache/store_cache.rs

use super::Cache;
use crate::config::{ConfigParams, StoreConfig};
use crate::connection::{ConnectionManager, Openable, SetCondition};
use crate::core::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// A `Cache` that keeps JSON-encoded values in the shared store.
///
/// A `store` with a zero TTL falls back to `options.default_ttl` (60 seconds
/// unless configured). `options.timeout` is not a cache TTL here: it is an
/// alias for `options.response_timeout`, the per-command reply deadline.
/// Configurations that used `options.timeout` as the default entry lifetime
/// must move that value to `options.default_ttl`.
///
/// ```rust,ignore
/// let cache = StoreCache::new();
/// cache.configure(&ConfigParams::from_tuples([
///     ("connection.host", "localhost"),
///     ("connection.port", "6379"),
/// ]))?;
/// cache.open().await?;
///
/// cache.store("user:1", &user, 60_000).await?;
/// let cached: Option<User> = cache.retrieve("user:1").await?;
/// ```
#[derive(Default)]
pub struct StoreCache {
    connection: ConnectionManager,
}

impl StoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            connection: ConnectionManager::new(config),
        }
    }

    pub fn configure(&self, params: &ConfigParams) -> Result<(), StoreError> {
        self.connection.configure(params)
    }

    /// Access to discovery / credential references and the resolved config.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    fn effective_ttl(&self, ttl_ms: u64) -> u64 {
        if ttl_ms > 0 {
            ttl_ms
        } else {
            self.connection.options().default_ttl_ms
        }
    }
}

#[async_trait]
impl Openable for StoreCache {
    fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    async fn open(&self) -> Result<(), StoreError> {
        self.connection.open().await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.connection.close().await
    }
}

#[async_trait]
impl Cache for StoreCache {
    async fn retrieve<T>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        let client = self.connection.client()?;
        let Some(raw) = client.get(key).await? else {
            debug!(key, "Cache miss.");
            return Ok(None);
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| StoreError::Decode(format!("value under '{key}': {e}")))
    }

    async fn store<T>(&self, key: &str, value: T, ttl_ms: u64) -> Result<Option<T>, StoreError>
    where
        T: Serialize + Send,
    {
        let client = self.connection.client()?;
        let payload = serde_json::to_vec(&value)
            .map_err(|e| StoreError::Encode(format!("value for '{key}': {e}")))?;
        let ttl = self.effective_ttl(ttl_ms);

        if client
            .set(key, Bytes::from(payload), Some(ttl), SetCondition::Always)
            .await?
        {
            Ok(Some(value))
        } else {
            warn!(key, "Store did not apply cache write.");
            Ok(None)
        }
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let client = self.connection.client()?;
        client.del(key).await?;
        Ok(())
    }
}
