// src/core/lock/store_lock.rs

use super::script::{RELEASE_SCRIPT, Script};
use super::Lock;
use crate::config::{ConfigParams, StoreConfig};
use crate::connection::{ConnectionManager, Openable, SetCondition};
use crate::core::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// A `Lock` whose records live in the shared store.
///
/// The token that proves ownership is generated once, when the instance is
/// built, and reused for every acquisition. Release compares against it, so
/// it must not change between an acquire and the matching release.
///
/// ```rust,ignore
/// let lock = StoreLock::new();
/// lock.configure(&ConfigParams::from_tuples([("connection.uri", "redis://localhost:6379")]))?;
/// lock.open().await?;
///
/// if lock.try_acquire("order-42", 5_000).await? {
///     // critical section
///     lock.release("order-42").await?;
/// }
/// ```
pub struct StoreLock {
    connection: ConnectionManager,
    token: String,
    release_script: Script,
}

impl Default for StoreLock {
    fn default() -> Self {
        Self::with_config(StoreConfig::default())
    }
}

impl StoreLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            connection: ConnectionManager::new(config),
            token: Uuid::new_v4().simple().to_string(),
            release_script: Script::new(RELEASE_SCRIPT),
        }
    }

    pub fn configure(&self, params: &ConfigParams) -> Result<(), StoreError> {
        self.connection.configure(params)
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// The value this instance writes into every lock record it holds.
    pub fn token(&self) -> &str {
        &self.token
    }
}

#[async_trait]
impl Openable for StoreLock {
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
impl Lock for StoreLock {
    async fn try_acquire(&self, key: &str, ttl_ms: u64) -> Result<bool, StoreError> {
        let client = self.connection.client()?;
        let acquired = client
            .set(
                key,
                Bytes::copy_from_slice(self.token.as_bytes()),
                Some(ttl_ms),
                SetCondition::IfNotExists,
            )
            .await?;
        debug!(key, ttl_ms, acquired, "Lock acquisition attempt.");
        Ok(acquired)
    }

    async fn release(&self, key: &str) -> Result<bool, StoreError> {
        let client = self.connection.client()?;
        let reply = client
            .eval_script(
                self.release_script.sha1(),
                self.release_script.source(),
                &[key],
                &[self.token.as_str()],
            )
            .await?;
        let released = reply.into_integer("release script")? > 0;
        if !released {
            debug!(key, "Release skipped: lock is not held by this instance.");
        }
        Ok(released)
    }

    fn retry_timeout(&self) -> Duration {
        self.connection.options().retry_timeout()
    }
}
