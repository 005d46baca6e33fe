// src/core/lock/mod.rs

//! The cross-process mutual-exclusion lock.
//!
//! A key is either free or held by exactly one token. Acquisition is a single
//! `SET key token PX ttl NX`, so two callers can never both see success.
//! Release is a single server-side compare-and-delete, so a holder whose TTL
//! lapsed cannot remove a lock that another instance has since acquired.

mod script;
mod store_lock;

pub use script::{RELEASE_SCRIPT, Script};
pub use store_lock::StoreLock;

use crate::connection::Openable;
use crate::core::StoreError;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::debug;

/// Pause between attempts in `acquire` when the implementation does not say otherwise.
pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_millis(100);

#[async_trait]
pub trait Lock: Openable {
    /// Makes a single attempt to take `key` for `ttl_ms` milliseconds and
    /// returns immediately. `true` means this instance now holds the lock.
    async fn try_acquire(&self, key: &str, ttl_ms: u64) -> Result<bool, StoreError>;

    /// Releases `key` if, and only if, it is still held by this instance.
    ///
    /// Returns `true` when a lock record was deleted. A `false` result (the key
    /// expired or belongs to another holder) leaves the store untouched and is
    /// not an error; callers that treat release as fire-and-forget may ignore it.
    async fn release(&self, key: &str) -> Result<bool, StoreError>;

    /// Pause between attempts in `acquire`.
    fn retry_timeout(&self) -> Duration {
        DEFAULT_RETRY_TIMEOUT
    }

    /// Retries `try_acquire` until it succeeds or `timeout_ms` elapses, then
    /// fails with `StoreError::LockTimeout`. A zero timeout makes one attempt.
    async fn acquire(&self, key: &str, ttl_ms: u64, timeout_ms: u64) -> Result<(), StoreError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let pause = self.retry_timeout();

        loop {
            if self.try_acquire(key, ttl_ms).await? {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(key, "Gave up waiting for lock.");
                return Err(StoreError::LockTimeout(key.to_string()));
            }
            tokio::time::sleep(pause.min(deadline - now)).await;
        }
    }
}
