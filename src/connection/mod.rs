// src/connection/mod.rs

//! Connection management shared by the cache and the lock: resolving where the
//! store lives, opening a session to it, and guarding operations on that session.

mod client;
mod manager;
pub mod resolver;

pub use client::{ClientSettings, SetCondition, StoreClient};
pub use manager::ConnectionManager;
pub use resolver::{
    CredentialStore, Discovery, Endpoint, MemoryCredentialStore, MemoryDiscovery,
};

use crate::core::StoreError;
use async_trait::async_trait;

/// Lifecycle of a component that holds a store session.
#[async_trait]
pub trait Openable: Send + Sync {
    fn is_open(&self) -> bool;

    async fn open(&self) -> Result<(), StoreError>;

    /// Idempotent.
    async fn close(&self) -> Result<(), StoreError>;
}
