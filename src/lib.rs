// src/lib.rs

pub mod config;
pub mod connection;
pub mod core;

// Re-export
pub use crate::config::{ConfigParams, StoreConfig};
pub use crate::connection::Openable;
pub use crate::core::{Cache, Lock, StoreCache, StoreError, StoreLock};
