// src/core/mod.rs

//! The cache and lock components, plus the error and wire types they share.

pub mod cache;
pub mod errors;
pub mod lock;
pub mod protocol;

pub use cache::{Cache, StoreCache};
pub use errors::StoreError;
pub use lock::{Lock, StoreLock};
pub use protocol::RespFrame;
