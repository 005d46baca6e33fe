// src/core/errors.rs

//! Defines the error type shared by the connection layer, the cache and the lock.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Every failure a cache or lock operation can surface to its caller.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The connection target or credentials could not be resolved.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A data operation was attempted before `open()` or after `close()`.
    #[error("Connection is not opened")]
    NotOpen,

    /// Network failure talking to the store, including connect and response timeouts.
    #[error("Transport error: {0}")]
    Transport(Arc<io::Error>),

    /// Stored bytes could not be deserialized into the requested type.
    #[error("Failed to decode stored value: {0}")]
    Decode(String),

    /// A value could not be serialized before being written.
    #[error("Failed to encode value: {0}")]
    Encode(String),

    /// The peer sent bytes that are not valid RESP, or a reply of the wrong shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The store answered with an error reply (e.g. `WRONGPASS`, `NOSCRIPT`).
    #[error("Store replied with error: {0}")]
    Server(String),

    /// A blocking acquire did not obtain the lock before its timeout.
    #[error("Timed out waiting for lock '{0}'")]
    LockTimeout(String),

    /// Internal decoder signal: the buffer does not yet hold a full frame.
    #[error("Incomplete data in stream")]
    IncompleteData,
}

impl StoreError {
    /// Builds a `Transport` error from an I/O error kind and message.
    pub fn transport(kind: io::ErrorKind, msg: impl Into<String>) -> Self {
        StoreError::Transport(Arc::new(io::Error::new(kind, msg.into())))
    }

    /// Returns the I/O error kind for transport failures.
    pub fn transport_kind(&self) -> Option<io::ErrorKind> {
        match self {
            StoreError::Transport(e) => Some(e.kind()),
            _ => None,
        }
    }
}

// `std::io::Error` is not cloneable, so the transport variant shares it through an Arc.
impl Clone for StoreError {
    fn clone(&self) -> Self {
        match self {
            StoreError::Configuration(s) => StoreError::Configuration(s.clone()),
            StoreError::NotOpen => StoreError::NotOpen,
            StoreError::Transport(e) => StoreError::Transport(Arc::clone(e)),
            StoreError::Decode(s) => StoreError::Decode(s.clone()),
            StoreError::Encode(s) => StoreError::Encode(s.clone()),
            StoreError::Protocol(s) => StoreError::Protocol(s.clone()),
            StoreError::Server(s) => StoreError::Server(s.clone()),
            StoreError::LockTimeout(s) => StoreError::LockTimeout(s.clone()),
            StoreError::IncompleteData => StoreError::IncompleteData,
        }
    }
}

impl PartialEq for StoreError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StoreError::Configuration(a), StoreError::Configuration(b)) => a == b,
            (StoreError::Transport(a), StoreError::Transport(b)) => {
                a.kind() == b.kind() && a.to_string() == b.to_string()
            }
            (StoreError::Decode(a), StoreError::Decode(b)) => a == b,
            (StoreError::Encode(a), StoreError::Encode(b)) => a == b,
            (StoreError::Protocol(a), StoreError::Protocol(b)) => a == b,
            (StoreError::Server(a), StoreError::Server(b)) => a == b,
            (StoreError::LockTimeout(a), StoreError::LockTimeout(b)) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Transport(Arc::new(e))
    }
}

impl From<url::ParseError> for StoreError {
    fn from(e: url::ParseError) -> Self {
        StoreError::Configuration(format!("invalid connection URI: {e}"))
    }
}

impl From<config::ConfigError> for StoreError {
    fn from(e: config::ConfigError) -> Self {
        StoreError::Configuration(e.to_string())
    }
}
