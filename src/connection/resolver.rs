// src/connection/resolver.rs

//! Turns configured connection and credential parameters into a concrete endpoint.
//!
//! Parameters may come inline from configuration or, when a `discovery_key` /
//! `store_key` is set and a matching reference is attached, from a discovery
//! service or credential store.

use crate::config::{ConnectionSection, CredentialSection, DEFAULT_HOST, DEFAULT_PORT};
use crate::core::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use tracing::{debug, warn};
use url::Url;

/// Resolves a discovery key into connection parameters.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn resolve(&self, key: &str) -> Result<Option<ConnectionSection>, StoreError>;
}

/// Looks up credentials by key.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn lookup(&self, key: &str) -> Result<Option<CredentialSection>, StoreError>;
}

/// A `Discovery` backed by an in-process map.
#[derive(Debug, Default)]
pub struct MemoryDiscovery {
    entries: DashMap<String, ConnectionSection>,
}

impl MemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: impl Into<String>, connection: ConnectionSection) {
        self.entries.insert(key.into(), connection);
    }
}

#[async_trait]
impl Discovery for MemoryDiscovery {
    async fn resolve(&self, key: &str) -> Result<Option<ConnectionSection>, StoreError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }
}

/// A `CredentialStore` backed by an in-process map.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: DashMap<String, CredentialSection>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: impl Into<String>, credential: CredentialSection) {
        self.entries.insert(key.into(), credential);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn lookup(&self, key: &str) -> Result<Option<CredentialSection>, StoreError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }
}

/// A fully resolved store address plus what the URI carried.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: Option<u32>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Picks the connection parameters to use: discovered ones when available,
/// otherwise the inline section. Fails when nothing at all is configured.
pub async fn resolve_connection(
    inline: &ConnectionSection,
    discovery: Option<&dyn Discovery>,
) -> Result<ConnectionSection, StoreError> {
    if let Some(key) = inline.discovery_key.as_deref()
        && let Some(discovery) = discovery
    {
        if let Some(found) = discovery.resolve(key).await? {
            debug!(discovery_key = key, "Resolved connection through discovery.");
            return Ok(found);
        }
        warn!(
            discovery_key = key,
            "Discovery key not found; falling back to inline connection parameters."
        );
    }

    if inline.is_empty() {
        return Err(StoreError::Configuration(
            "Connection is not configured".to_string(),
        ));
    }
    Ok(inline.clone())
}

/// Picks the credential to use: the stored one when `store_key` resolves,
/// otherwise the inline section.
pub async fn resolve_credential(
    inline: &CredentialSection,
    store: Option<&dyn CredentialStore>,
) -> Result<CredentialSection, StoreError> {
    if let Some(key) = inline.store_key.as_deref()
        && let Some(store) = store
    {
        if let Some(found) = store.lookup(key).await? {
            return Ok(found);
        }
        warn!(store_key = key, "Credential key not found; using inline credential.");
    }
    Ok(inline.clone())
}

/// Computes the endpoint for a connection section. A non-empty URI takes
/// precedence over host and port.
pub fn resolve_endpoint(connection: &ConnectionSection) -> Result<Endpoint, StoreError> {
    if let Some(uri) = connection.uri.as_deref().filter(|u| !u.trim().is_empty()) {
        return parse_uri(uri.trim());
    }

    Ok(Endpoint {
        host: connection
            .host
            .clone()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: connection
            .port
            .filter(|p| *p != 0)
            .unwrap_or(DEFAULT_PORT),
        password: None,
        database: None,
    })
}

/// Parses `redis://[user][:password@]host[:port][/db]`. A bare `host[:port]`
/// is accepted as well.
pub fn parse_uri(uri: &str) -> Result<Endpoint, StoreError> {
    if !uri.contains("://") {
        return parse_host_port(uri);
    }

    let url = Url::parse(uri)?;
    match url.scheme() {
        "redis" | "spineldb" => {}
        "rediss" => {
            return Err(StoreError::Configuration(
                "TLS connections (rediss://) are not supported".to_string(),
            ));
        }
        other => {
            return Err(StoreError::Configuration(format!(
                "unsupported connection URI scheme '{other}'"
            )));
        }
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .unwrap_or(DEFAULT_HOST)
        .to_string();

    let password = match url.password() {
        Some(raw) => Some(
            urlencoding::decode(raw)
                .map_err(|e| {
                    StoreError::Configuration(format!("invalid password encoding in URI: {e}"))
                })?
                .into_owned(),
        ),
        None => None,
    };

    let database = match url.path().trim_start_matches('/') {
        "" => None,
        db => Some(db.parse::<u32>().map_err(|_| {
            StoreError::Configuration(format!("invalid database index '{db}' in URI"))
        })?),
    };

    Ok(Endpoint {
        host,
        port: url.port().unwrap_or(DEFAULT_PORT),
        password,
        database,
    })
}

fn parse_host_port(s: &str) -> Result<Endpoint, StoreError> {
    let (host, port) = match s.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                StoreError::Configuration(format!("invalid port in connection URI '{s}'"))
            })?;
            (host, port)
        }
        None => (s, DEFAULT_PORT),
    };
    Ok(Endpoint {
        host: if host.is_empty() { DEFAULT_HOST } else { host }.to_string(),
        port: if port == 0 { DEFAULT_PORT } else { port },
        password: None,
        database: None,
    })
}
