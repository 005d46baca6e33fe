// src/connection/manager.rs

//! Owns the configuration and the single session of one cache or lock component.

use super::client::{ClientSettings, StoreClient};
use super::resolver::{self, CredentialStore, Discovery};
use crate::config::{ConfigParams, OptionsSection, StoreConfig};
use crate::core::StoreError;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Resolves configuration into a session, and guards data operations on it.
///
/// `open` and `close` are serialized against each other; data operations only
/// take a cheap read lock to clone the session handle.
pub struct ConnectionManager {
    config: RwLock<StoreConfig>,
    discovery: RwLock<Option<Arc<dyn Discovery>>>,
    credential_store: RwLock<Option<Arc<dyn CredentialStore>>>,
    client: RwLock<Option<Arc<StoreClient>>>,
    lifecycle: Mutex<()>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl ConnectionManager {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config: RwLock::new(config),
            discovery: RwLock::new(None),
            credential_store: RwLock::new(None),
            client: RwLock::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    /// Replaces the configuration from a parameter bag. Takes effect on the next `open`.
    pub fn configure(&self, params: &ConfigParams) -> Result<(), StoreError> {
        let config = StoreConfig::from_params(params)?;
        *self.config.write() = config;
        Ok(())
    }

    pub fn set_config(&self, config: StoreConfig) {
        *self.config.write() = config;
    }

    pub fn config(&self) -> StoreConfig {
        self.config.read().clone()
    }

    pub fn options(&self) -> OptionsSection {
        self.config.read().options
    }

    pub fn set_discovery(&self, discovery: Arc<dyn Discovery>) {
        *self.discovery.write() = Some(discovery);
    }

    pub fn set_credential_store(&self, store: Arc<dyn CredentialStore>) {
        *self.credential_store.write() = Some(store);
    }

    pub fn is_open(&self) -> bool {
        self.client.read().is_some()
    }

    /// Resolves endpoint, credentials and options into session settings.
    pub async fn resolve_settings(&self) -> Result<ClientSettings, StoreError> {
        let config = self.config();
        let discovery = self.discovery.read().clone();
        let credential_store = self.credential_store.read().clone();

        let connection =
            resolver::resolve_connection(&config.connection, discovery.as_deref()).await?;
        let credential =
            resolver::resolve_credential(&config.credential, credential_store.as_deref()).await?;
        let endpoint = resolver::resolve_endpoint(&connection)?;

        // An explicit credential wins over a password embedded in the URI.
        let password = credential
            .password
            .filter(|p| !p.is_empty())
            .or(endpoint.password);

        Ok(ClientSettings {
            host: endpoint.host,
            port: endpoint.port,
            password,
            database: endpoint.database,
            connect_timeout: config.options.connect_timeout(),
            response_timeout: config.options.response_timeout(),
            retries: config.options.retries,
        })
    }

    /// Opens the session. Opening an already open manager is a no-op.
    pub async fn open(&self) -> Result<(), StoreError> {
        let _guard = self.lifecycle.lock().await;
        if self.is_open() {
            debug!("Connection already open.");
            return Ok(());
        }

        let settings = self.resolve_settings().await?;
        let client = StoreClient::connect(&settings).await?;
        info!(
            "Connected to store at {} (database {}).",
            client.endpoint(),
            settings.database.unwrap_or(0)
        );
        *self.client.write() = Some(Arc::new(client));
        Ok(())
    }

    /// Closes the session. Closing an already closed manager is a no-op.
    pub async fn close(&self) -> Result<(), StoreError> {
        let _guard = self.lifecycle.lock().await;
        let taken = self.client.write().take();
        let Some(client) = taken else {
            return Ok(());
        };

        // The handle is already detached; a failed shutdown only means the peer went first.
        if let Err(e) = client.shutdown().await {
            warn!("Error while closing connection to {}: {}", client.endpoint(), e);
        }
        info!("Closed connection to store at {}.", client.endpoint());
        Ok(())
    }

    /// Returns the open session, or `NotOpen`.
    pub fn client(&self) -> Result<Arc<StoreClient>, StoreError> {
        self.client.read().clone().ok_or(StoreError::NotOpen)
    }
}
