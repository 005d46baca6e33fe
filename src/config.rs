// src/config.rs

//! Component configuration: a flat key/value bag and its resolved, typed view.
//!
//! Components accept settings the way callers usually hold them, as dotted keys
//! (`connection.host`, `credential.password`, `options.retries`, ...). Unknown
//! keys are ignored. `StoreConfig` is the typed view built from those keys.

use crate::core::StoreError;
use config::{Environment, File, FileFormat, Value};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6379;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_RETRY_TIMEOUT_MS: u64 = 100;
const DEFAULT_TTL_MS: u64 = 60_000;

/// Prefix for environment overrides, e.g. `SPINELKV_CONNECTION__HOST`.
const ENV_PREFIX: &str = "SPINELKV";

/// A flat, case-insensitive map of configuration keys to string values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigParams(BTreeMap<String, String>);

impl ConfigParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bag from `(key, value)` pairs.
    pub fn from_tuples<K, V, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        V: ToString,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.set(key.as_ref(), value.to_string());
        }
        params
    }

    /// Flattens a loaded `config::Config` tree into dotted keys.
    pub fn from_config(cfg: &config::Config) -> Result<Self, StoreError> {
        let root: BTreeMap<String, Value> = cfg.clone().try_deserialize()?;
        let mut params = Self::new();
        for (key, value) in root {
            flatten_into(&mut params, key, value);
        }
        Ok(params)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// Returns the first non-empty value among `keys`.
    pub fn get_first(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.get(k))
            .find(|v| !v.trim().is_empty())
    }

    /// Reads an unsigned integer, falling back to `default` when missing or unparsable.
    pub fn get_as_u64_or(&self, keys: &[&str], default: u64) -> u64 {
        self.get_first(keys)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn flatten_into(params: &mut ConfigParams, prefix: String, value: Value) {
    match value.clone().into_table() {
        Ok(table) => {
            for (key, child) in table {
                flatten_into(params, format!("{prefix}.{key}"), child);
            }
        }
        Err(_) => {
            // Scalars only; arrays have no meaning for these components.
            if let Ok(s) = value.into_string() {
                params.set(&prefix, s);
            }
        }
    }
}

/// Where to find the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectionSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub uri: Option<String>,
    pub discovery_key: Option<String>,
}

impl ConnectionSection {
    /// True when no connection parameter at all has been supplied.
    pub fn is_empty(&self) -> bool {
        self.host.is_none() && self.port.is_none() && self.uri.is_none()
    }
}

/// Credentials for the store. Only the password is sent; the username is kept
/// for completeness but unused by the handshake.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CredentialSection {
    pub store_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for CredentialSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSection")
            .field("store_key", &self.store_key)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Timeouts and retry counts, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionsSection {
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: u64,
    pub retries: u32,
    /// Pause between attempts of a blocking lock acquire.
    pub retry_timeout_ms: u64,
    /// Cache TTL used when `store` is called with a zero TTL.
    pub default_ttl_ms: u64,
}

impl Default for OptionsSection {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
            retry_timeout_ms: DEFAULT_RETRY_TIMEOUT_MS,
            default_ttl_ms: DEFAULT_TTL_MS,
        }
    }
}

impl OptionsSection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_millis(self.retry_timeout_ms)
    }
}

/// The resolved configuration of a cache or lock component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    pub connection: ConnectionSection,
    pub credential: CredentialSection,
    pub options: OptionsSection,
}

impl StoreConfig {
    /// Builds the typed configuration from a parameter bag.
    ///
    /// Section prefixes are optional (`host` is accepted for `connection.host`),
    /// and a non-numeric port is the only value rejected outright. A port of `0`
    /// means "use the default".
    pub fn from_params(params: &ConfigParams) -> Result<Self, StoreError> {
        let text = |keys: &[&str]| params.get_first(keys).map(str::to_string);

        let port = match params.get_first(&["connection.port", "port"]) {
            Some(raw) => {
                let port = raw.trim().parse::<u16>().map_err(|_| {
                    StoreError::Configuration(format!("invalid connection port '{raw}'"))
                })?;
                Some(port)
            }
            None => None,
        };

        let connection = ConnectionSection {
            host: text(&["connection.host", "host"]),
            port,
            uri: text(&["connection.uri", "uri"]),
            discovery_key: text(&["connection.discovery_key", "discovery_key"]),
        };

        let credential = CredentialSection {
            store_key: text(&["credential.store_key", "store_key"]),
            username: text(&["credential.username", "username"]),
            password: text(&["credential.password", "password"]),
        };

        let defaults = OptionsSection::default();
        let options = OptionsSection {
            connect_timeout_ms: params
                .get_as_u64_or(&["options.connect_timeout"], defaults.connect_timeout_ms),
            response_timeout_ms: params.get_as_u64_or(
                &["options.response_timeout", "options.timeout"],
                defaults.response_timeout_ms,
            ),
            retries: u32::try_from(
                params.get_as_u64_or(&["options.retries"], u64::from(defaults.retries)),
            )
            .unwrap_or(u32::MAX),
            retry_timeout_ms: params
                .get_as_u64_or(&["options.retry_timeout"], defaults.retry_timeout_ms),
            default_ttl_ms: params.get_as_u64_or(&["options.default_ttl"], defaults.default_ttl_ms),
        };

        Ok(Self {
            connection,
            credential,
            options,
        })
    }

    /// Loads a TOML file and overlays `SPINELKV_*` environment variables.
    pub fn from_file(path: &str) -> Result<Self, StoreError> {
        let cfg = config::Config::builder()
            .add_source(File::new(path, FileFormat::Toml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        Self::from_params(&ConfigParams::from_config(&cfg)?)
    }

    /// Parses TOML text without consulting the environment.
    pub fn from_toml_str(contents: &str) -> Result<Self, StoreError> {
        let cfg = config::Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?;
        Self::from_params(&ConfigParams::from_config(&cfg)?)
    }
}
