//! Client configuration.
//!
//! [`ClientConfig`] carries what a backend builder needs to reach a server. It can be
//! deserialized from any serde source or read from `DOCSHIM_*` environment variables.

use serde::{Deserialize, Serialize};
use std::{env, time::Duration};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Default connection string.
pub const DEFAULT_URI: &str = "mongodb://localhost:27017";
/// Default database name.
pub const DEFAULT_DATABASE: &str = "docshim_demo";
/// URI scheme selecting the in-memory backend.
pub const MEMORY_SCHEME: &str = "memory://";

pub const ENV_URI: &str = "DOCSHIM_URI";
pub const ENV_DATABASE: &str = "DOCSHIM_DATABASE";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "DOCSHIM_CONNECT_TIMEOUT_MS";
pub const ENV_SERVER_SELECTION_TIMEOUT_MS: &str = "DOCSHIM_SERVER_SELECTION_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connection string. `memory://` selects the in-memory backend.
    pub uri: String,
    /// Database holding the collections.
    pub database: String,
    /// Timeout for establishing a connection, in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Timeout for selecting a server, in milliseconds.
    pub server_selection_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            connect_timeout_ms: None,
            server_selection_timeout_ms: None,
        }
    }
}

impl ClientConfig {
    /// Reads the configuration from the process environment, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `Initialization` when a timeout variable is not a non-negative integer.
    pub fn from_env() -> DocumentStoreResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DocumentStoreResult<Self> {
        let defaults = Self::default();

        let millis = |key: &str| -> DocumentStoreResult<Option<u64>> {
            lookup(key)
                .map(|raw| {
                    raw.trim().parse::<u64>().map_err(|err| {
                        DocumentStoreError::Initialization(format!("{key}={raw:?} is not a valid duration: {err}"))
                    })
                })
                .transpose()
        };

        Ok(Self {
            uri: lookup(ENV_URI).unwrap_or(defaults.uri),
            database: lookup(ENV_DATABASE).unwrap_or(defaults.database),
            connect_timeout_ms: millis(ENV_CONNECT_TIMEOUT_MS)?,
            server_selection_timeout_ms: millis(ENV_SERVER_SELECTION_TIMEOUT_MS)?,
        })
    }

    /// Returns `true` when the URI selects the in-memory backend.
    pub fn is_memory(&self) -> bool {
        self.uri.starts_with(MEMORY_SCHEME)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn server_selection_timeout(&self) -> Option<Duration> {
        self.server_selection_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        move |key| vars.get(key).cloned()
    }

    #[test]
    fn falls_back_to_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config, ClientConfig::default());
        assert!(!config.is_memory());
    }

    #[test]
    fn reads_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (ENV_URI, "memory://"),
            (ENV_DATABASE, "inventory"),
            (ENV_SERVER_SELECTION_TIMEOUT_MS, "1500"),
        ]))
        .unwrap();

        assert!(config.is_memory());
        assert_eq!(config.database, "inventory");
        assert_eq!(config.server_selection_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.connect_timeout(), None);
    }

    #[test]
    fn rejects_malformed_timeouts() {
        let result = ClientConfig::from_lookup(lookup_from(&[(ENV_CONNECT_TIMEOUT_MS, "soon")]));

        assert!(matches!(result, Err(DocumentStoreError::Initialization(_))));
    }

    #[test]
    fn deserializes_partial_json() {
        let config: ClientConfig = serde_json::from_str(r#"{ "database": "shop" }"#).unwrap();

        assert_eq!(config.uri, DEFAULT_URI);
        assert_eq!(config.database, "shop");
    }
}
