// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Runtime configuration and its storage port.
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::attr::Attr;
use crate::memory_host::ROOT_LOCATION;

/// Store key under which [`RuntimeConfig`] is persisted.
pub const RUNTIME_CONFIG_KEY: &str = "runtime";

/// Tunables applied when a runtime is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Scenegraph root location. Host factories take their root when they are
    /// built (`MemoryHostFactory::with_root`); the runtime warns when the
    /// canonical host reports a different one.
    pub root_location_path: String,
    /// Options pushed into the canonical host (and inherited by replicas).
    pub host_options: Attr,
    /// Maximum events drained per replica by `Client::location_events`;
    /// `0` drains everything pending.
    pub event_drain_limit: usize,
    /// Whether traversals cook sibling locations in parallel.
    pub parallel_traversal: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            root_location_path: ROOT_LOCATION.to_owned(),
            host_options: Attr::Null,
            event_drain_limit: 0,
            parallel_traversal: true,
        }
    }
}

impl RuntimeConfig {
    /// Reads a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound)
            }
            Err(err) => return Err(ConfigError::Io(err)),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Loads the config stored under [`RUNTIME_CONFIG_KEY`], falling back to
    /// the defaults when nothing is stored.
    pub fn load<S: ConfigStore>(service: &ConfigService<S>) -> Result<Self, ConfigError> {
        Ok(service.load(RUNTIME_CONFIG_KEY)?.unwrap_or_default())
    }

    /// Effective event drain limit for a host call.
    #[must_use]
    pub fn drain_limit(&self) -> usize {
        if self.event_drain_limit == 0 {
            usize::MAX
        } else {
            self.event_drain_limit
        }
    }
}

/// Storage port for raw config blobs (keyed by logical name).
pub trait ConfigStore {
    /// Load a raw config blob. Returns `NotFound` when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw config blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Error type for config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in store.
    #[error("not found")]
    NotFound,
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

/// Serializes config values as JSON and delegates storage to a [`ConfigStore`].
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Create a new service using the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Consume the service and return the inner store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Load and deserialize a config value for `key`. Returns `Ok(None)` if missing.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        match self.store.load_raw(key) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serialize and persist a config value for `key`.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }
}

/// Stores configs as `<key>.json` files under a base directory.
pub struct FsConfigStore {
    base: PathBuf,
}

impl FsConfigStore {
    /// Store rooted at the user config directory (e.g. `~/.config/kodachi`).
    pub fn new() -> Result<Self, ConfigError> {
        let proj = ProjectDirs::from("dev", "flyingrobots", "Kodachi")
            .ok_or_else(|| ConfigError::Other("could not resolve config dir".into()))?;
        Self::at(proj.config_dir())
    }

    /// Store rooted at `base`, created if missing.
    pub fn at(base: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let base = base.into();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{key}.json"))
    }
}

impl ConfigStore for FsConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::NotFound),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }
}

/// Process-local [`ConfigStore`]; clones share the same blobs.
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryConfigStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or(ConfigError::NotFound)
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;

    #[test]
    fn missing_config_loads_defaults() {
        let service = ConfigService::new(InMemoryConfigStore::new());
        let config = RuntimeConfig::load(&service).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.drain_limit(), usize::MAX);
    }

    #[test]
    fn partial_documents_fill_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"event_drain_limit": 8, "host_options": {"threads": 4}}"#)
                .unwrap();
        assert_eq!(config.drain_limit(), 8);
        assert_eq!(config.root_location_path, "/root");
        assert!(config.parallel_traversal);
        assert_eq!(
            config.host_options.as_group().and_then(|g| g.get("threads")),
            Some(&Attr::Int(4))
        );
    }

    #[test]
    fn in_memory_store_round_trips_through_service() {
        let store = InMemoryConfigStore::new();
        let service = ConfigService::new(store.clone());
        let config = RuntimeConfig {
            parallel_traversal: false,
            ..RuntimeConfig::default()
        };
        service.save(RUNTIME_CONFIG_KEY, &config).unwrap();
        assert!(store.load_raw(RUNTIME_CONFIG_KEY).is_ok());
        assert_eq!(RuntimeConfig::load(&service).unwrap(), config);
    }
}
