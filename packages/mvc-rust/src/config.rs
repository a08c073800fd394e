//! Application configuration and the merged `Config` service.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::container::ServiceManagerConfig;

/// Errors raised while loading or reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid application configuration")]
    Parse(#[from] serde_json::Error),
    #[error("invalid `{key}` configuration section")]
    Section {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// ApplicationConfig
// ---------------------------------------------------------------------------

/// Configuration handed to [`Application::init`](crate::Application::init).
///
/// Registered in the container under `ApplicationConfig`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Container configuration.
    pub service_manager: ServiceManagerConfig,
    /// Listener names attached on top of the defaults and the `Config` listeners.
    pub listeners: Vec<String>,
    /// Module names to load, in order.
    pub modules: Vec<String>,
    /// Merged over every module's configuration, last.
    pub extra_config: Map<String, Value>,
}

impl ApplicationConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed JSON or unexpected shapes.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if it is not valid configuration.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    #[must_use]
    pub fn with_service_manager(mut self, service_manager: ServiceManagerConfig) -> Self {
        self.service_manager = service_manager;
        self
    }

    #[must_use]
    pub fn with_listener(mut self, name: impl Into<String>) -> Self {
        self.listeners.push(name.into());
        self
    }

    #[must_use]
    pub fn with_module(mut self, name: impl Into<String>) -> Self {
        self.modules.push(name.into());
        self
    }

    #[must_use]
    pub fn with_extra_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_config.insert(key.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// MergedConfig
// ---------------------------------------------------------------------------

/// The `Config` service: module configuration merged with `extra_config`.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedConfig(Value);

impl MergedConfig {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Listener names declared under the top-level `listeners` key.
    /// Non-string entries are ignored.
    #[must_use]
    pub fn listeners(&self) -> Vec<String> {
        self.0
            .get("listeners")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Deserializes a top-level section, or returns `T::default()` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Section`] if the section has the wrong shape.
    pub fn section<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, ConfigError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(value) => T::deserialize(value).map_err(|source| ConfigError::Section {
                key: key.to_string(),
                source,
            }),
        }
    }
}

impl Default for MergedConfig {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

/// Merges `overlay` into `base`.
///
/// Objects merge key by key, arrays are appended, anything else in `overlay`
/// replaces the value in `base`.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(overlay)) => base.extend(overlay),
        (base, overlay) => *base = overlay,
    }
}
