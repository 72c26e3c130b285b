pub mod tracing;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::env;
use std::path::Path;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration section '{0}' is missing")]
    MissingSection(String),

    #[error("Failed to unmarshal configuration section '{key}': {details}")]
    ParseError { key: String, details: String },

    #[error("Failed to read configuration file '{path}': {details}")]
    Read { path: String, details: String },
}

/// Application environment (dev = local/kind, prod = full k8s)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        if app_env.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Read access to named configuration sections.
///
/// Section names are dotted paths (`jobs.pipelines.emails`). Drivers only ever
/// check for a section and unmarshal it into their own struct.
pub trait Configurer: Send + Sync {
    /// Checks if the config section exists.
    fn has(&self, name: &str) -> bool;

    /// Unmarshals a single section into `T`.
    fn unmarshal_key<T: DeserializeOwned>(&self, name: &str) -> Result<T, ConfigError>;
}

/// In-memory configuration backed by a JSON value tree.
#[derive(Clone, Debug, Default)]
pub struct ConfigTree {
    root: Value,
}

impl ConfigTree {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let root = serde_json::from_str(raw).map_err(|e| ConfigError::ParseError {
            key: "<root>".to_string(),
            details: e.to_string(),
        })?;

        Ok(Self::new(root))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;

        Self::from_json_str(&raw)
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        name.split('.')
            .try_fold(&self.root, |node, key| node.get(key))
            .filter(|node| !node.is_null())
    }
}

impl Configurer for ConfigTree {
    fn has(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    fn unmarshal_key<T: DeserializeOwned>(&self, name: &str) -> Result<T, ConfigError> {
        let section = self
            .lookup(name)
            .ok_or_else(|| ConfigError::MissingSection(name.to_string()))?;

        T::deserialize(section).map_err(|e| ConfigError::ParseError {
            key: name.to_string(),
            details: e.to_string(),
        })
    }
}
