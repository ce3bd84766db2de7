//! Configuration management for Bulwark
//!
//! A [`ConfigManager`] is an explicit value handed to whatever needs
//! settings; nothing is read from process-wide state after loading.
//!
//! Sources, later loads overriding earlier ones:
//!
//! - environment variables (optionally filtered by prefix)
//! - `.env` files (parsed without touching the process environment)
//! - JSON / TOML files, flattened to `section_key` names
//!
//! ```
//! use bulwark_config::ConfigManager;
//!
//! let config = ConfigManager::new();
//! config.set("ratelimit_limit", "120").unwrap();
//!
//! let limit: u64 = config.get_parsed("ratelimit_limit").unwrap();
//! assert_eq!(limit, 120);
//! ```

pub mod env;
pub mod error;
pub mod loader;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Main configuration manager
#[derive(Clone, Default)]
pub struct ConfigManager {
    config: Arc<RwLock<HashMap<String, Value>>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with environment variable prefix (e.g. `BULWARK`)
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            config: Arc::default(),
            env_prefix: Some(prefix.into()),
        }
    }

    fn env_loader(&self) -> EnvLoader {
        EnvLoader::new(self.env_prefix.clone())
    }

    /// Load configuration from environment variables
    pub fn load_env(&self) -> Result<()> {
        let vars = self.env_loader().load()?;
        debug!(count = vars.len(), "Loaded configuration from environment");
        self.insert_strings(vars);
        Ok(())
    }

    /// Load a `.env` file. The prefix applies the same way as for the
    /// environment.
    pub fn load_dotenv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let iter = dotenvy::from_path_iter(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;

        let mut pairs = Vec::new();
        for item in iter {
            pairs.push(item.map_err(|e| ConfigError::ParseError(e.to_string()))?);
        }

        let vars = self.env_loader().collect(pairs);
        debug!(path = %path.display(), count = vars.len(), "Loaded .env file");
        self.insert_strings(vars);
        Ok(())
    }

    /// Load a JSON, TOML or `.env` file, detecting the format from its name
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let loader = ConfigLoader::auto(path)?;
        if loader.format() == FileFormat::Env {
            return self.load_dotenv(path);
        }

        let data = loader.load_file(path)?;
        debug!(path = %path.display(), count = data.len(), "Loaded configuration file");

        let mut config = self.config.write();
        config.extend(data);
        Ok(())
    }

    fn insert_strings(&self, vars: HashMap<String, String>) {
        let mut config = self.config.write();
        for (key, value) in vars {
            config.insert(key, Value::String(value));
        }
    }

    /// Set a configuration value
    pub fn set<T: serde::Serialize>(&self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;

        self.config.write().insert(key.to_string(), json_value);
        Ok(())
    }

    /// Get a configuration value, deserializing the stored JSON value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let config = self.config.read();

        let value = config
            .get(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Get a configuration value with default
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Get a value through `FromStr`, accepting both native JSON values and
    /// strings (environment values always arrive as strings).
    pub fn get_parsed<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = {
            let config = self.config.read();
            match config.get(key) {
                Some(Value::String(s)) => s.trim().to_string(),
                Some(Value::Null) | None => return Err(ConfigError::KeyNotFound(key.to_string())),
                Some(other) => other.to_string(),
            }
        };

        raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{:?}: {}", raw, e),
        })
    }

    /// Like [`get_parsed`](Self::get_parsed) but a missing key yields `None`
    /// while an unparsable value is still an error.
    pub fn get_parsed_opt<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_parsed(key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Get a boolean, accepting `1/0`, `true/false`, `yes/no`, `on/off`
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        let raw: String = self.get_parsed(key)?;
        match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{:?} is not a boolean", raw),
            }),
        }
    }

    /// Get a string value
    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get_parsed(key)
    }

    /// Check if a key exists
    pub fn has(&self, key: &str) -> bool {
        self.config.read().contains_key(key)
    }

    /// Get all configuration keys
    pub fn keys(&self) -> Vec<String> {
        self.config.read().keys().cloned().collect()
    }

    /// Merge configuration from another manager; its values win
    pub fn merge(&self, other: &ConfigManager) {
        // Only one lock is held at a time
        let entries: Vec<(String, Value)> = other
            .config
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        self.config.write().extend(entries);
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("env_prefix", &self.env_prefix)
            .field("keys", &self.config.read().len())
            .finish()
    }
}
