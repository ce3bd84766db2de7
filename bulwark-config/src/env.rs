// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;

/// Environment variable loader
///
/// With a prefix such as `BULWARK`, `BULWARK_RATELIMIT_LIMIT` is exposed as
/// `ratelimit_limit`; variables without the prefix are ignored.
#[derive(Debug, Clone, Default)]
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Map a raw variable name to a configuration key, or `None` when it does
    /// not carry the prefix.
    pub fn normalize_key(&self, key: &str) -> Option<String> {
        match &self.prefix {
            Some(prefix) => {
                let rest = key.strip_prefix(prefix.as_str())?;
                let rest = rest.strip_prefix('_')?;
                if rest.is_empty() {
                    None
                } else {
                    Some(rest.to_lowercase())
                }
            }
            None => Some(key.to_lowercase()),
        }
    }

    /// Normalize an iterator of `(name, value)` pairs
    pub fn collect<I>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter_map(|(key, value)| self.normalize_key(&key).map(|k| (k, value)))
            .collect()
    }

    /// Load all matching process environment variables
    pub fn load(&self) -> Result<HashMap<String, String>> {
        Ok(self.collect(env::vars()))
    }

    /// Load a specific environment variable
    pub fn load_var(&self, key: &str) -> Result<String> {
        let full_key = match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        };

        env::var(&full_key).map_err(ConfigError::EnvError)
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}
