//! Runtime configuration
//!
//! A runtime can be configured programmatically through
//! [`RuntimeBuilder`](crate::RuntimeBuilder) or from a TOML file:
//!
//! ```toml
//! log_level = "debug"
//! monitor = "tracing"
//!
//! [context]
//! api_url = "http://localhost"
//! retries = 3
//! ```
//!
//! # Usage
//!
//! ```rust
//! use sagaflow::util::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_toml_str("monitor = \"tracing\"").unwrap();
//! assert!(config.context.is_empty());
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::value::Value;
use crate::util::logger::{self, LogLevel};

/// Which monitor the runtime installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorKind {
    #[default]
    None,
    /// [`TracingMonitor`](crate::runtime::env::TracingMonitor)
    Tracing,
}

/// Scalar accepted in the `[context]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<ContextValue> for Value {
    fn from(value: ContextValue) -> Self {
        match value {
            ContextValue::Bool(b) => Value::Bool(b),
            ContextValue::Int(i) => Value::Int(i),
            ContextValue::Float(f) => Value::Float(f),
            ContextValue::Str(s) => Value::Str(s),
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Level used by [`RuntimeConfig::init_logging`]
    #[serde(default)]
    pub log_level: LogLevel,
    /// Monitor installed on the runtime
    #[serde(default)]
    pub monitor: MonitorKind,
    /// Initial root context
    #[serde(default)]
    pub context: BTreeMap<String, ContextValue>,
}

impl RuntimeConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::ParseError)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(ConfigError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Load from `path`, or return the default config if it doesn't exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if !path.as_ref().exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Write as TOML.
    pub fn save(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::SerializeError)?;
        fs::write(path.as_ref(), content).map_err(ConfigError::IoError)?;
        Ok(())
    }

    /// Initial context entries as runtime values.
    pub fn context_values(&self) -> Vec<(String, Value)> {
        self.context
            .iter()
            .map(|(key, value)| (key.clone(), value.clone().into()))
            .collect()
    }

    /// Install the global logger at the configured level.
    pub fn init_logging(&self) -> bool {
        logger::init_with_level(self.log_level)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests;
