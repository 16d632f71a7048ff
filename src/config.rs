//! TOML configuration for the operators and logging.
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "text"
//!
//! [fold]
//! key_field = "k"
//! value_field = "v"
//! map_field = "m"
//!
//! [unfold]
//! map_field = "m"
//! key_field = "key"
//! value_field = "value"
//! remove_map_field = true
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::step::{FoldConfig, UnfoldConfig};

/// Configuration loaded from a TOML file. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub fold: Option<FoldConfig>,
    pub unfold: Option<UnfoldConfig>,
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"info"` or `"rowmap=debug"`.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_timestamps")]
    pub timestamps: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_timestamps() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            timestamps: default_timestamps(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().display().to_string(), e))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}': {1}")]
    Io(String, #[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}
