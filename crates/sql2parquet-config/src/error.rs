//! Configuration errors

use thiserror::Error;

/// Missing or invalid configuration, detected before the run starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse {key}: {message}")]
    Env { key: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Result type alias for ConfigError
pub type Result<T> = std::result::Result<T, ConfigError>;
