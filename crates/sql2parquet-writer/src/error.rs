//! Error types for blob sinks

use thiserror::Error;

/// Errors raised while building a storage operator or writing an object
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to create {backend} operator: {source}")]
    Operator {
        backend: &'static str,
        #[source]
        source: opendal::Error,
    },

    #[error("failed to write '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: opendal::Error,
    },

    #[error("circuit breaker open after {failures} consecutive failures; refusing to write '{path}'")]
    CircuitOpen { path: String, failures: u32 },
}

impl SinkError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn write(path: impl Into<String>, source: opendal::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Whether re-issuing the same write may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SinkError::Write { source, .. } => source.is_temporary(),
            SinkError::InvalidConfig(_)
            | SinkError::Operator { .. }
            | SinkError::CircuitOpen { .. } => false,
        }
    }
}

/// Result type alias for SinkError
pub type Result<T> = std::result::Result<T, SinkError>;
