use arrow::error::ArrowError;
use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Errors raised while opening or paging a row source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("connecting to {target} did not complete within {secs}s")]
    ConnectTimeout { target: String, secs: u64 },

    #[error("failed to set up TLS: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("query failed at offset {offset}: {source}")]
    Query {
        offset: u64,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("failed to decode column '{column}': {source}")]
    Decode {
        column: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("column '{column}' has unsupported type '{type_name}'")]
    UnsupportedType { column: String, type_name: String },

    #[error("failed to assemble record batch: {0}")]
    Arrow(#[from] ArrowError),

    #[error("row source is not open")]
    NotOpen,

    #[error("circuit breaker open after {failures} consecutive failures at offset {offset}")]
    CircuitOpen { offset: u64, failures: u32 },
}

impl SourceError {
    /// Whether re-issuing the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Connect { source, .. } | SourceError::Query { source, .. } => {
                is_transient_pg(source)
            }
            SourceError::ConnectTimeout { .. } => true,
            SourceError::Decode { .. }
            | SourceError::Tls(_)
            | SourceError::UnsupportedType { .. }
            | SourceError::Arrow(_)
            | SourceError::NotOpen
            | SourceError::CircuitOpen { .. } => false,
        }
    }
}

fn is_transient_pg(err: &tokio_postgres::Error) -> bool {
    if err.is_closed() {
        return true;
    }

    if let Some(code) = err.code() {
        return is_retryable_pg_code(code);
    }

    // Socket-level failures (refused, reset, timed out) carry an io::Error source
    std::error::Error::source(err).is_some_and(|source| source.is::<std::io::Error>())
}

fn is_retryable_pg_code(code: &SqlState) -> bool {
    matches!(
        *code,
        SqlState::T_R_SERIALIZATION_FAILURE
            | SqlState::T_R_DEADLOCK_DETECTED
            | SqlState::LOCK_NOT_AVAILABLE
            | SqlState::TOO_MANY_CONNECTIONS
            | SqlState::ADMIN_SHUTDOWN
            | SqlState::CRASH_SHUTDOWN
            | SqlState::CANNOT_CONNECT_NOW
            | SqlState::CONNECTION_FAILURE
            | SqlState::CONNECTION_DOES_NOT_EXIST
            | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
            | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION
            | SqlState::CONNECTION_EXCEPTION
            | SqlState::QUERY_CANCELED
            | SqlState::OPERATOR_INTERVENTION
    )
}
