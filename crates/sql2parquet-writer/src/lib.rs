//! Blob sinks for sql2parquet
//!
//! A [`BlobSink`] durably stores one encoded object at a path; writing the
//! same path again replaces the object. [`OpendalSink`] covers the filesystem,
//! S3, R2 and in-memory backends through OpenDAL. [`RetryingSink`] and
//! [`RetryingSource`] add backoff and a circuit breaker around the sink and
//! row source capabilities.

use async_trait::async_trait;
use bytes::Bytes;

mod decorators;
mod error;
pub mod retry;
mod sink;

pub use decorators::{RetryingSink, RetryingSource};
pub use error::{Result, SinkError};
pub use retry::{CircuitBreaker, CircuitBreakerState, RetryDisposition, RetryError, RetryPolicy};
pub use sink::OpendalSink;

/// Durable, overwrite-on-conflict object storage
#[async_trait]
pub trait BlobSink: Send + Sync {
    /// Store `bytes` at `path`, replacing any existing object.
    async fn put(&self, path: &str, bytes: Bytes) -> Result<()>;

    /// Bucket or root, for logs
    fn location(&self) -> String;
}
