//! OpenDAL-backed blob sink
//!
//! The operator is built once from the storage config and owned by the sink;
//! the pipeline receives the sink by value, so nothing lives in process-wide
//! state.

use async_trait::async_trait;
use bytes::Bytes;
use opendal::Operator;
use sql2parquet_config::{StorageBackend, StorageConfig};
use tracing::debug;

use crate::{BlobSink, Result, SinkError};

#[derive(Clone, Debug)]
pub struct OpendalSink {
    operator: Operator,
    location: String,
}

impl OpendalSink {
    pub fn new(operator: Operator, location: impl Into<String>) -> Self {
        Self {
            operator,
            location: location.into(),
        }
    }

    /// Build the operator for the configured backend.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let operator = match config.backend {
            StorageBackend::Fs => {
                let fs = config.fs.as_ref().ok_or_else(|| {
                    SinkError::invalid_config("fs config required for filesystem backend")
                })?;

                let fs_builder = opendal::services::Fs::default().root(&fs.path);
                Operator::new(fs_builder)
                    .map_err(|source| SinkError::Operator {
                        backend: "filesystem",
                        source,
                    })?
                    .finish()
            }
            StorageBackend::S3 => {
                let s3 = config
                    .s3
                    .as_ref()
                    .ok_or_else(|| SinkError::invalid_config("s3 config required for S3 backend"))?;

                let mut s3_builder = opendal::services::S3::default()
                    .bucket(&s3.bucket)
                    .region(&s3.region);

                if let Some(endpoint) = &s3.endpoint {
                    s3_builder = s3_builder.endpoint(endpoint);
                }

                Operator::new(s3_builder)
                    .map_err(|source| SinkError::Operator {
                        backend: "S3",
                        source,
                    })?
                    .finish()
            }
            StorageBackend::R2 => {
                let r2 = config
                    .r2
                    .as_ref()
                    .ok_or_else(|| SinkError::invalid_config("r2 config required for R2 backend"))?;

                // Use endpoint from config if provided, otherwise construct from account_id
                let endpoint = r2
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| format!("https://{}.r2.cloudflarestorage.com", r2.account_id));

                let r2_builder = opendal::services::S3::default()
                    .bucket(&r2.bucket)
                    .region("auto")
                    .endpoint(&endpoint)
                    .access_key_id(&r2.access_key_id)
                    .secret_access_key(&r2.secret_access_key);

                Operator::new(r2_builder)
                    .map_err(|source| SinkError::Operator {
                        backend: "R2",
                        source,
                    })?
                    .finish()
            }
        };

        debug!(location = %config.location(), "Storage operator initialized");
        Ok(Self::new(operator, config.location()))
    }

    /// In-memory operator, for tests and dry runs.
    pub fn memory() -> Result<Self> {
        let operator = Operator::new(opendal::services::Memory::default())
            .map_err(|source| SinkError::Operator {
                backend: "memory",
                source,
            })?
            .finish();
        Ok(Self::new(operator, "memory://"))
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }
}

#[async_trait]
impl BlobSink for OpendalSink {
    async fn put(&self, path: &str, bytes: Bytes) -> Result<()> {
        let size = bytes.len();
        self.operator
            .write(path, bytes)
            .await
            .map_err(|source| SinkError::write(path, source))?;
        debug!(path, size, "Wrote object");
        Ok(())
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}
