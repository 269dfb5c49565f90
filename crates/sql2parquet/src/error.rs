//! Pipeline errors

use sql2parquet_config::ConfigError;
use sql2parquet_core::{EncodeError, PartitionError, PartitionKey};
use sql2parquet_source::SourceError;
use sql2parquet_writer::SinkError;
use thiserror::Error;

use crate::state::RunState;

/// Reason an export run stopped before the source was exhausted
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("partition error: {0}")]
    Partition(#[from] PartitionError),

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// A second batch mapped to a path already written in this run.
    #[error(
        "destination '{path}' ({key}) was already written in this run; \
         the source order does not keep each day contiguous"
    )]
    DuplicateDestination { path: String, key: PartitionKey },
}

impl PipelineError {
    /// Stable short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::Source(_) => "source",
            PipelineError::Partition(PartitionError::MixedPartition { .. }) => "mixed_partition",
            PipelineError::Partition(_) => "partition",
            PipelineError::Encode(_) => "encode",
            PipelineError::Sink(_) => "sink",
            PipelineError::DuplicateDestination { .. } => "duplicate_destination",
        }
    }
}

/// A failed run: the progress made before the error, and the error itself
#[derive(Debug, Error)]
#[error("export failed after writing {objects} object(s): {error}", objects = .state.objects)]
pub struct RunFailure {
    pub state: RunState,
    #[source]
    pub error: PipelineError,
}
