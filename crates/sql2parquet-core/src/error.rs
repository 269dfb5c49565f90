//! Error types for partitioning and encoding

use crate::partition::PartitionKey;
use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

/// Errors raised while mapping a batch to its partition key(s)
#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("batch is empty; no partition key can be derived")]
    EmptyBatch,

    #[error("date column '{column}' not found in batch schema")]
    MissingColumn { column: String },

    #[error(
        "date column '{column}' has unsupported type {data_type}; expected Date32, Date64 or Timestamp"
    )]
    UnsupportedType { column: String, data_type: DataType },

    #[error("date column '{column}' is null at row {row}")]
    NullValue { column: String, row: usize },

    #[error("date column '{column}' at row {row} is outside the supported calendar range")]
    OutOfRange { column: String, row: usize },

    /// The batch holds rows for more than one calendar day.
    #[error("batch spans multiple partitions: {first} and {other} (first seen at row {row})")]
    MixedPartition {
        first: PartitionKey,
        other: PartitionKey,
        row: usize,
    },

    #[error("failed to split batch by partition: {0}")]
    Arrow(#[from] ArrowError),
}

/// Errors raised while encoding a batch to Parquet
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to encode Parquet: {0}")]
    Parquet(#[from] ParquetError),
}
