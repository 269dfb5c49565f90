//! Core building blocks for sql2parquet
//!
//! Pure functions with no I/O:
//! - partition key derivation from a date-valued column
//! - destination path composition (Hive-style `year=/month=/day=`)
//! - Arrow `RecordBatch` to Parquet encoding

mod error;
pub mod parquet;
pub mod partition;
pub mod path;

pub use error::{EncodeError, PartitionError};
pub use self::parquet::{encode_batch, ParquetOptions, DEFAULT_ROW_GROUP_SIZE};
pub use partition::{derive_partition_key, split_by_partition, PartitionKey};
pub use path::{destination_path, DATA_FILE_NAME};

/// Re-export so downstream crates agree on the Arrow version.
pub use arrow;
