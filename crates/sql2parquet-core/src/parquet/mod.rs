// Parquet file writing
//
// This module handles encoding Arrow RecordBatches to Parquet bytes.

pub mod writer;

pub use writer::{encode_batch, writer_properties, ParquetOptions, DEFAULT_ROW_GROUP_SIZE};
