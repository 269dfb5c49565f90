//! sql2parquet - chunked export of an ordered query into date-partitioned Parquet
//!
//! Rows are pulled from a [`RowSource`] one page at a time, routed by a date
//! column to `{base}/year={Y}/month={M}/day={D}/data.parquet`, encoded, and
//! written to a [`BlobSink`]. Re-running an export over unchanged data
//! overwrites the same objects with the same bytes.
//!
//! [`RowSource`]: sql2parquet_source::RowSource
//! [`BlobSink`]: sql2parquet_writer::BlobSink

mod error;
mod init;
mod pipeline;
mod state;

pub use error::{PipelineError, RunFailure};
pub use init::{init_tracing, run_export};
pub use pipeline::{Pipeline, PipelineSettings};
pub use state::{RunState, RunSummary, WrittenObject};
