//! Export driver
//!
//! Strictly sequential: fetch one batch, map it to its partition(s), encode,
//! write, record, then fetch the next. Only one batch and its encoded bytes
//! are held at a time.

use std::time::Instant;

use arrow::array::RecordBatch;
use sql2parquet_config::{ExportSettings, MixedPartitionPolicy};
use sql2parquet_core::{
    derive_partition_key, destination_path, encode_batch, split_by_partition, ParquetOptions,
    PartitionKey,
};
use sql2parquet_source::RowSource;
use sql2parquet_writer::BlobSink;
use tracing::{debug, error, info};

use crate::error::{PipelineError, RunFailure};
use crate::state::{RunState, RunSummary, WrittenObject};

/// Per-run settings the driver needs from the export config
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub date_column: String,
    pub base_path: String,
    pub on_mixed: MixedPartitionPolicy,
    pub parquet: ParquetOptions,
}

impl PipelineSettings {
    pub fn new(date_column: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self {
            date_column: date_column.into(),
            base_path: base_path.into(),
            on_mixed: MixedPartitionPolicy::Fail,
            parquet: ParquetOptions::default(),
        }
    }

    pub fn from_config(export: &ExportSettings) -> Self {
        Self {
            date_column: export.date_column.trim().to_string(),
            base_path: export.base_path.clone(),
            on_mixed: export.on_mixed,
            parquet: ParquetOptions {
                row_group_size: export.parquet_row_group_size,
            },
        }
    }

    pub fn with_on_mixed(mut self, on_mixed: MixedPartitionPolicy) -> Self {
        self.on_mixed = on_mixed;
        self
    }
}

pub struct Pipeline<S, K> {
    settings: PipelineSettings,
    source: S,
    sink: K,
}

impl<S: RowSource, K: BlobSink> Pipeline<S, K> {
    pub fn new(settings: PipelineSettings, source: S, sink: K) -> Self {
        Self {
            settings,
            source,
            sink,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_parts(self) -> (S, K) {
        (self.source, self.sink)
    }

    /// Drive the source to exhaustion.
    ///
    /// The source is closed on every exit path. On failure the progress made
    /// so far is returned alongside the error.
    pub async fn run(&mut self) -> Result<RunSummary, RunFailure> {
        let started = Instant::now();
        let mut state = RunState::default();

        info!(
            date_column = %self.settings.date_column,
            base_path = %self.settings.base_path,
            on_mixed = %self.settings.on_mixed,
            destination = %self.sink.location(),
            "Starting export"
        );

        let result = self.drive(&mut state).await;
        self.source.close().await;
        state.offset = self.source.offset();

        match result {
            Ok(()) => {
                let elapsed = started.elapsed();
                info!(
                    rows = state.rows,
                    batches_fetched = state.batches_fetched,
                    objects = state.objects,
                    bytes = state.bytes,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Export complete"
                );
                Ok(RunSummary { state, elapsed })
            }
            Err(error) => {
                error!(
                    kind = error.kind(),
                    error = %error,
                    objects = state.objects,
                    offset = state.offset,
                    "Export failed"
                );
                Err(RunFailure { state, error })
            }
        }
    }

    async fn drive(&mut self, state: &mut RunState) -> Result<(), PipelineError> {
        self.source.open().await?;

        while let Some(batch) = self.source.next_batch().await? {
            state.record_batch();
            debug!(
                batch = state.batches_fetched,
                rows = batch.num_rows(),
                offset = self.source.offset(),
                "Fetched batch"
            );

            for (key, part) in self.partition(batch)? {
                self.write_partition(state, key, &part).await?;
            }
        }

        Ok(())
    }

    fn partition(&self, batch: RecordBatch) -> Result<Vec<(PartitionKey, RecordBatch)>, PipelineError> {
        let column = self.settings.date_column.as_str();
        let groups = match self.settings.on_mixed {
            MixedPartitionPolicy::Fail => vec![(derive_partition_key(&batch, column)?, batch)],
            MixedPartitionPolicy::Split => split_by_partition(&batch, column)?,
        };

        if groups.len() > 1 {
            info!(partitions = groups.len(), "Split batch spanning several days");
        }
        Ok(groups)
    }

    async fn write_partition(
        &self,
        state: &mut RunState,
        key: PartitionKey,
        batch: &RecordBatch,
    ) -> Result<(), PipelineError> {
        let path = destination_path(&self.settings.base_path, key);
        if state.has_written(&path) {
            return Err(PipelineError::DuplicateDestination { path, key });
        }

        let bytes = encode_batch(batch, &self.settings.parquet, Some(key))?;
        let size = bytes.len();
        let digest = blake3::hash(&bytes).to_hex().to_string();

        self.sink.put(&path, bytes).await?;

        info!(path = %path, rows = batch.num_rows(), bytes = size, "Wrote partition object");
        state.record_object(WrittenObject {
            path,
            key,
            rows: batch.num_rows(),
            bytes: size,
            digest,
        });
        Ok(())
    }
}
