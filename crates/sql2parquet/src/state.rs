//! Run progress bookkeeping

use std::time::Duration;

use sql2parquet_core::PartitionKey;

/// One object persisted during the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenObject {
    pub path: String,
    pub key: PartitionKey,
    pub rows: usize,
    pub bytes: usize,
    /// BLAKE3 hex digest of the encoded object
    pub digest: String,
}

/// Counters owned by the driver for the duration of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    /// Rows persisted
    pub rows: u64,
    /// Non-empty batches fetched; includes a batch whose write failed
    pub batches_fetched: u64,
    /// Objects persisted; the count of successful writes
    pub objects: u64,
    pub bytes: u64,
    /// Source cursor at the end of the run
    pub offset: u64,
    pub written: Vec<WrittenObject>,
}

impl RunState {
    pub fn has_written(&self, path: &str) -> bool {
        self.written.iter().any(|object| object.path == path)
    }

    pub fn record_batch(&mut self) {
        self.batches_fetched += 1;
    }

    pub fn record_object(&mut self, object: WrittenObject) {
        self.rows += object.rows as u64;
        self.bytes += object.bytes as u64;
        self.objects += 1;
        self.written.push(object);
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.written.iter().map(|object| object.path.as_str())
    }
}

/// Outcome of a run that reached end of data
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub state: RunState,
    pub elapsed: Duration,
}
