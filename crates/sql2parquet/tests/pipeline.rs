//! End-to-end export runs over an in-memory source and an in-memory object store

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arrow::array::{Array, Date32Array, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use async_trait::async_trait;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use sql2parquet::{Pipeline, PipelineError, PipelineSettings, RunState};
use sql2parquet_config::MixedPartitionPolicy;
use sql2parquet_source::{MemoryRowSource, RowSource, SourceState};
use sql2parquet_writer::{
    BlobSink, CircuitBreaker, OpendalSink, RetryPolicy, RetryingSink, SinkError,
};

const BASE: &str = "path/to/destination";

/// Days since the Unix epoch
fn day(year: i32, month: u32, day: u32) -> i32 {
    let date = chrono::NaiveDate::from_ymd_opt(year, month, day).unwrap();
    let epoch = chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    (date - epoch).num_days() as i32
}

fn orders(days: &[i32]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("created_on", DataType::Date32, true),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from_iter_values(0..days.len() as i64)),
            Arc::new(Date32Array::from(days.to_vec())),
        ],
    )
    .unwrap()
}

fn settings() -> PipelineSettings {
    PipelineSettings::new("created_on", BASE)
}

async fn read_object(sink: &OpendalSink, path: &str) -> Bytes {
    sink.operator().read(path).await.unwrap().to_bytes()
}

fn parquet_ids(bytes: Bytes) -> Vec<i64> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
        .unwrap()
        .build()
        .unwrap();
    let mut ids = Vec::new();
    for batch in reader {
        let batch = batch.unwrap();
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        ids.extend((0..col.len()).map(|i| col.value(i)));
    }
    ids
}

#[tokio::test]
async fn single_day_table_writes_one_object() {
    let d = day(2024, 1, 15);
    let source = MemoryRowSource::new(orders(&[d, d, d]), 50_000);
    let sink = OpendalSink::memory().unwrap();
    let mut pipeline = Pipeline::new(settings(), source, sink);

    let summary = pipeline.run().await.unwrap();

    let path = "path/to/destination/year=2024/month=1/day=15/data.parquet";
    assert_eq!(summary.state.objects, 1);
    assert_eq!(summary.state.rows, 3);
    assert_eq!(summary.state.batches_fetched, 1);
    assert_eq!(summary.state.paths().collect::<Vec<_>>(), vec![path]);

    let bytes = read_object(pipeline.sink(), path).await;
    assert_eq!(parquet_ids(bytes), vec![0, 1, 2]);
    assert_eq!(pipeline.source().state(), SourceState::Exhausted);
}

#[tokio::test]
async fn two_pages_on_two_days_write_two_objects() {
    let first = day(2024, 1, 1);
    let second = day(2024, 1, 2);
    let days: Vec<i32> = (0..100_000)
        .map(|i| if i < 50_000 { first } else { second })
        .collect();

    let source = MemoryRowSource::new(orders(&days), 50_000);
    let sink = OpendalSink::memory().unwrap();
    let mut pipeline = Pipeline::new(settings(), source, sink);

    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.state.batches_fetched, 2);
    assert_eq!(summary.state.objects, 2);
    assert_eq!(summary.state.rows, 100_000);
    assert_eq!(
        summary.state.paths().collect::<Vec<_>>(),
        vec![
            "path/to/destination/year=2024/month=1/day=1/data.parquet",
            "path/to/destination/year=2024/month=1/day=2/data.parquet",
        ]
    );

    let ids = parquet_ids(
        read_object(
            pipeline.sink(),
            "path/to/destination/year=2024/month=1/day=2/data.parquet",
        )
        .await,
    );
    assert_eq!(ids.len(), 50_000);
    assert_eq!(ids.first(), Some(&50_000));
}

#[tokio::test]
async fn empty_table_succeeds_without_writes() {
    let source = MemoryRowSource::new(orders(&[]), 50_000);
    let sink = OpendalSink::memory().unwrap();
    let mut pipeline = Pipeline::new(settings(), source, sink);

    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.state, RunState::default());
    assert_eq!(pipeline.source().state(), SourceState::Exhausted);
}

#[tokio::test]
async fn mixed_page_fails_by_default() {
    let days = [day(2024, 1, 1), day(2024, 1, 1), day(2024, 1, 2)];
    let source = MemoryRowSource::new(orders(&days), 50_000);
    let sink = OpendalSink::memory().unwrap();
    let mut pipeline = Pipeline::new(settings(), source, sink);

    let failure = pipeline.run().await.unwrap_err();

    assert_eq!(failure.error.kind(), "mixed_partition");
    assert_eq!(failure.state.objects, 0);
    assert_eq!(failure.state.batches_fetched, 1);
    assert_eq!(pipeline.source().state(), SourceState::Closed);
}

#[tokio::test]
async fn mixed_page_is_resplit_when_configured() {
    let days = [day(2024, 1, 1), day(2024, 1, 1), day(2024, 1, 2)];
    let source = MemoryRowSource::new(orders(&days), 50_000);
    let sink = OpendalSink::memory().unwrap();
    let mut pipeline = Pipeline::new(
        settings().with_on_mixed(MixedPartitionPolicy::Split),
        source,
        sink,
    );

    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.state.batches_fetched, 1);
    assert_eq!(summary.state.objects, 2);
    let day_two = read_object(
        pipeline.sink(),
        "path/to/destination/year=2024/month=1/day=2/data.parquet",
    )
    .await;
    assert_eq!(parquet_ids(day_two), vec![2]);
}

#[tokio::test]
async fn revisiting_a_day_is_refused() {
    // One row per page; the third page returns to the first day
    let days = [day(2024, 1, 1), day(2024, 1, 2), day(2024, 1, 1)];
    let source = MemoryRowSource::new(orders(&days), 1);
    let sink = OpendalSink::memory().unwrap();
    let mut pipeline = Pipeline::new(settings(), source, sink);

    let failure = pipeline.run().await.unwrap_err();

    assert_eq!(failure.error.kind(), "duplicate_destination");
    assert_eq!(failure.state.objects, 2);
    // The first day's object still holds the rows written first
    let first = read_object(
        pipeline.sink(),
        "path/to/destination/year=2024/month=1/day=1/data.parquet",
    )
    .await;
    assert_eq!(parquet_ids(first), vec![0]);
}

#[tokio::test]
async fn reruns_produce_identical_objects() {
    let days: Vec<i32> = (0..10)
        .map(|i| if i < 5 { day(2024, 3, 9) } else { day(2024, 3, 10) })
        .collect();
    let sink = OpendalSink::memory().unwrap();

    let mut first_run = Pipeline::new(
        settings(),
        MemoryRowSource::new(orders(&days), 5),
        sink.clone(),
    );
    let first = first_run.run().await.unwrap();
    let mut snapshots = Vec::new();
    for path in first.state.paths() {
        snapshots.push(read_object(&sink, path).await);
    }

    let mut second_run = Pipeline::new(
        settings(),
        MemoryRowSource::new(orders(&days), 5),
        sink.clone(),
    );
    let second = second_run.run().await.unwrap();

    assert_eq!(first.state.written, second.state.written);
    for (path, before) in first.state.paths().zip(snapshots) {
        assert_eq!(read_object(&sink, path).await, before);
    }
}

/// Fails the `fail_on`-th put (1-based), and every later one when `repeating`.
struct FailingSink {
    inner: OpendalSink,
    puts: AtomicUsize,
    fail_on: usize,
    temporary: bool,
    repeating: bool,
}

impl FailingSink {
    fn new(inner: OpendalSink, fail_on: usize, temporary: bool) -> Self {
        Self {
            inner,
            puts: AtomicUsize::new(0),
            fail_on,
            temporary,
            repeating: false,
        }
    }

    fn repeating(mut self) -> Self {
        self.repeating = true;
        self
    }
}

#[async_trait]
impl BlobSink for FailingSink {
    async fn put(&self, path: &str, bytes: Bytes) -> sql2parquet_writer::Result<()> {
        let n = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on || (self.repeating && n > self.fail_on) {
            let err = opendal::Error::new(opendal::ErrorKind::Unexpected, "injected failure");
            let err = if self.temporary { err.set_temporary() } else { err };
            return Err(SinkError::write(path, err));
        }
        self.inner.put(path, bytes).await
    }

    fn location(&self) -> String {
        self.inner.location()
    }
}

#[tokio::test]
async fn sink_failure_on_second_batch_stops_the_run() {
    let first = day(2024, 1, 1);
    let second = day(2024, 1, 2);
    let store = OpendalSink::memory().unwrap();
    let source = MemoryRowSource::new(orders(&[first, first, second, second]), 2);
    let mut pipeline = Pipeline::new(
        settings(),
        source,
        FailingSink::new(store.clone(), 2, false),
    );

    let failure = pipeline.run().await.unwrap_err();

    assert_eq!(failure.error.kind(), "sink");
    assert_eq!(failure.state.objects, 1);
    assert_eq!(failure.state.batches_fetched, 2);
    assert!(store
        .operator()
        .exists("path/to/destination/year=2024/month=1/day=1/data.parquet")
        .await
        .unwrap());
    assert!(!store
        .operator()
        .exists("path/to/destination/year=2024/month=1/day=2/data.parquet")
        .await
        .unwrap());
    assert_eq!(pipeline.source().state(), SourceState::Closed);
}

#[tokio::test]
async fn transient_sink_failure_is_retried() {
    let d = day(2024, 1, 15);
    let store = OpendalSink::memory().unwrap();
    let sink = RetryingSink::new(
        FailingSink::new(store.clone(), 1, true),
        RetryPolicy::new(3, Duration::ZERO, Duration::ZERO),
        CircuitBreaker::new(5),
    );
    let mut pipeline = Pipeline::new(
        settings(),
        MemoryRowSource::new(orders(&[d]), 10),
        sink,
    );

    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.state.objects, 1);
    assert_eq!(pipeline.sink().inner().puts.load(Ordering::SeqCst), 2);
    assert!(store
        .operator()
        .exists("path/to/destination/year=2024/month=1/day=15/data.parquet")
        .await
        .unwrap());
}

#[tokio::test]
async fn persistent_transient_failure_on_second_batch_stops_the_run() {
    let first = day(2024, 1, 1);
    let second = day(2024, 1, 2);
    let store = OpendalSink::memory().unwrap();
    let source = MemoryRowSource::new(orders(&[first, first, second, second]), 2);
    let sink = RetryingSink::new(
        FailingSink::new(store.clone(), 2, true).repeating(),
        RetryPolicy::new(3, Duration::ZERO, Duration::ZERO),
        CircuitBreaker::new(10),
    );
    let mut pipeline = Pipeline::new(settings(), source, sink);

    let failure = pipeline.run().await.unwrap_err();

    assert_eq!(failure.error.kind(), "sink");
    match &failure.error {
        PipelineError::Sink(err) => assert!(err.is_transient()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(failure.state.objects, 1);
    assert_eq!(failure.state.batches_fetched, 2);
    // One successful put, then three attempts at the second day
    assert_eq!(pipeline.sink().inner().puts.load(Ordering::SeqCst), 4);
    assert!(store
        .operator()
        .exists("path/to/destination/year=2024/month=1/day=1/data.parquet")
        .await
        .unwrap());
    assert!(!store
        .operator()
        .exists("path/to/destination/year=2024/month=1/day=2/data.parquet")
        .await
        .unwrap());
    assert_eq!(pipeline.source().state(), SourceState::Closed);
}
