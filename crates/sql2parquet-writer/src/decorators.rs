//! Retry decorators around the source and sink capabilities
//!
//! Transient failures are retried with exponential backoff up to the policy's
//! attempt limit. Every transient failure also feeds a circuit breaker shared
//! across calls; once it opens, further calls fail fast without touching the
//! wrapped capability.

use std::sync::Mutex;

use arrow::array::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;
use sql2parquet_config::RetryConfig;
use sql2parquet_source::{RowSource, SourceError, SourceState};
use tokio::time::sleep;
use tracing::{error, warn};

use crate::retry::{CircuitBreaker, CircuitBreakerState, RetryDisposition, RetryPolicy};
use crate::{BlobSink, Result, SinkError};

pub struct RetryingSink<S> {
    inner: S,
    policy: RetryPolicy,
    breaker: Mutex<CircuitBreaker>,
}

impl<S: BlobSink> RetryingSink<S> {
    pub fn new(inner: S, policy: RetryPolicy, breaker: CircuitBreaker) -> Self {
        Self {
            inner,
            policy,
            breaker: Mutex::new(breaker),
        }
    }

    pub fn from_config(inner: S, config: &RetryConfig) -> Self {
        Self::new(
            inner,
            RetryPolicy::from_config(config),
            CircuitBreaker::from_config(config),
        )
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn breaker(&self) -> std::sync::MutexGuard<'_, CircuitBreaker> {
        self.breaker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<S: BlobSink> BlobSink for RetryingSink<S> {
    async fn put(&self, path: &str, bytes: Bytes) -> Result<()> {
        {
            let breaker = self.breaker();
            if breaker.is_open() {
                return Err(SinkError::CircuitOpen {
                    path: path.to_string(),
                    failures: breaker.consecutive_failures(),
                });
            }
        }

        let result = self
            .policy
            .run(
                || self.inner.put(path, bytes.clone()),
                |err: &SinkError| {
                    if !err.is_transient() {
                        return RetryDisposition::Stop;
                    }
                    match self.breaker().record_failure() {
                        CircuitBreakerState::Closed => {
                            warn!(path, error = %err, "Transient write failure, retrying");
                            RetryDisposition::Retry
                        }
                        CircuitBreakerState::Open => {
                            error!(path, error = %err, "Circuit breaker opened for sink");
                            RetryDisposition::Stop
                        }
                    }
                },
            )
            .await;

        match result {
            Ok(()) => {
                self.breaker().record_success();
                Ok(())
            }
            Err(err) => Err(err.into_inner()),
        }
    }

    fn location(&self) -> String {
        self.inner.location()
    }
}

pub struct RetryingSource<S> {
    inner: S,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
}

impl<S: RowSource> RetryingSource<S> {
    pub fn new(inner: S, policy: RetryPolicy, breaker: CircuitBreaker) -> Self {
        Self {
            inner,
            policy,
            breaker,
        }
    }

    pub fn from_config(inner: S, config: &RetryConfig) -> Self {
        Self::new(
            inner,
            RetryPolicy::from_config(config),
            CircuitBreaker::from_config(config),
        )
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Backoff before the next attempt, or the error to give up with.
    fn on_failure(&mut self, err: SourceError, attempt: usize) -> std::result::Result<(), SourceError> {
        if !err.is_transient() {
            return Err(err);
        }

        if let CircuitBreakerState::Open = self.breaker.record_failure() {
            error!(offset = self.inner.offset(), error = %err, "Circuit breaker opened for source");
            return Err(err);
        }

        if attempt + 1 >= self.policy.max_attempts {
            error!(
                offset = self.inner.offset(),
                attempts = attempt + 1,
                error = %err,
                "Source retries exhausted"
            );
            return Err(err);
        }

        warn!(
            offset = self.inner.offset(),
            attempt = attempt + 1,
            error = %err,
            "Transient source failure, retrying"
        );
        Ok(())
    }

    fn check_breaker(&self) -> std::result::Result<(), SourceError> {
        if self.breaker.is_open() {
            return Err(SourceError::CircuitOpen {
                offset: self.inner.offset(),
                failures: self.breaker.consecutive_failures(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl<S: RowSource> RowSource for RetryingSource<S> {
    async fn open(&mut self) -> std::result::Result<(), SourceError> {
        self.check_breaker()?;
        let mut attempt = 0;
        loop {
            match self.inner.open().await {
                Ok(()) => {
                    self.breaker.record_success();
                    return Ok(());
                }
                Err(err) => {
                    self.on_failure(err, attempt)?;
                    sleep(self.policy.backoff_delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn next_batch(&mut self) -> std::result::Result<Option<RecordBatch>, SourceError> {
        self.check_breaker()?;
        let mut attempt = 0;
        loop {
            match self.inner.next_batch().await {
                Ok(batch) => {
                    self.breaker.record_success();
                    return Ok(batch);
                }
                Err(err) => {
                    self.on_failure(err, attempt)?;
                    sleep(self.policy.backoff_delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn close(&mut self) {
        self.inner.close().await;
    }

    fn offset(&self) -> u64 {
        self.inner.offset()
    }

    fn state(&self) -> SourceState {
        self.inner.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct FlakySink {
        failures: AtomicUsize,
        calls: Arc<AtomicUsize>,
        temporary: bool,
    }

    impl FlakySink {
        fn new(failures: usize, temporary: bool) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let sink = Self {
                failures: AtomicUsize::new(failures),
                calls: Arc::clone(&calls),
                temporary,
            };
            (sink, calls)
        }
    }

    #[async_trait]
    impl BlobSink for FlakySink {
        async fn put(&self, path: &str, _bytes: Bytes) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining == 0 {
                return Ok(());
            }
            self.failures.store(remaining - 1, Ordering::SeqCst);
            let err = opendal::Error::new(opendal::ErrorKind::Unexpected, "injected");
            let err = if self.temporary { err.set_temporary() } else { err };
            Err(SinkError::write(path, err))
        }

        fn location(&self) -> String {
            "flaky://".to_string()
        }
    }

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(threshold)
    }

    #[tokio::test]
    async fn test_sink_retries_transient_failures() {
        let (inner, calls) = FlakySink::new(2, true);
        let sink = RetryingSink::new(inner, fast_policy(3), breaker(10));

        sink.put("a/data.parquet", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.location(), "flaky://");
    }

    #[tokio::test]
    async fn test_sink_does_not_retry_permanent_failures() {
        let (inner, calls) = FlakySink::new(1, false);
        let sink = RetryingSink::new(inner, fast_policy(3), breaker(10));

        assert!(sink.put("a/data.parquet", Bytes::new()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sink_breaker_fails_fast_once_open() {
        let (inner, calls) = FlakySink::new(usize::MAX, true);
        let sink = RetryingSink::new(inner, fast_policy(5), breaker(2));

        let first = sink.put("a/data.parquet", Bytes::new()).await.unwrap_err();
        assert!(matches!(first, SinkError::Write { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let second = sink.put("b/data.parquet", Bytes::new()).await.unwrap_err();
        assert!(matches!(second, SinkError::CircuitOpen { failures: 2, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    struct ScriptedSource {
        script: VecDeque<std::result::Result<Option<RecordBatch>, SourceError>>,
        calls: usize,
    }

    #[async_trait]
    impl RowSource for ScriptedSource {
        async fn open(&mut self) -> std::result::Result<(), SourceError> {
            Ok(())
        }

        async fn next_batch(&mut self) -> std::result::Result<Option<RecordBatch>, SourceError> {
            self.calls += 1;
            self.script.pop_front().unwrap_or(Ok(None))
        }

        async fn close(&mut self) {}

        fn offset(&self) -> u64 {
            0
        }

        fn state(&self) -> SourceState {
            SourceState::Open
        }
    }

    fn timeout() -> SourceError {
        SourceError::ConnectTimeout {
            target: "localhost:5432/sales".to_string(),
            secs: 1,
        }
    }

    #[tokio::test]
    async fn test_source_retries_transient_then_succeeds() {
        let inner = ScriptedSource {
            script: VecDeque::from(vec![Err(timeout()), Ok(None)]),
            calls: 0,
        };
        let mut source = RetryingSource::new(inner, fast_policy(3), breaker(10));

        assert!(source.next_batch().await.unwrap().is_none());
        assert_eq!(source.inner().calls, 2);
    }

    #[tokio::test]
    async fn test_source_gives_up_after_max_attempts() {
        let inner = ScriptedSource {
            script: VecDeque::from(vec![Err(timeout()), Err(timeout()), Err(timeout())]),
            calls: 0,
        };
        let mut source = RetryingSource::new(inner, fast_policy(2), breaker(10));

        let err = source.next_batch().await.unwrap_err();
        assert!(matches!(err, SourceError::ConnectTimeout { .. }));
        assert_eq!(source.inner().calls, 2);
    }

    #[tokio::test]
    async fn test_source_fatal_errors_pass_through() {
        let inner = ScriptedSource {
            script: VecDeque::from(vec![Err(SourceError::NotOpen)]),
            calls: 0,
        };
        let mut source = RetryingSource::new(inner, fast_policy(3), breaker(10));

        assert!(matches!(
            source.next_batch().await,
            Err(SourceError::NotOpen)
        ));
        assert_eq!(source.inner().calls, 1);
    }

    #[tokio::test]
    async fn test_source_breaker_opens() {
        let inner = ScriptedSource {
            script: VecDeque::from(vec![Err(timeout()), Err(timeout()), Ok(None)]),
            calls: 0,
        };
        let mut source = RetryingSource::new(inner, fast_policy(5), breaker(2));

        assert!(source.next_batch().await.is_err());
        assert!(matches!(
            source.next_batch().await,
            Err(SourceError::CircuitOpen { failures: 2, .. })
        ));
        assert_eq!(source.inner().calls, 2);
    }
}
