//! Retry with exponential backoff, and a consecutive-failure circuit breaker

use std::future::Future;
use std::time::Duration;

use sql2parquet_config::RetryConfig;
use tokio::time::sleep;

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Result of running an operation under the retry policy.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was considered fatal and should bubble up immediately.
    Fatal(E),
    /// The error was retryable, but the configured attempts were exhausted.
    AttemptsExceeded(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal(err) | RetryError::AttemptsExceeded(err) => err,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay.is_zero() {
                base_delay
            } else {
                max_delay
            },
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay(), config.max_delay())
    }

    /// Executes the operation with the configured retry policy.
    pub async fn run<F, Fut, T, E, Classifier>(
        &self,
        mut op: F,
        classify: Classifier,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Classifier: Fn(&E) -> RetryDisposition,
    {
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(result) => return Ok(result),
                Err(err) => match classify(&err) {
                    RetryDisposition::Stop => return Err(RetryError::Fatal(err)),
                    RetryDisposition::Retry => {
                        if attempt + 1 >= self.max_attempts {
                            return Err(RetryError::AttemptsExceeded(err));
                        }

                        let delay = self.backoff_delay(attempt);
                        tracing::debug!(attempt = attempt + 1, ?delay, "Retrying after backoff");
                        sleep(delay).await;
                        attempt += 1;
                    }
                },
            }
        }
    }

    /// Delay before retry number `attempt + 1`: `base * 2^attempt`, capped.
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::from_millis(0);
        }

        let factor = 1u128 << attempt.min(6);
        let base_ms = self.base_delay.as_millis();
        let delay_ms = base_ms.saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}

/// Counts consecutive transient failures across calls; opens at `threshold`.
///
/// Backoff between attempts belongs to [`RetryPolicy`]; the breaker only
/// decides whether another attempt is allowed at all.
#[derive(Clone, Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    consecutive_failures: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CircuitBreakerState {
    Closed,
    Open,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.breaker_threshold)
    }

    pub fn record_failure(&mut self) -> CircuitBreakerState {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.state()
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn state(&self) -> CircuitBreakerState {
        if self.is_open() {
            CircuitBreakerState::Open
        } else {
            CircuitBreakerState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.consecutive_failures >= self.threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
