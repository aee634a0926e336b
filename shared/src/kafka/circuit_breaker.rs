// ============================================================================
// Circuit Breaker for the publish path
// ============================================================================
//
// Publishes run on request-serving tasks. With the broker down, every send
// would otherwise block for the full delivery timeout and pile up behind each
// other; after `failure_threshold` consecutive failures the circuit opens and
// sends fail fast until `reset_timeout` has elapsed, then a half-open probe
// decides whether to close again.
//
// States:
// - CLOSED:    normal operation, sends go through
// - OPEN:      rejecting sends immediately
// - HALF_OPEN: probing recovery, sends allowed through
//
// ============================================================================

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Consecutive half-open successes required before the circuit closes again.
const CLOSE_AFTER_SUCCESSES: u32 = 2;

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Timeout for each wrapped operation
    pub timeout: Duration,
    /// Time to wait before attempting recovery (half-open)
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(3),
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Circuit breaker error types
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, operation rejected without executing
    #[error("circuit open - rejecting immediately (last failure {0:?} ago)")]
    Open(Duration),

    /// Operation exceeded the per-call timeout
    #[error("operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Underlying operation failed
    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

/// Circuit state, visible for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

/// Thread-safe circuit breaker shared by all clones of a publisher.
pub struct CircuitBreaker {
    /// Consecutive failure count
    failures: AtomicU32,
    /// Is the circuit open?
    is_open: AtomicBool,
    /// Timestamp of the last failure (drives `reset_timeout`)
    last_failure: RwLock<Option<Instant>>,
    config: CircuitBreakerConfig,
    /// Success count while half-open
    half_open_successes: AtomicU32,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            failures: AtomicU32::new(0),
            is_open: AtomicBool::new(false),
            last_failure: RwLock::new(None),
            config,
            half_open_successes: AtomicU32::new(0),
        }
    }

    /// Execute `f` under the breaker.
    ///
    /// # Returns
    /// * `Ok(T)` - operation succeeded
    /// * `Err(CircuitBreakerError::Open)` - circuit open, `f` never ran
    /// * `Err(CircuitBreakerError::Timeout)` - `f` exceeded the per-call timeout
    /// * `Err(CircuitBreakerError::Inner(E))` - `f` failed
    pub async fn call<F, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        if self.is_open.load(Ordering::Relaxed) {
            let last_failure_time = { *self.last_failure.read().await };

            if let Some(last_failure) = last_failure_time {
                let elapsed = last_failure.elapsed();

                if elapsed >= self.config.reset_timeout {
                    tracing::info!(
                        elapsed_seconds = elapsed.as_secs(),
                        "Circuit breaker attempting recovery (half-open)"
                    );
                    // Fall through and probe with this call
                } else {
                    tracing::warn!(
                        elapsed_seconds = elapsed.as_secs(),
                        reset_timeout_seconds = self.config.reset_timeout.as_secs(),
                        "Circuit breaker OPEN - rejecting send"
                    );
                    return Err(CircuitBreakerError::Open(elapsed));
                }
            }
        }

        let result = tokio::time::timeout(self.config.timeout, f).await;

        match result {
            Err(_elapsed) => {
                self.record_failure().await;
                tracing::warn!(
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Circuit breaker timeout"
                );
                Err(CircuitBreakerError::Timeout {
                    timeout: self.config.timeout,
                })
            }
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(error)) => {
                self.record_failure().await;
                Err(CircuitBreakerError::Inner(error))
            }
        }
    }

    fn record_success(&self) {
        let was_open = self.is_open.load(Ordering::Relaxed);

        if was_open {
            // Half-open: require a streak of successes before closing
            let successes = self.half_open_successes.fetch_add(1, Ordering::Relaxed) + 1;

            if successes >= CLOSE_AFTER_SUCCESSES {
                self.is_open.store(false, Ordering::Relaxed);
                self.failures.store(0, Ordering::Relaxed);
                self.half_open_successes.store(0, Ordering::Relaxed);

                tracing::info!("Circuit breaker CLOSED - broker recovered");
            } else {
                tracing::info!(successes = successes, "Circuit breaker half-open success");
            }
        } else {
            self.failures.store(0, Ordering::Relaxed);
            self.half_open_successes.store(0, Ordering::Relaxed);
        }
    }

    async fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;

        {
            let mut last = self.last_failure.write().await;
            *last = Some(Instant::now());
        }

        if failures >= self.config.failure_threshold {
            let was_open = self.is_open.swap(true, Ordering::Relaxed);

            if !was_open {
                tracing::error!(
                    failures = failures,
                    threshold = self.config.failure_threshold,
                    reset_timeout_seconds = self.config.reset_timeout.as_secs(),
                    "Circuit breaker OPENED - too many publish failures"
                );
            }

            self.half_open_successes.store(0, Ordering::Relaxed);
        } else {
            tracing::warn!(
                failures = failures,
                threshold = self.config.failure_threshold,
                "Circuit breaker failure recorded"
            );
        }
    }

    /// Current state snapshot (for monitoring and tests)
    pub async fn state(&self) -> (State, u32) {
        let is_open = self.is_open.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let last_failure = { *self.last_failure.read().await };

        let state = if is_open {
            match last_failure {
                Some(last) if last.elapsed() >= self.config.reset_timeout => State::HalfOpen,
                _ => State::Open,
            }
        } else {
            State::Closed
        };

        (state, failures)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
