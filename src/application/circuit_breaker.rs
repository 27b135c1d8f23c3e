//! Circuit breaker around the request log.
//!
//! Counts consecutive request-log failures. Once the threshold is reached the
//! circuit opens and the controller stops calling the log until the recovery
//! timeout has passed; one probe is then let through (half-open) and its
//! result closes or re-opens the circuit.

use crate::application::ports::Clock;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Request log is being called normally
    Closed = 0,
    /// Request log is being skipped
    Open = 1,
    /// A probe call is allowed to test recovery
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Duration to wait before attempting recovery
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Circuit breaker guarding request-log calls.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    last_failure_nanos: AtomicU64,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    /// Reference point for `last_failure_nanos`
    epoch: Instant,
}

impl CircuitBreaker {
    /// Create a circuit breaker with default configuration.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(CircuitBreakerConfig::default(), clock)
    }

    /// Create a circuit breaker with custom configuration.
    pub fn with_config(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let epoch = clock.now();
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU64::new(0),
            last_failure_nanos: AtomicU64::new(0),
            config,
            clock,
            epoch,
        }
    }

    /// Get the current circuit state.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Whether the request log may be called.
    ///
    /// An open circuit whose recovery timeout has elapsed moves to half-open
    /// and allows the call.
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .clock
                    .now()
                    .saturating_duration_since(self.last_failure_time());
                if elapsed < self.config.recovery_timeout {
                    return false;
                }

                // Only one thread performs the transition
                let swapped = self.state.compare_exchange(
                    CircuitState::Open as u8,
                    CircuitState::HalfOpen as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                swapped.is_ok() || self.state() == CircuitState::HalfOpen
            }
        }
    }

    /// Record a successful request-log call.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        if self.state() == CircuitState::HalfOpen {
            self.state
                .store(CircuitState::Closed as u8, Ordering::Release);
        }
    }

    /// Record a failed request-log call.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;

        let nanos = self
            .clock
            .now()
            .saturating_duration_since(self.epoch)
            .as_nanos()
            .try_into()
            .unwrap_or(u64::MAX);
        self.last_failure_nanos.store(nanos, Ordering::Release);

        match self.state() {
            CircuitState::HalfOpen => {
                self.state
                    .store(CircuitState::Open as u8, Ordering::Release);
            }
            CircuitState::Closed if failures >= u64::from(self.config.failure_threshold) => {
                tracing::warn!(
                    failures,
                    recovery_timeout_secs = self.config.recovery_timeout.as_secs(),
                    "request log circuit opened"
                );
                self.state
                    .store(CircuitState::Open as u8, Ordering::Release);
            }
            _ => {}
        }
    }

    /// Get the number of consecutive failures.
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Get the configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Reset the circuit breaker to closed state.
    pub fn reset(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
    }

    fn last_failure_time(&self) -> Instant {
        self.epoch + Duration::from_nanos(self.last_failure_nanos.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;

    fn breaker(threshold: u32, recovery: Duration) -> (CircuitBreaker, MockClock) {
        let clock = MockClock::new(Instant::now());
        let cb = CircuitBreaker::with_config(
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: recovery,
            },
            Arc::new(clock.clone()),
        );
        (cb, clock)
    }

    #[test]
    fn test_starts_closed() {
        let (cb, _) = breaker(3, Duration::from_secs(1));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_opens_at_threshold() {
        let (cb, _) = breaker(3, Duration::from_secs(1));

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let (cb, _) = breaker(3, Duration::from_secs(1));

        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();

        assert_eq!(cb.consecutive_failures(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_recovery_timeout() {
        let (cb, clock) = breaker(1, Duration::from_secs(10));

        cb.record_failure();
        assert!(!cb.allow_request());

        clock.advance(Duration::from_secs(9));
        assert!(!cb.allow_request());

        clock.advance(Duration::from_secs(1));
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_success_closes() {
        let (cb, clock) = breaker(1, Duration::from_secs(10));

        cb.record_failure();
        clock.advance(Duration::from_secs(10));
        assert!(cb.allow_request());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let (cb, clock) = breaker(1, Duration::from_secs(10));

        cb.record_failure();
        clock.advance(Duration::from_secs(10));
        assert!(cb.allow_request());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        // Recovery timeout restarts from the latest failure
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_reset() {
        let (cb, _) = breaker(1, Duration::from_secs(10));

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_concurrent_failures_open_once() {
        use std::thread;

        let (cb, _) = breaker(50, Duration::from_secs(10));
        let cb = Arc::new(cb);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cb = Arc::clone(&cb);
                thread::spawn(move || {
                    for _ in 0..10 {
                        cb.record_failure();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cb.consecutive_failures(), 100);
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
