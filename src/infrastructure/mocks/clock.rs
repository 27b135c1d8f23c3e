//! Mock clock for testing.

use crate::application::ports::Clock;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Manually driven clock.
///
/// Windows, retry hints and circuit-breaker recovery all read time through
/// the [`Clock`] port, so a test can walk a scenario second by second without
/// sleeping.
///
/// ```
/// use admission_throttle::application::ports::Clock;
/// use admission_throttle::infrastructure::mocks::MockClock;
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let clock = MockClock::new(start);
///
/// clock.advance(Duration::from_secs(59));
/// assert_eq!(clock.elapsed(), Duration::from_secs(59));
/// ```
///
/// Clones share one time value: advancing any clone moves them all. Hand one
/// clone to the controller and keep another in the test.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    current: Arc<Mutex<Instant>>,
}

impl MockClock {
    /// Create a mock clock starting at `start`.
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        *self.lock() += duration;
    }

    /// Jump to `instant`, which may be earlier than the current time.
    pub fn set(&self, instant: Instant) {
        *self.lock() = instant;
    }

    /// Time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.now().saturating_duration_since(self.start)
    }

    // Poisoning is ignored; the guarded value is a plain Instant.
    fn lock(&self) -> std::sync::MutexGuard<'_, Instant> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.lock()
    }
}
