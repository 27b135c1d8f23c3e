//! Sliding-window timestamp log for a single key.
//!
//! Timestamps are kept sorted, oldest first. An entry belongs to the window
//! ending at `now` when `now - window < ts <= now`:
//! - entries aged `window` or more are expired and popped from the front,
//! - entries later than `now` (recorded by a thread whose clock ran ahead)
//!   are kept; [`count`](SlidingWindow::count) skips them with a binary
//!   search, while [`try_admit`](SlidingWindow::try_admit) counts them so a
//!   caller with a stale `now` cannot slip past the limit.
//!
//! Each window remembers the length it was last checked against, so a
//! background sweep never drops entries a longer configured window still
//! counts.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Result of an atomic admit attempt against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    /// The event was recorded
    Admitted,
    /// The window is at its limit; nothing was recorded
    Full {
        /// Time until the oldest counted entry leaves the window, when known
        retry_after: Option<Duration>,
    },
}

impl WindowOutcome {
    /// Check if this outcome is Admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, WindowOutcome::Admitted)
    }
}

/// Ordered admitted-request timestamps for one `(request type, identity)` key.
#[derive(Debug, Clone, Default)]
pub struct SlidingWindow {
    timestamps: VecDeque<Instant>,
    last_window: Duration,
}

impl SlidingWindow {
    /// Create an empty window log.
    pub fn new() -> Self {
        Self {
            timestamps: VecDeque::new(),
            last_window: Duration::ZERO,
        }
    }

    /// The window length this log was last counted or admitted against.
    pub fn last_window(&self) -> Duration {
        self.last_window
    }

    /// Remove entries that have aged out of a window of length `window`.
    pub fn prune(&mut self, window: Duration, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of entries inside `(now - window, now]`.
    ///
    /// Prunes expired entries as a side effect.
    pub fn count(&mut self, window: Duration, now: Instant) -> usize {
        self.last_window = window;
        self.prune(window, now);
        self.counted_until(now)
    }

    /// Append an event timestamp.
    ///
    /// Timestamps normally arrive in order; a late one is inserted at its
    /// sorted position so the front stays the oldest entry.
    pub fn record(&mut self, now: Instant) {
        match self.timestamps.back() {
            Some(&last) if last > now => {
                let pos = self.timestamps.partition_point(|&ts| ts <= now);
                self.timestamps.insert(pos, now);
            }
            _ => self.timestamps.push_back(now),
        }
    }

    /// Record `now` only if fewer than `limit` live entries are stored.
    ///
    /// Entries stamped after `now` count against the limit.
    pub fn try_admit(&mut self, limit: u32, window: Duration, now: Instant) -> WindowOutcome {
        self.last_window = window;
        self.prune(window, now);
        if self.timestamps.len() < limit as usize {
            self.record(now);
            WindowOutcome::Admitted
        } else {
            WindowOutcome::Full {
                retry_after: self.retry_after(window, now),
            }
        }
    }

    /// Time until the oldest live entry expires.
    ///
    /// An entry stamped after `now` is treated as recorded at `now`.
    pub fn retry_after(&self, window: Duration, now: Instant) -> Option<Duration> {
        self.timestamps
            .iter()
            .find(|&&ts| now.saturating_duration_since(ts) < window)
            .map(|&oldest| window - now.saturating_duration_since(oldest))
    }

    /// Whether no entries are stored at all.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    fn counted_until(&self, now: Instant) -> usize {
        if matches!(self.timestamps.back(), Some(&last) if last <= now) {
            return self.timestamps.len();
        }
        self.timestamps.partition_point(|&ts| ts <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_count_within_window() {
        let mut window = SlidingWindow::new();
        let start = Instant::now();

        for i in 0..5 {
            window.record(start + Duration::from_secs(i));
        }

        assert_eq!(window.count(MINUTE, start + Duration::from_secs(5)), 5);
        // First entry is exactly `window` old at t=60 and no longer counts
        assert_eq!(window.count(MINUTE, start + Duration::from_secs(60)), 4);
        assert_eq!(window.count(MINUTE, start + Duration::from_secs(64)), 0);
        assert!(window.is_empty());
    }

    #[test]
    fn test_future_entries_not_counted() {
        let mut window = SlidingWindow::new();
        let start = Instant::now();

        window.record(start);
        window.record(start + Duration::from_secs(10));

        assert_eq!(window.count(MINUTE, start + Duration::from_secs(5)), 1);
        assert_eq!(window.len(), 2);
        assert_eq!(window.count(MINUTE, start + Duration::from_secs(10)), 2);
    }

    #[test]
    fn test_out_of_order_record_keeps_front_oldest() {
        let mut window = SlidingWindow::new();
        let start = Instant::now();

        window.record(start + Duration::from_secs(2));
        window.record(start);
        window.record(start + Duration::from_secs(1));

        // The entry at t=0 must expire first
        assert_eq!(window.count(MINUTE, start + Duration::from_secs(60)), 2);
        assert_eq!(window.count(MINUTE, start + Duration::from_secs(61)), 1);
    }

    #[test]
    fn test_try_admit_respects_limit() {
        let mut window = SlidingWindow::new();
        let now = Instant::now();

        assert!(window.try_admit(2, MINUTE, now).is_admitted());
        assert!(window.try_admit(2, MINUTE, now).is_admitted());
        assert_eq!(
            window.try_admit(2, MINUTE, now + Duration::from_secs(15)),
            WindowOutcome::Full {
                retry_after: Some(Duration::from_secs(45))
            }
        );
        // Rejected attempt left nothing behind
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_try_admit_counts_entries_ahead_of_now() {
        let mut window = SlidingWindow::new();
        let start = Instant::now();

        // A racing caller stamped just after us got the lock first
        assert!(window
            .try_admit(1, MINUTE, start + Duration::from_millis(1))
            .is_admitted());
        assert_eq!(
            window.try_admit(1, MINUTE, start),
            WindowOutcome::Full {
                retry_after: Some(MINUTE)
            }
        );
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_remembers_last_window() {
        let mut window = SlidingWindow::new();
        let now = Instant::now();
        assert_eq!(window.last_window(), Duration::ZERO);

        window.try_admit(5, Duration::from_secs(7200), now);
        assert_eq!(window.last_window(), Duration::from_secs(7200));

        window.count(MINUTE, now);
        assert_eq!(window.last_window(), MINUTE);
    }

    #[test]
    fn test_zero_limit_never_admits() {
        let mut window = SlidingWindow::new();
        let now = Instant::now();

        assert_eq!(
            window.try_admit(0, MINUTE, now),
            WindowOutcome::Full { retry_after: None }
        );
        assert!(window.is_empty());
    }

    #[test]
    fn test_rapid_events() {
        let mut window = SlidingWindow::new();
        let now = Instant::now();

        for i in 0..10 {
            let outcome = window.try_admit(3, Duration::from_millis(100), now);
            assert_eq!(outcome.is_admitted(), i < 3, "Event {} decided wrongly", i);
        }
    }
}
