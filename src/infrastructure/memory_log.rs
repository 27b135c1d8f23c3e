//! In-process request log.
//!
//! One [`SlidingWindow`] per `(request type, identity)` key in a sharded map.
//! `try_admit` runs count and record under the key's shard lock, so it never
//! admits past the limit no matter how many threads race on one identity.
//!
//! State is local to the process. Several application instances each keep
//! their own windows; use the Redis log to share them.

use crate::application::ports::RequestLog;
use crate::domain::context::RequestKey;
use crate::domain::error::BackingStoreError;
use crate::domain::window::{SlidingWindow, WindowOutcome};
use crate::infrastructure::storage::ShardedStorage;
use std::fmt;
use std::time::{Duration, Instant};

/// Request log held in process memory.
#[derive(Default)]
pub struct MemoryRequestLog {
    windows: ShardedStorage<RequestKey, SlidingWindow>,
}

impl MemoryRequestLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            windows: ShardedStorage::new(),
        }
    }

    /// Create a log pre-sized for `capacity` identities.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            windows: ShardedStorage::with_capacity(capacity),
        }
    }

    /// Drop entries older than `retention` across all keys and forget keys
    /// left empty. Returns the number of keys removed.
    ///
    /// A key last checked against a window longer than `retention` keeps
    /// entries for that longer window.
    pub fn sweep(&self, retention: Duration, now: Instant) -> usize {
        let mut removed = 0;
        self.windows.retain(|_, window| {
            let keep_for = retention.max(window.last_window());
            window.prune(keep_for, now);
            let keep = !window.is_empty();
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of identities with stored entries.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Total stored timestamps across all identities, expired or not.
    pub fn entries(&self) -> usize {
        self.windows.fold(0, |total, window| total + window.len())
    }

    /// Forget everything.
    pub fn clear(&self) {
        self.windows.clear();
    }
}

impl fmt::Debug for MemoryRequestLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRequestLog")
            .field("keys", &self.windows.len())
            .finish()
    }
}

impl RequestLog for MemoryRequestLog {
    fn count(
        &self,
        key: &RequestKey,
        window: Duration,
        now: Instant,
    ) -> Result<u64, BackingStoreError> {
        let count = self
            .windows
            .with_existing_mut(key, |entries| entries.count(window, now))
            .unwrap_or(0);
        Ok(count as u64)
    }

    fn record(&self, key: &RequestKey, now: Instant) -> Result<(), BackingStoreError> {
        self.windows
            .with_entry_mut(key.clone(), SlidingWindow::new, |entries| entries.record(now));
        Ok(())
    }

    fn prune(
        &self,
        key: &RequestKey,
        window: Duration,
        now: Instant,
    ) -> Result<(), BackingStoreError> {
        self.windows
            .with_existing_mut(key, |entries| entries.prune(window, now));
        self.windows.remove_if(key, SlidingWindow::is_empty);
        Ok(())
    }

    fn retry_after(
        &self,
        key: &RequestKey,
        window: Duration,
        now: Instant,
    ) -> Result<Option<Duration>, BackingStoreError> {
        Ok(self
            .windows
            .with_existing_mut(key, |entries| {
                entries.prune(window, now);
                entries.retry_after(window, now)
            })
            .flatten())
    }

    fn try_admit(
        &self,
        key: &RequestKey,
        limit: u32,
        window: Duration,
        now: Instant,
    ) -> Result<WindowOutcome, BackingStoreError> {
        if limit == 0 {
            return Ok(WindowOutcome::Full { retry_after: None });
        }
        Ok(self.windows.with_entry_mut(key.clone(), SlidingWindow::new, |entries| {
            entries.try_admit(limit, window, now)
        }))
    }
}
