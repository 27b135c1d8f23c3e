//! Request log that fails on demand.

use crate::application::ports::RequestLog;
use crate::domain::context::RequestKey;
use crate::domain::error::BackingStoreError;
use crate::domain::window::WindowOutcome;
use crate::infrastructure::memory_log::MemoryRequestLog;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Request log whose backing store can be switched off.
///
/// While failing, every call returns `BackingStoreError::Unavailable`.
/// Otherwise calls go to an in-memory log. Starts out failing.
#[derive(Debug)]
pub struct FailingRequestLog {
    failing: AtomicBool,
    calls: AtomicU64,
    inner: MemoryRequestLog,
}

impl FailingRequestLog {
    /// Create a log that fails until told otherwise.
    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(true),
            calls: AtomicU64::new(0),
            inner: MemoryRequestLog::new(),
        }
    }

    /// Switch failure on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of calls received, failed or not.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The log used while healthy.
    pub fn inner(&self) -> &MemoryRequestLog {
        &self.inner
    }

    fn enter(&self) -> Result<(), BackingStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackingStoreError::Unavailable(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for FailingRequestLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLog for FailingRequestLog {
    fn count(
        &self,
        key: &RequestKey,
        window: Duration,
        now: Instant,
    ) -> Result<u64, BackingStoreError> {
        self.enter()?;
        self.inner.count(key, window, now)
    }

    fn record(&self, key: &RequestKey, now: Instant) -> Result<(), BackingStoreError> {
        self.enter()?;
        self.inner.record(key, now)
    }

    fn prune(
        &self,
        key: &RequestKey,
        window: Duration,
        now: Instant,
    ) -> Result<(), BackingStoreError> {
        self.enter()?;
        self.inner.prune(key, window, now)
    }

    fn retry_after(
        &self,
        key: &RequestKey,
        window: Duration,
        now: Instant,
    ) -> Result<Option<Duration>, BackingStoreError> {
        self.enter()?;
        self.inner.retry_after(key, window, now)
    }

    fn try_admit(
        &self,
        key: &RequestKey,
        limit: u32,
        window: Duration,
        now: Instant,
    ) -> Result<WindowOutcome, BackingStoreError> {
        self.enter()?;
        self.inner.try_admit(key, limit, window, now)
    }
}
