//! Observability counters for admission decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters of admission outcomes.
///
/// Clones share the same counters. All updates are relaxed atomics; a
/// snapshot taken under load is not a consistent cut across counters.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Admitted after a window check
    admitted: AtomicU64,
    /// Rejected by a window check
    rejected: AtomicU64,
    /// Admitted because enforcement was off
    bypassed: AtomicU64,
    /// Admitted because the request log failed (fail-open)
    degraded: AtomicU64,
    /// Decisions that ended in an error
    failed: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_admitted(&self) {
        self.inner.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.inner.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bypassed(&self) {
        self.inner.bypassed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_degraded(&self) {
        self.inner.degraded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.inner.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Requests admitted after a window check.
    pub fn admitted(&self) -> u64 {
        self.inner.admitted.load(Ordering::Relaxed)
    }

    /// Requests rejected.
    pub fn rejected(&self) -> u64 {
        self.inner.rejected.load(Ordering::Relaxed)
    }

    /// Requests admitted with enforcement off.
    pub fn bypassed(&self) -> u64 {
        self.inner.bypassed.load(Ordering::Relaxed)
    }

    /// Requests admitted because the request log was failing.
    pub fn degraded(&self) -> u64 {
        self.inner.degraded.load(Ordering::Relaxed)
    }

    /// Checks that returned an error.
    pub fn failed(&self) -> u64 {
        self.inner.failed.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            admitted: self.admitted(),
            rejected: self.rejected(),
            bypassed: self.bypassed(),
            degraded: self.degraded(),
            failed: self.failed(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.admitted.store(0, Ordering::Relaxed);
        self.inner.rejected.store(0, Ordering::Relaxed);
        self.inner.bypassed.store(0, Ordering::Relaxed);
        self.inner.degraded.store(0, Ordering::Relaxed);
        self.inner.failed.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Admitted after a window check
    pub admitted: u64,
    /// Rejected by a window check
    pub rejected: u64,
    /// Admitted with enforcement off
    pub bypassed: u64,
    /// Admitted because the request log failed
    pub degraded: u64,
    /// Checks that returned an error
    pub failed: u64,
}

impl MetricsSnapshot {
    /// Share of enforced decisions that were rejections (0.0 to 1.0).
    ///
    /// Bypassed and degraded admissions are not enforced decisions and do
    /// not count. Returns 0.0 if nothing was enforced.
    pub fn rejection_rate(&self) -> f64 {
        let enforced = self.admitted.saturating_add(self.rejected);
        if enforced == 0 {
            0.0
        } else {
            self.rejected as f64 / enforced as f64
        }
    }

    /// Total decisions made, including bypassed and degraded ones.
    pub fn total_decisions(&self) -> u64 {
        self.admitted
            .saturating_add(self.rejected)
            .saturating_add(self.bypassed)
            .saturating_add(self.degraded)
    }
}
