//! Background eviction for the in-memory request log.
//!
//! Expired entries are pruned lazily whenever their key is touched. Keys that
//! are never touched again (one-off guests, rotating addresses) would stay
//! forever; the sweeper walks the whole log periodically and drops them.

use crate::application::ports::Clock;
use crate::infrastructure::memory_log::MemoryRequestLog;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "async")]
use tokio::sync::oneshot;
#[cfg(feature = "async")]
use tokio::time::{interval, MissedTickBehavior};

/// Error returned when sweeper configuration validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SweeperConfigError {
    /// Sweep interval must be greater than zero
    #[error("sweep interval must be greater than 0")]
    ZeroInterval,
    /// Retention must be greater than zero
    #[error("retention must be greater than 0")]
    ZeroRetention,
}

/// Configuration for periodic sweeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    /// How often to sweep
    pub interval: Duration,
    /// Entries older than this are dropped, unless their key was last
    /// checked against a longer window
    pub retention: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            retention: Duration::from_secs(3600),
        }
    }
}

impl SweeperConfig {
    /// Create a sweeper config.
    ///
    /// # Errors
    /// Returns `SweeperConfigError` if either duration is zero.
    pub fn new(interval: Duration, retention: Duration) -> Result<Self, SweeperConfigError> {
        if interval.is_zero() {
            return Err(SweeperConfigError::ZeroInterval);
        }
        if retention.is_zero() {
            return Err(SweeperConfigError::ZeroRetention);
        }
        Ok(Self {
            interval,
            retention,
        })
    }
}

/// Periodically evicts idle identities from a [`MemoryRequestLog`].
#[derive(Debug, Clone)]
pub struct WindowSweeper {
    log: Arc<MemoryRequestLog>,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
}

impl WindowSweeper {
    /// Create a sweeper over `log`.
    pub fn new(log: Arc<MemoryRequestLog>, clock: Arc<dyn Clock>, config: SweeperConfig) -> Self {
        Self { log, clock, config }
    }

    /// Sweep once. Returns the number of identities removed.
    pub fn sweep_once(&self) -> usize {
        let removed = self.log.sweep(self.config.retention, self.clock.now());
        tracing::debug!(removed, remaining = self.log.len(), "swept request log");
        removed
    }

    /// Get the sweeper configuration.
    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Start sweeping in a background task.
    ///
    /// Must be called from within a tokio runtime. The first sweep runs one
    /// interval after starting.
    #[cfg(feature = "async")]
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        self.sweep_once();
                    }
                }
            }
            tracing::debug!("request log sweeper stopped");
        });

        SweeperHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }
}

/// Error returned when the sweeper task does not stop cleanly.
#[cfg(feature = "async")]
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// The sweeper task panicked
    #[error("sweeper task panicked")]
    TaskPanicked,
    /// The sweeper task was cancelled before it could stop
    #[error("sweeper task was cancelled")]
    TaskCancelled,
}

/// Handle to a running sweeper.
///
/// Dropping the handle leaves the task running until the runtime shuts
/// down; call [`shutdown`](Self::shutdown) to stop it.
#[cfg(feature = "async")]
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

#[cfg(feature = "async")]
impl SweeperHandle {
    /// Whether the task is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the sweeper and wait for the task to finish.
    ///
    /// # Errors
    /// Returns `ShutdownError` if the task panicked or was cancelled.
    pub async fn shutdown(mut self) -> Result<(), ShutdownError> {
        if let Some(tx) = self.shutdown_tx.take() {
            // The task may already be gone; join reports why
            let _ = tx.send(());
        }

        match self.task.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_panic() => Err(ShutdownError::TaskPanicked),
            Err(_) => Err(ShutdownError::TaskCancelled),
        }
    }
}
