//! Resolved limit for one request type and identity class.

use crate::domain::error::ConfigurationError;
use std::time::Duration;

/// Maximum admitted requests per sliding window.
///
/// Built fresh on every lookup; configuration may change between requests.
/// A `limit` of 0 rejects every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    limit: u32,
    window: Duration,
}

impl LimitConfig {
    /// Create a limit with a window expressed in whole seconds.
    ///
    /// # Errors
    /// Returns `ConfigurationError::ZeroWindow` if `window_secs` is zero.
    pub fn new(limit: u32, window_secs: u64) -> Result<Self, ConfigurationError> {
        Self::with_window(limit, Duration::from_secs(window_secs))
    }

    /// Create a limit with an arbitrary window length.
    ///
    /// # Errors
    /// Returns `ConfigurationError::ZeroWindow` if `window` is zero.
    pub fn with_window(limit: u32, window: Duration) -> Result<Self, ConfigurationError> {
        if window.is_zero() {
            return Err(ConfigurationError::ZeroWindow {
                path: "window".to_string(),
            });
        }
        Ok(Self { limit, window })
    }

    /// Maximum admitted requests per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Sliding window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether every request is rejected regardless of history.
    pub fn rejects_all(&self) -> bool {
        self.limit == 0
    }
}
