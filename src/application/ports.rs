//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::context::{RequestContext, RequestKey};
use crate::domain::error::{BackingStoreError, ConfigurationError};
use crate::domain::window::WindowOutcome;
use std::fmt::Debug;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Port for obtaining current time.
///
/// This abstraction allows the application layer to work with time
/// without depending on system clock implementation details.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Port for the append-and-count request log.
///
/// Keys are `(request type, identity)` pairs. Implementations must allow
/// concurrent calls for different keys without blocking each other, and
/// concurrent `record`/`count` on one key without corrupting it.
pub trait RequestLog: Send + Sync + Debug {
    /// Number of events for `key` with a timestamp in `(now - window, now]`.
    fn count(&self, key: &RequestKey, window: Duration, now: Instant)
        -> Result<u64, BackingStoreError>;

    /// Append one event for `key`. Two calls record two events.
    fn record(&self, key: &RequestKey, now: Instant) -> Result<(), BackingStoreError>;

    /// Drop entries for `key` that are older than `window`.
    fn prune(&self, key: &RequestKey, window: Duration, now: Instant)
        -> Result<(), BackingStoreError>;

    /// Time until the oldest event counted at `now` leaves the window, or
    /// `None` if the log cannot tell.
    fn retry_after(
        &self,
        _key: &RequestKey,
        _window: Duration,
        _now: Instant,
    ) -> Result<Option<Duration>, BackingStoreError> {
        Ok(None)
    }

    /// Record an event only if fewer than `limit` are in the window.
    ///
    /// The default runs `count` then `record` as two separate steps, so
    /// concurrent callers near the limit may all pass the check and the
    /// window can briefly hold more than `limit` entries. Implementations
    /// override this with a single atomic step.
    fn try_admit(
        &self,
        key: &RequestKey,
        limit: u32,
        window: Duration,
        now: Instant,
    ) -> Result<WindowOutcome, BackingStoreError> {
        if self.count(key, window, now)? < u64::from(limit) {
            self.record(key, now)?;
            Ok(WindowOutcome::Admitted)
        } else {
            Ok(WindowOutcome::Full {
                retry_after: self.retry_after(key, window, now)?,
            })
        }
    }
}

/// Scope a configuration value is read at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Installation-wide default
    Default,
    /// Website level
    Website,
    /// Store view level
    Store,
}

/// Port for scoped configuration reads.
///
/// Scope resolution (falling back from store to website to default) is the
/// adapter's business. Values are read on every call and never cached here.
pub trait ScopedConfig: Send + Sync + Debug {
    /// Raw value at `path`, or `None` if unset.
    fn value(&self, path: &str, scope: Scope) -> Result<Option<String>, ConfigurationError>;

    /// Whether the flag at `path` is set.
    fn is_set_flag(&self, path: &str, scope: Scope) -> Result<bool, ConfigurationError> {
        Ok(self.value(path, scope)?.as_deref().is_some_and(is_truthy))
    }
}

/// Port for deployment-level configuration (not store scoped, set at install).
pub trait DeploymentConfig: Send + Sync + Debug {
    /// Raw value at `path`, or `None` if unset.
    fn get(&self, path: &str) -> Result<Option<String>, ConfigurationError>;
}

/// Authenticated principal attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Stable user id
    pub user_id: String,
    /// Raw identity code from the session (`1` customer, `2` admin)
    pub identity_code: i64,
}

/// Request facts a classifier derives the identity from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMetadata {
    /// The limited operation
    pub request_type_id: String,
    /// Peer address of the caller
    pub remote_addr: IpAddr,
    /// Authenticated principal, if any
    pub principal: Option<Principal>,
}

/// Port for identity classification.
pub trait ContextClassifier: Send + Sync + Debug {
    /// Build the request context for an incoming request.
    fn classify(&self, metadata: &RequestMetadata) -> Result<RequestContext, ConfigurationError>;
}

/// "Is set flag" parsing shared by configuration adapters.
///
/// Any stored value is set except the empty string and `"0"`; `"2"` and even
/// `"false"` read as set.
pub(crate) fn is_truthy(raw: &str) -> bool {
    !matches!(raw, "" | "0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::MemoryConfig;

    #[test]
    fn test_is_truthy() {
        for raw in ["1", "2", "true", "enabled", "false", "off", " ", "0.0"] {
            assert!(is_truthy(raw), "{raw:?} should be set");
        }
        for raw in ["", "0"] {
            assert!(!is_truthy(raw), "{raw:?} should not be set");
        }
    }

    #[test]
    fn test_is_set_flag_unset_path() {
        let config = MemoryConfig::new();
        assert!(!config.is_set_flag("sales/backpressure/enabled", Scope::Store).unwrap());

        config.set_scoped("sales/backpressure/enabled", Scope::Default, "2");
        assert!(config.is_set_flag("sales/backpressure/enabled", Scope::Store).unwrap());
    }
}
