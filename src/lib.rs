//! # admission-throttle
//!
//! Sliding-window backpressure for expensive operations, keyed by who is
//! calling.
//!
//! Each request is attributed to an identity (an admin or customer id, or the
//! caller's network address) and a request type such as `quote-order`. The
//! [`AdmissionController`] counts how many requests that identity made for
//! that request type in the trailing window and rejects once the configured
//! limit is reached. Rejections carry a retry hint; they are a normal outcome,
//! not an error.
//!
//! ## Quick Start
//!
//! ```rust
//! use admission_throttle::{
//!     AdmissionController, EnforcementGate, MemoryConfig, RequestContext, Scope,
//!     ScopedLimitPolicy, ORDER_REQUEST_TYPE_ID,
//! };
//! use std::net::{IpAddr, Ipv4Addr};
//! use std::sync::Arc;
//!
//! let config = Arc::new(MemoryConfig::new());
//! config.set_deployment("backpressure/logger", "memory");
//! config.set_scoped("sales/backpressure/enabled", Scope::Default, "1");
//! config.set_scoped("sales/backpressure/limit", Scope::Default, "10");
//! config.set_scoped("sales/backpressure/guest_limit", Scope::Default, "2");
//! config.set_scoped("sales/backpressure/period", Scope::Default, "60");
//!
//! let controller = AdmissionController::builder()
//!     .with_gate(EnforcementGate::new(config.clone(), config.clone()))
//!     .with_policy(Arc::new(ScopedLimitPolicy::new(config)))
//!     .build()
//!     .unwrap();
//!
//! let guest = RequestContext::anonymous(
//!     IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)),
//!     ORDER_REQUEST_TYPE_ID,
//! );
//! assert!(controller.check(&guest).unwrap().is_admitted());
//! assert!(controller.check(&guest).unwrap().is_admitted());
//!
//! let decision = controller.check(&guest).unwrap();
//! assert!(decision.is_rejected());
//! assert_eq!(decision.rejection().unwrap().retry_after_secs(), Some(60));
//! ```
//!
//! ## How a decision is made
//!
//! 1. **Enforcement gate.** Nothing is counted unless a request logger is
//!    configured for the deployment *and* the store flag is set. Both are
//!    read on every request.
//! 2. **Limit policy.** Authenticated callers get `limit`, anonymous ones get
//!    `guest_limit`; both share `period` seconds as the window. A limit of 0
//!    rejects every request.
//! 3. **Request log.** Counts the identity's requests in
//!    `(now - window, now]`. Below the limit the request is admitted and
//!    recorded; otherwise it is rejected and nothing is recorded.
//!
//! A misconfiguration (malformed number, zero period, unknown identity code)
//! aborts the request with [`AdmissionError::Configuration`]; it never
//! silently admits or rejects.
//!
//! ## Counting modes
//!
//! [`CountingMode::Atomic`] (default) checks and records in one log operation
//! and never admits more than `limit` per window, even under concurrent
//! requests from one identity. [`CountingMode::CountThenRecord`] makes two
//! calls; concurrent requests near the limit can all be admitted.
//!
//! ## Fail-Safe Operation
//!
//! When the request log fails (Redis down, timeout), the default
//! [`FailurePolicy::FailOpen`] admits the request without recording it and
//! logs a warning. A circuit breaker stops calling a failing log until its
//! recovery timeout passes:
//!
//! ```rust,no_run
//! # use admission_throttle::{AdmissionController, CircuitState};
//! # fn inspect(controller: &AdmissionController) {
//! match controller.circuit_breaker().state() {
//!     CircuitState::Closed => println!("Normal operation"),
//!     CircuitState::Open => println!("Failing open - admitting without counting"),
//!     CircuitState::HalfOpen => println!("Testing recovery"),
//! }
//! # }
//! ```
//!
//! Use [`FailurePolicy::FailClosed`] to surface
//! [`AdmissionError::BackingStore`] to the caller instead.
//!
//! ## Observability
//!
//! ```rust,no_run
//! # use admission_throttle::AdmissionController;
//! # fn report(controller: &AdmissionController) {
//! let snapshot = controller.metrics().snapshot();
//! println!("Admitted: {}", snapshot.admitted);
//! println!("Rejected: {}", snapshot.rejected);
//! println!("Rejection rate: {:.2}%", snapshot.rejection_rate() * 100.0);
//! # }
//! ```
//!
//! Decisions are also emitted as `tracing` events inside an `admission` span:
//! `debug` for admits and bypasses, `info` for rejections, `warn` for a
//! degraded (fail-open) admit, `error` for configuration failures.
//!
//! ## Memory Management
//!
//! The in-memory log keeps one timestamp per admitted request for at most one
//! window per identity. Keys that go quiet are removed lazily on their next
//! touch, or eagerly by a [`WindowSweeper`]:
//!
//! ```rust,no_run
//! # #[cfg(feature = "async")]
//! # async fn run() {
//! use admission_throttle::{MemoryRequestLog, SweeperConfig, SystemClock, WindowSweeper};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let log = Arc::new(MemoryRequestLog::new());
//! let config = SweeperConfig::new(Duration::from_secs(60), Duration::from_secs(3600)).unwrap();
//! let handle = WindowSweeper::new(log.clone(), Arc::new(SystemClock::new()), config).start();
//!
//! // ... hand `log` to the controller builder ...
//!
//! handle.shutdown().await.expect("shutdown failed");
//! # }
//! ```
//!
//! ## Distributed Enforcement
//!
//! With the `redis-log` feature, `RedisRequestLog` keeps windows in Redis
//! sorted sets so every application instance sees the same counts.

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    context::{normalize_address, IdentityType, RequestContext, RequestKey},
    decision::{AdmissionDecision, Rejection},
    error::{AdmissionError, AdmissionStage, BackingStoreError, BuildError, ConfigurationError},
    limit::LimitConfig,
    window::{SlidingWindow, WindowOutcome},
};

pub use application::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    controller::{AdmissionController, AdmissionControllerBuilder, CountingMode, FailurePolicy},
    gate::{EnforcementGate, EnforcementState, ENABLED_CONFIG_PATH, LOGGER_CONFIG_PATH},
    metrics::{Metrics, MetricsSnapshot},
    policy::{
        CompositeLimitPolicy, LimitPaths, LimitPolicy, ScopedLimitPolicy,
        GUEST_LIMIT_CONFIG_PATH, LIMIT_CONFIG_PATH, ORDER_REQUEST_TYPE_ID, PERIOD_CONFIG_PATH,
    },
    ports::{
        Clock, ContextClassifier, DeploymentConfig, Principal, RequestLog, RequestMetadata, Scope,
        ScopedConfig,
    },
    sweeper::{SweeperConfig, SweeperConfigError, WindowSweeper},
};

#[cfg(feature = "async")]
pub use application::sweeper::{ShutdownError, SweeperHandle};

pub use infrastructure::{
    classifier::DefaultClassifier,
    clock::SystemClock,
    config::{FileConfig, FileSettings, MemoryConfig},
    memory_log::MemoryRequestLog,
    mocks::{FailingRequestLog, MockClock},
};

#[cfg(feature = "redis-log")]
pub use infrastructure::redis_log::{RedisLogConfig, RedisRequestLog};
