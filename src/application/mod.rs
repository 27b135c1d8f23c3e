//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Enforcement gate (is backpressure on at all)
//! - Limit policies (which limit applies)
//! - Admission controller (decision making)
//! - Circuit breaker and metrics around the request log
//! - Window sweeper (eviction of idle identities)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod circuit_breaker;
pub mod controller;
pub mod gate;
pub mod metrics;
pub mod policy;
pub mod ports;
pub mod sweeper;
