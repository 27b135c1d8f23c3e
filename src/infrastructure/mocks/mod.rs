//! Test doubles for the application ports.
//!
//! Compiled into every build so integration tests and downstream crates can
//! drive the controller deterministically.

pub mod clock;
pub mod request_log;

pub use clock::MockClock;
pub use request_log::FailingRequestLog;
