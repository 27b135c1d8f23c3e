//! Domain layer - pure admission logic with no external dependencies.
//!
//! This layer contains the core concepts and invariants of backpressure:
//! - Caller identity and counter keys
//! - Resolved limits
//! - The sliding-window timestamp log
//! - Decisions and the error taxonomy
//!
//! All types in this layer are pure and easily testable.

pub mod context;
pub mod decision;
pub mod error;
pub mod limit;
pub mod window;
