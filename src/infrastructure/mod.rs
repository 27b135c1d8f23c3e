//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Request logs (in-process sharded map, Redis)
//! - Configuration sources (memory, TOML file)
//! - Identity classification

pub mod classifier;
pub mod clock;
pub mod config;
pub mod memory_log;
pub mod storage;

#[cfg(feature = "redis-log")]
pub mod redis_log;

pub mod mocks;
