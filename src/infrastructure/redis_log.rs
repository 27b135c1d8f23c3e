//! Redis-backed request log.
//!
//! Lets several application instances share one set of windows, so a caller
//! cannot multiply its allowance by spreading requests over servers.
//!
//! ## Data model
//!
//! - One sorted set per key:
//!   `{prefix}{<request type>:<identity code>:<identity>}`. Scores are
//!   wall-clock epoch milliseconds, members are `<ms>-<seq>` so two events
//!   in the same millisecond are both kept.
//! - A companion counter `<sorted set key>:seq` supplies `seq`. The braces
//!   are a cluster hash tag; both keys land in one slot.
//! - Both keys expire one window after the last write, so idle identities
//!   clean themselves up.
//!
//! Every operation is a single Lua script, which makes `try_admit` atomic
//! across all instances.
//!
//! ## Runtime
//!
//! The [`RequestLog`] port is synchronous. Calls made inside a multi-threaded
//! tokio runtime block the current worker with `block_in_place`; calls from
//! outside any runtime spin up a temporary one. A current-thread runtime
//! cannot be blocked and gets `BackingStoreError::Unavailable`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use admission_throttle::{RedisLogConfig, RedisRequestLog};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RedisLogConfig {
//!         key_prefix: "shop:backpressure:".to_string(),
//!         timeout: Duration::from_millis(200),
//!         ..RedisLogConfig::default()
//!     };
//!     let log = RedisRequestLog::connect_with_config("redis://127.0.0.1/", config)
//!         .await
//!         .expect("Failed to connect to Redis");
//! }
//! ```

use crate::application::ports::RequestLog;
use crate::domain::context::RequestKey;
use crate::domain::error::BackingStoreError;
use crate::domain::window::WindowOutcome;
use redis::aio::ConnectionManager;
use redis::{Client, FromRedisValue, RedisError, Script};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::runtime::{Handle, RuntimeFlavor};

const COUNT_SCRIPT: &str = r"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
return redis.call('ZCOUNT', KEYS[1], '-inf', now)
";

const RECORD_SCRIPT: &str = r"
local seq = redis.call('INCR', KEYS[2])
redis.call('ZADD', KEYS[1], ARGV[1], ARGV[1] .. '-' .. seq)
redis.call('PEXPIRE', KEYS[1], ARGV[2])
redis.call('PEXPIRE', KEYS[2], ARGV[2])
return 1
";

const PRUNE_SCRIPT: &str = r"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
if redis.call('ZCARD', KEYS[1]) == 0 then
  redis.call('DEL', KEYS[1], KEYS[2])
end
return 1
";

// Returns {1, 0} when admitted, {0, retry_ms} when full (-1: unknown).
// Entries scored after `now` (another instance's clock ran ahead) count.
const TRY_ADMIT_SCRIPT: &str = r"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
local count = redis.call('ZCARD', KEYS[1])
if count < limit then
  local seq = redis.call('INCR', KEYS[2])
  redis.call('ZADD', KEYS[1], now, ARGV[1] .. '-' .. seq)
  redis.call('PEXPIRE', KEYS[1], window)
  redis.call('PEXPIRE', KEYS[2], window)
  return {1, 0}
end
local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
if oldest[2] then
  local age = math.max(0, now - tonumber(oldest[2]))
  return {0, window - age}
end
return {0, -1}
";

// Returns the ms until the oldest entry counted at `now` expires, or -1.
const RETRY_AFTER_SCRIPT: &str = r"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local oldest = redis.call('ZRANGEBYSCORE', KEYS[1], '(' .. (now - window), now, 'WITHSCORES', 'LIMIT', 0, 1)
if oldest[2] then
  local age = math.max(0, now - tonumber(oldest[2]))
  return window - age
end
return -1
";

/// Configuration for the Redis request log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisLogConfig {
    /// Key prefix for Redis keys (default: "backpressure:")
    pub key_prefix: String,
    /// Upper bound on one Redis round trip (default: 500ms)
    pub timeout: Duration,
    /// Expiry for keys written by `record`, which does not know the window
    /// (default: 1 hour)
    pub record_ttl: Duration,
}

impl Default for RedisLogConfig {
    fn default() -> Self {
        Self {
            key_prefix: "backpressure:".to_string(),
            timeout: Duration::from_millis(500),
            record_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Clone)]
struct Scripts {
    count: Script,
    record: Script,
    prune: Script,
    try_admit: Script,
    retry_after: Script,
}

impl Scripts {
    fn new() -> Self {
        Self {
            count: Script::new(COUNT_SCRIPT),
            record: Script::new(RECORD_SCRIPT),
            prune: Script::new(PRUNE_SCRIPT),
            try_admit: Script::new(TRY_ADMIT_SCRIPT),
            retry_after: Script::new(RETRY_AFTER_SCRIPT),
        }
    }
}

/// Request log shared through Redis.
#[derive(Clone)]
pub struct RedisRequestLog {
    connection: ConnectionManager,
    config: RedisLogConfig,
    scripts: Scripts,
    /// Monotonic instant paired with `anchor_millis` for timestamp mapping
    anchor: Instant,
    anchor_millis: i64,
}

impl fmt::Debug for RedisRequestLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisRequestLog")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisRequestLog {
    /// Connect to Redis with default configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisLogConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect_with_config(url: &str, config: RedisLogConfig) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        let anchor_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);

        Ok(Self {
            connection,
            config,
            scripts: Scripts::new(),
            anchor: Instant::now(),
            anchor_millis,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisLogConfig {
        &self.config
    }

    fn window_key(&self, key: &RequestKey) -> String {
        format!(
            "{}{{{}:{}:{}}}",
            self.config.key_prefix,
            key.request_type_id(),
            key.identity_type().code(),
            key.identity_key()
        )
    }

    fn seq_key(&self, key: &RequestKey) -> String {
        format!("{}:seq", self.window_key(key))
    }

    /// Map a monotonic instant onto wall-clock epoch milliseconds.
    fn epoch_millis(&self, instant: Instant) -> i64 {
        let offset = |d: Duration| i64::try_from(d.as_millis()).unwrap_or(i64::MAX);
        if instant >= self.anchor {
            self.anchor_millis
                .saturating_add(offset(instant - self.anchor))
        } else {
            self.anchor_millis
                .saturating_sub(offset(self.anchor - instant))
        }
    }

    fn millis(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis())
            .unwrap_or(i64::MAX)
            .max(1)
    }

    /// Run a script with the configured timeout.
    async fn invoke<T: FromRedisValue>(
        &self,
        script: &Script,
        key: &RequestKey,
        args: &[i64],
    ) -> Result<T, BackingStoreError> {
        let mut invocation = script.key(self.window_key(key));
        invocation.key(self.seq_key(key));
        for arg in args {
            invocation.arg(*arg);
        }

        let mut conn = self.connection.clone();
        match tokio::time::timeout(self.config.timeout, invocation.invoke_async(&mut conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(BackingStoreError::Unavailable(e.to_string())),
            Err(_) => Err(BackingStoreError::Timeout(self.config.timeout)),
        }
    }

    /// Drive an async operation to completion from synchronous code.
    fn block_on<T>(
        &self,
        fut: impl Future<Output = Result<T, BackingStoreError>>,
    ) -> Result<T, BackingStoreError> {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(fut))
            }
            Ok(_) => Err(BackingStoreError::Unavailable(
                "redis request log needs a multi-threaded tokio runtime".to_string(),
            )),
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| BackingStoreError::Unavailable(e.to_string()))?;
                runtime.block_on(fut)
            }
        }
    }

    fn log_failure(operation: &str, key: &RequestKey, error: &BackingStoreError) {
        tracing::warn!(%error, %key, operation, "redis request log call failed");
    }
}

impl RequestLog for RedisRequestLog {
    fn count(
        &self,
        key: &RequestKey,
        window: Duration,
        now: Instant,
    ) -> Result<u64, BackingStoreError> {
        let args = [self.epoch_millis(now), Self::millis(window)];
        let count: i64 = self
            .block_on(self.invoke(&self.scripts.count, key, &args))
            .inspect_err(|e| Self::log_failure("count", key, e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn record(&self, key: &RequestKey, now: Instant) -> Result<(), BackingStoreError> {
        let args = [
            self.epoch_millis(now),
            Self::millis(self.config.record_ttl),
        ];
        let _: i64 = self
            .block_on(self.invoke(&self.scripts.record, key, &args))
            .inspect_err(|e| Self::log_failure("record", key, e))?;
        Ok(())
    }

    fn prune(
        &self,
        key: &RequestKey,
        window: Duration,
        now: Instant,
    ) -> Result<(), BackingStoreError> {
        let args = [self.epoch_millis(now), Self::millis(window)];
        let _: i64 = self
            .block_on(self.invoke(&self.scripts.prune, key, &args))
            .inspect_err(|e| Self::log_failure("prune", key, e))?;
        Ok(())
    }

    fn retry_after(
        &self,
        key: &RequestKey,
        window: Duration,
        now: Instant,
    ) -> Result<Option<Duration>, BackingStoreError> {
        let args = [self.epoch_millis(now), Self::millis(window)];
        let retry_ms: i64 = self
            .block_on(self.invoke(&self.scripts.retry_after, key, &args))
            .inspect_err(|e| Self::log_failure("retry_after", key, e))?;
        Ok(u64::try_from(retry_ms)
            .ok()
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis))
    }

    fn try_admit(
        &self,
        key: &RequestKey,
        limit: u32,
        window: Duration,
        now: Instant,
    ) -> Result<WindowOutcome, BackingStoreError> {
        if limit == 0 {
            return Ok(WindowOutcome::Full { retry_after: None });
        }

        let args = [
            self.epoch_millis(now),
            Self::millis(window),
            i64::from(limit),
        ];
        let reply: Vec<i64> = self
            .block_on(self.invoke(&self.scripts.try_admit, key, &args))
            .inspect_err(|e| Self::log_failure("try_admit", key, e))?;

        match reply.as_slice() {
            [1, ..] => Ok(WindowOutcome::Admitted),
            [0, retry_ms] => Ok(WindowOutcome::Full {
                retry_after: u64::try_from(*retry_ms)
                    .ok()
                    .filter(|&ms| ms > 0)
                    .map(Duration::from_millis),
            }),
            other => Err(BackingStoreError::Unavailable(format!(
                "unexpected try_admit reply: {other:?}"
            ))),
        }
    }
}
