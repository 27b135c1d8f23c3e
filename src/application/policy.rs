//! Limit policies: which `(limit, window)` applies to a request.
//!
//! [`ScopedLimitPolicy`] reads its numbers from store-scoped configuration on
//! every call, so a changed setting applies to the very next request.
//! [`CompositeLimitPolicy`] routes each request type to its own policy.

use crate::application::ports::{Scope, ScopedConfig};
use crate::domain::context::{IdentityType, RequestContext};
use crate::domain::error::ConfigurationError;
use crate::domain::limit::LimitConfig;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Request type limited by the default order policy.
pub const ORDER_REQUEST_TYPE_ID: &str = "quote-order";

/// Store-scoped path of the authenticated limit.
pub const LIMIT_CONFIG_PATH: &str = "sales/backpressure/limit";

/// Store-scoped path of the guest limit.
pub const GUEST_LIMIT_CONFIG_PATH: &str = "sales/backpressure/guest_limit";

/// Store-scoped path of the window length in seconds.
pub const PERIOD_CONFIG_PATH: &str = "sales/backpressure/period";

/// Trait for resolving the limit that applies to a request.
pub trait LimitPolicy: Send + Sync + Debug {
    /// Resolve the limit and window for `context`.
    ///
    /// # Errors
    /// Returns `ConfigurationError` when the limit cannot be determined. This
    /// aborts the request; it never turns into an admit or a reject.
    fn resolve(&self, context: &RequestContext) -> Result<LimitConfig, ConfigurationError>;
}

/// Configuration paths read by [`ScopedLimitPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitPaths {
    /// Limit for authenticated callers (admins and customers)
    pub limit: String,
    /// Limit for anonymous callers
    pub guest_limit: String,
    /// Window length in seconds
    pub period: String,
}

impl Default for LimitPaths {
    fn default() -> Self {
        Self {
            limit: LIMIT_CONFIG_PATH.to_string(),
            guest_limit: GUEST_LIMIT_CONFIG_PATH.to_string(),
            period: PERIOD_CONFIG_PATH.to_string(),
        }
    }
}

/// Limit policy backed by store-scoped configuration.
///
/// Admins and customers share the authenticated limit; anonymous callers get
/// the guest limit. The window is shared by both classes.
#[derive(Debug, Clone)]
pub struct ScopedLimitPolicy {
    config: Arc<dyn ScopedConfig>,
    paths: LimitPaths,
}

impl ScopedLimitPolicy {
    /// Create a policy reading the default `sales/backpressure/*` paths.
    pub fn new(config: Arc<dyn ScopedConfig>) -> Self {
        Self::with_paths(config, LimitPaths::default())
    }

    /// Create a policy reading custom paths.
    pub fn with_paths(config: Arc<dyn ScopedConfig>, paths: LimitPaths) -> Self {
        Self { config, paths }
    }

    /// The paths this policy reads.
    pub fn paths(&self) -> &LimitPaths {
        &self.paths
    }

    fn authenticated_limit(&self) -> Result<u32, ConfigurationError> {
        self.read_u32(&self.paths.limit)
    }

    fn guest_limit(&self) -> Result<u32, ConfigurationError> {
        self.read_u32(&self.paths.guest_limit)
    }

    fn period(&self) -> Result<Duration, ConfigurationError> {
        let secs = self.read_u32(&self.paths.period)?;
        if secs == 0 {
            return Err(ConfigurationError::ZeroWindow {
                path: self.paths.period.clone(),
            });
        }
        Ok(Duration::from_secs(u64::from(secs)))
    }

    /// Unset or empty reads as 0.
    fn read_u32(&self, path: &str) -> Result<u32, ConfigurationError> {
        let raw = self.config.value(path, Scope::Store)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(0),
            Some(value) => value
                .parse::<u32>()
                .map_err(|_| ConfigurationError::MalformedValue {
                    path: path.to_string(),
                    value: value.to_string(),
                }),
        }
    }
}

impl LimitPolicy for ScopedLimitPolicy {
    fn resolve(&self, context: &RequestContext) -> Result<LimitConfig, ConfigurationError> {
        let limit = match context.identity_type() {
            IdentityType::Admin | IdentityType::Customer => self.authenticated_limit()?,
            IdentityType::AnonymousByAddress => self.guest_limit()?,
        };

        LimitConfig::with_window(limit, self.period()?)
    }
}

/// Routes each request type to the policy registered for it.
#[derive(Debug, Clone, Default)]
pub struct CompositeLimitPolicy {
    policies: HashMap<String, Arc<dyn LimitPolicy>>,
}

impl CompositeLimitPolicy {
    /// Create an empty composite.
    pub fn new() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    /// Register `policy` for `request_type_id`, replacing any previous one.
    pub fn with_policy(
        mut self,
        request_type_id: impl Into<String>,
        policy: Arc<dyn LimitPolicy>,
    ) -> Self {
        self.policies.insert(request_type_id.into(), policy);
        self
    }

    /// Whether a policy is registered for `request_type_id`.
    pub fn handles(&self, request_type_id: &str) -> bool {
        self.policies.contains_key(request_type_id)
    }
}

impl LimitPolicy for CompositeLimitPolicy {
    fn resolve(&self, context: &RequestContext) -> Result<LimitConfig, ConfigurationError> {
        let policy = self
            .policies
            .get(context.request_type_id())
            .ok_or_else(|| {
                ConfigurationError::UnknownRequestType(context.request_type_id().to_string())
            })?;
        policy.resolve(context)
    }
}
