//! Enforcement gate.
//!
//! Enforcement runs only when the deployment has a request logger configured
//! **and** the store has backpressure enabled. Both settings are read on every
//! call so a store toggle takes effect without a restart.

use crate::application::ports::{DeploymentConfig, Scope, ScopedConfig};
use crate::domain::error::ConfigurationError;
use std::sync::Arc;

/// Deployment path naming the configured request logger.
pub const LOGGER_CONFIG_PATH: &str = "backpressure/logger";

/// Store-scoped path of the enabled flag.
pub const ENABLED_CONFIG_PATH: &str = "sales/backpressure/enabled";

/// Snapshot of both gate inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnforcementState {
    /// A logger backend is configured for the deployment
    pub logger_configured: bool,
    /// The store-level flag is set
    pub store_enabled: bool,
}

impl EnforcementState {
    /// Whether enforcement applies.
    pub fn is_active(&self) -> bool {
        self.logger_configured && self.store_enabled
    }
}

/// Two-layer switch in front of the admission pipeline.
#[derive(Debug, Clone)]
pub struct EnforcementGate {
    deployment: Arc<dyn DeploymentConfig>,
    config: Arc<dyn ScopedConfig>,
}

impl EnforcementGate {
    /// Create a gate over the deployment and store configuration.
    pub fn new(deployment: Arc<dyn DeploymentConfig>, config: Arc<dyn ScopedConfig>) -> Self {
        Self { deployment, config }
    }

    /// Whether enforcement is active right now.
    ///
    /// The store flag is not read when no logger is configured.
    ///
    /// # Errors
    /// A failure to read either setting is returned as-is; it never reads as
    /// "inactive".
    pub fn is_active(&self) -> Result<bool, ConfigurationError> {
        if !self.logger_configured()? {
            return Ok(false);
        }
        self.config.is_set_flag(ENABLED_CONFIG_PATH, Scope::Store)
    }

    /// Read both inputs, for diagnostics.
    ///
    /// # Errors
    /// Returns the first read failure.
    pub fn state(&self) -> Result<EnforcementState, ConfigurationError> {
        Ok(EnforcementState {
            logger_configured: self.logger_configured()?,
            store_enabled: self.config.is_set_flag(ENABLED_CONFIG_PATH, Scope::Store)?,
        })
    }

    fn logger_configured(&self) -> Result<bool, ConfigurationError> {
        Ok(self
            .deployment
            .get(LOGGER_CONFIG_PATH)?
            .is_some_and(|logger| !logger.trim().is_empty()))
    }
}
