//! Configuration adapters.
//!
//! Both adapters implement [`ScopedConfig`] and [`DeploymentConfig`] and
//! resolve scoped reads by falling back store → website → default.
//!
//! - [`MemoryConfig`]: values set at runtime, useful for tests and for
//!   embedding into an application that already has its own settings source.
//! - [`FileConfig`]: a TOML file, reloadable.
//!
//! ```toml
//! [deployment]
//! backpressure_logger = "redis"
//!
//! [backpressure]
//! enabled = true
//! limit = 10
//! guest_limit = 50
//! period = 60
//!
//! # Optional overrides, same keys as [backpressure]
//! [store.backpressure]
//! guest_limit = 5
//! ```

use crate::application::gate::{ENABLED_CONFIG_PATH, LOGGER_CONFIG_PATH};
use crate::application::policy::{
    GUEST_LIMIT_CONFIG_PATH, LIMIT_CONFIG_PATH, PERIOD_CONFIG_PATH,
};
use crate::application::ports::{DeploymentConfig, Scope, ScopedConfig};
use crate::domain::error::ConfigurationError;
use ahash::RandomState;
use dashmap::DashMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::RwLock;

/// Scopes consulted for a read at `scope`, most specific first.
fn fallback_chain(scope: Scope) -> &'static [Scope] {
    match scope {
        Scope::Store => &[Scope::Store, Scope::Website, Scope::Default],
        Scope::Website => &[Scope::Website, Scope::Default],
        Scope::Default => &[Scope::Default],
    }
}

/// In-memory configuration.
///
/// Writes are visible to the next read from any thread.
#[derive(Debug, Default)]
pub struct MemoryConfig {
    scoped: DashMap<(Scope, String), String, RandomState>,
    deployment: DashMap<String, String, RandomState>,
}

impl MemoryConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `path` at `scope`.
    pub fn set_scoped(&self, path: impl Into<String>, scope: Scope, value: impl Into<String>) {
        self.scoped.insert((scope, path.into()), value.into());
    }

    /// Unset `path` at `scope`; reads fall back to the next scope.
    pub fn unset_scoped(&self, path: &str, scope: Scope) {
        self.scoped.remove(&(scope, path.to_string()));
    }

    /// Set a deployment value.
    pub fn set_deployment(&self, path: impl Into<String>, value: impl Into<String>) {
        self.deployment.insert(path.into(), value.into());
    }

    /// Unset a deployment value.
    pub fn unset_deployment(&self, path: &str) {
        self.deployment.remove(path);
    }
}

impl ScopedConfig for MemoryConfig {
    fn value(&self, path: &str, scope: Scope) -> Result<Option<String>, ConfigurationError> {
        let found = fallback_chain(scope).iter().find_map(|&scope| {
            self.scoped
                .get(&(scope, path.to_string()))
                .map(|value| value.value().clone())
        });
        Ok(found)
    }
}

impl DeploymentConfig for MemoryConfig {
    fn get(&self, path: &str) -> Result<Option<String>, ConfigurationError> {
        Ok(self.deployment.get(path).map(|value| value.value().clone()))
    }
}

/// Backpressure section of the file, at one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackpressureSection {
    /// Store-level enable flag
    pub enabled: Option<bool>,
    /// Limit for authenticated callers
    pub limit: Option<u32>,
    /// Limit for anonymous callers
    pub guest_limit: Option<u32>,
    /// Window length in seconds
    pub period: Option<u64>,
}

impl BackpressureSection {
    fn value(&self, path: &str) -> Option<String> {
        match path {
            p if p == ENABLED_CONFIG_PATH => self
                .enabled
                .map(|enabled| if enabled { "1" } else { "0" }.to_string()),
            p if p == LIMIT_CONFIG_PATH => self.limit.map(|v| v.to_string()),
            p if p == GUEST_LIMIT_CONFIG_PATH => self.guest_limit.map(|v| v.to_string()),
            p if p == PERIOD_CONFIG_PATH => self.period.map(|v| v.to_string()),
            _ => None,
        }
    }
}

/// Deployment section of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentSection {
    /// Name of the configured request logger backend
    pub backpressure_logger: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScopeOverride {
    #[serde(default)]
    backpressure: BackpressureSection,
}

/// Parsed file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSettings {
    #[serde(default)]
    deployment: DeploymentSection,
    #[serde(default)]
    backpressure: BackpressureSection,
    #[serde(default)]
    website: ScopeOverride,
    #[serde(default)]
    store: ScopeOverride,
}

impl FileSettings {
    /// Deployment settings.
    pub fn deployment(&self) -> &DeploymentSection {
        &self.deployment
    }

    /// Backpressure settings at exactly `scope`, without fallback.
    pub fn section(&self, scope: Scope) -> &BackpressureSection {
        match scope {
            Scope::Default => &self.backpressure,
            Scope::Website => &self.website.backpressure,
            Scope::Store => &self.store.backpressure,
        }
    }
}

impl FromStr for FileSettings {
    type Err = ConfigurationError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        toml::from_str(content).map_err(ConfigurationError::unreadable)
    }
}

/// Configuration read from a TOML file.
#[derive(Debug)]
pub struct FileConfig {
    path: Option<PathBuf>,
    settings: RwLock<FileSettings>,
}

impl FileConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `ConfigurationError::Unreadable` if the file cannot be read or
    /// parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref().to_path_buf();
        let settings = Self::read(&path)?;
        Ok(Self {
            path: Some(path),
            settings: RwLock::new(settings),
        })
    }

    /// Parse configuration from TOML text. The result cannot be reloaded.
    ///
    /// # Errors
    /// Returns `ConfigurationError::Unreadable` on a parse error.
    pub fn from_toml(content: &str) -> Result<Self, ConfigurationError> {
        Ok(Self {
            path: None,
            settings: RwLock::new(content.parse()?),
        })
    }

    /// Re-read the file. On error the previous settings stay in effect.
    ///
    /// Does nothing for configuration parsed from text.
    ///
    /// # Errors
    /// Returns `ConfigurationError::Unreadable` if the file cannot be read or
    /// parsed.
    pub fn reload(&self) -> Result<(), ConfigurationError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let settings = Self::read(path)?;
        *self.settings.write().map_err(|_| poisoned())? = settings;
        tracing::info!(path = %path.display(), "backpressure configuration reloaded");
        Ok(())
    }

    /// A copy of the current settings.
    ///
    /// # Errors
    /// Returns `ConfigurationError::Unreadable` if the settings lock is
    /// poisoned.
    pub fn settings(&self) -> Result<FileSettings, ConfigurationError> {
        Ok(self.settings.read().map_err(|_| poisoned())?.clone())
    }

    fn read(path: &Path) -> Result<FileSettings, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::unreadable(format!("{}: {e}", path.display()))
        })?;
        content.parse()
    }
}

fn poisoned() -> ConfigurationError {
    ConfigurationError::unreadable("configuration lock poisoned")
}

impl ScopedConfig for FileConfig {
    fn value(&self, path: &str, scope: Scope) -> Result<Option<String>, ConfigurationError> {
        let settings = self.settings.read().map_err(|_| poisoned())?;
        Ok(fallback_chain(scope)
            .iter()
            .find_map(|&scope| settings.section(scope).value(path)))
    }
}

impl DeploymentConfig for FileConfig {
    fn get(&self, path: &str) -> Result<Option<String>, ConfigurationError> {
        let settings = self.settings.read().map_err(|_| poisoned())?;
        if path == LOGGER_CONFIG_PATH {
            return Ok(settings.deployment.backpressure_logger.clone());
        }
        Ok(None)
    }
}
