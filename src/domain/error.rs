//! Error taxonomy for admission decisions.
//!
//! A rejected request is **not** an error: it is reported through
//! [`AdmissionDecision::Rejected`](crate::domain::decision::AdmissionDecision).
//! The types here cover the two ways a decision can fail to be made at all.

use std::time::Duration;

/// Misconfiguration detected while deciding. Fatal to the current request and
/// never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// The classifier produced an identity code outside the known set.
    #[error("identity type not found: {0}")]
    UnknownIdentityType(i64),

    /// No limit policy is registered for the request type.
    #[error("no limit policy registered for request type `{0}`")]
    UnknownRequestType(String),

    /// A numeric configuration value could not be parsed.
    #[error("malformed value `{value}` at `{path}`")]
    MalformedValue {
        /// Configuration path that was read
        path: String,
        /// Raw value found there
        value: String,
    },

    /// The configured window length is zero.
    #[error("window length at `{path}` must be greater than 0")]
    ZeroWindow {
        /// Configuration path that was read
        path: String,
    },

    /// The configuration source itself could not be read.
    #[error("configuration could not be read: {reason}")]
    Unreadable {
        /// Description of the underlying failure
        reason: String,
    },
}

impl ConfigurationError {
    /// Shorthand for [`ConfigurationError::Unreadable`].
    pub fn unreadable(reason: impl std::fmt::Display) -> Self {
        ConfigurationError::Unreadable {
            reason: reason.to_string(),
        }
    }
}

/// Failure of the request log's backing store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackingStoreError {
    /// The store could not be reached or returned an error.
    #[error("request log unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer within the configured timeout.
    #[error("request log timed out after {0:?}")]
    Timeout(Duration),

    /// The circuit breaker is open and the store is not being called.
    #[error("request log circuit is open")]
    CircuitOpen,
}

/// Step of the admission pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdmissionStage {
    /// Nothing evaluated yet
    Idle,
    /// The enforcement gate has been consulted
    EnforcementChecked,
    /// Limit and window are known
    PolicyResolved,
    /// The window count is known
    CountChecked,
}

impl std::fmt::Display for AdmissionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AdmissionStage::Idle => "idle",
            AdmissionStage::EnforcementChecked => "enforcement-checked",
            AdmissionStage::PolicyResolved => "policy-resolved",
            AdmissionStage::CountChecked => "count-checked",
        };
        f.write_str(name)
    }
}

/// Error returned by [`AdmissionController::check`](crate::AdmissionController::check).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// Configuration problem; surface as an internal error.
    #[error("admission failed at {stage}: {source}")]
    Configuration {
        /// Last stage reached before failing
        stage: AdmissionStage,
        /// Underlying error
        #[source]
        source: ConfigurationError,
    },

    /// Request log failure with the fail-closed policy in effect.
    #[error("admission failed at {stage}: {source}")]
    BackingStore {
        /// Last stage reached before failing
        stage: AdmissionStage,
        /// Underlying error
        #[source]
        source: BackingStoreError,
    },
}

impl AdmissionError {
    /// Stage at which the pipeline stopped.
    pub fn stage(&self) -> AdmissionStage {
        match self {
            AdmissionError::Configuration { stage, .. } => *stage,
            AdmissionError::BackingStore { stage, .. } => *stage,
        }
    }

    /// Whether this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, AdmissionError::Configuration { .. })
    }
}

/// Error returned when building an [`AdmissionController`](crate::AdmissionController) fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// No enforcement gate was supplied
    #[error("an enforcement gate is required")]
    MissingGate,
    /// No limit policy was supplied
    #[error("a limit policy is required")]
    MissingPolicy,
    /// Circuit breaker threshold must be greater than zero
    #[error("circuit breaker failure threshold must be greater than 0")]
    ZeroFailureThreshold,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_admission_error_keeps_source() {
        let err = AdmissionError::Configuration {
            stage: AdmissionStage::EnforcementChecked,
            source: ConfigurationError::UnknownIdentityType(7),
        };

        assert_eq!(err.stage(), AdmissionStage::EnforcementChecked);
        assert!(err.is_configuration());
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("identity type not found: 7".to_string())
        );
        assert_eq!(
            err.to_string(),
            "admission failed at enforcement-checked: identity type not found: 7"
        );
    }

    #[test]
    fn test_unreadable_shorthand() {
        let err = ConfigurationError::unreadable("permission denied");
        assert_eq!(
            err,
            ConfigurationError::Unreadable {
                reason: "permission denied".to_string()
            }
        );
    }
}
