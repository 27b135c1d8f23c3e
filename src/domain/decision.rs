//! Outcome of an admission check.

use crate::domain::context::RequestContext;
use serde::Serialize;
use std::time::Duration;

/// Decision returned to the caller of the admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AdmissionDecision {
    /// Let the request through
    Admitted,
    /// Turn the request away; surface as a rate-limited response
    Rejected(Rejection),
}

impl AdmissionDecision {
    /// Check if this decision is Admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionDecision::Admitted)
    }

    /// Check if this decision is Rejected.
    pub fn is_rejected(&self) -> bool {
        matches!(self, AdmissionDecision::Rejected(_))
    }

    /// The rejection details, if rejected.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            AdmissionDecision::Admitted => None,
            AdmissionDecision::Rejected(rejection) => Some(rejection),
        }
    }
}

/// Details of a rejected request.
///
/// Carries no counts: a caller learns when to retry, not how close it came.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    request_type_id: String,
    identity_key: String,
    #[serde(rename = "retry_after_secs", serialize_with = "serialize_retry_after")]
    retry_after: Option<Duration>,
}

impl Rejection {
    /// Build a rejection for the given request.
    pub fn new(context: &RequestContext, retry_after: Option<Duration>) -> Self {
        Self {
            request_type_id: context.request_type_id().to_string(),
            identity_key: context.identity_key().to_string(),
            retry_after,
        }
    }

    /// The limited operation.
    pub fn request_type_id(&self) -> &str {
        &self.request_type_id
    }

    /// The identity that ran out of quota.
    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    /// How long until a retry can succeed, if waiting helps at all.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Retry hint in whole seconds, rounded up, for a `Retry-After` header.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after.map(ceil_secs)
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}

fn serialize_retry_after<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(duration) => serializer.serialize_some(&ceil_secs(*duration)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_rounds_up() {
        let ctx = RequestContext::customer("42", "quote-order");
        let rejection = Rejection::new(&ctx, Some(Duration::from_millis(55_001)));
        assert_eq!(rejection.retry_after_secs(), Some(56));

        let exact = Rejection::new(&ctx, Some(Duration::from_secs(60)));
        assert_eq!(exact.retry_after_secs(), Some(60));

        let none = Rejection::new(&ctx, None);
        assert_eq!(none.retry_after_secs(), None);
    }

    #[test]
    fn test_decision_accessors() {
        let ctx = RequestContext::customer("42", "quote-order");
        let rejected = AdmissionDecision::Rejected(Rejection::new(&ctx, None));

        assert!(rejected.is_rejected());
        assert!(!rejected.is_admitted());
        assert_eq!(rejected.rejection().map(|r| r.identity_key()), Some("42"));
        assert!(AdmissionDecision::Admitted.rejection().is_none());
    }
}
