//! Default identity classification.

use crate::application::ports::{ContextClassifier, RequestMetadata};
use crate::domain::context::{IdentityType, RequestContext};
use crate::domain::error::ConfigurationError;

/// Classifies by session principal, falling back to the peer address.
///
/// - A principal with the customer or admin code is keyed by its user id.
/// - No principal, or a principal carrying the address code, is keyed by the
///   normalized remote address.
/// - Any other code is a configuration error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl DefaultClassifier {
    /// Create the classifier.
    pub fn new() -> Self {
        Self
    }
}

impl ContextClassifier for DefaultClassifier {
    fn classify(&self, metadata: &RequestMetadata) -> Result<RequestContext, ConfigurationError> {
        let request_type_id = metadata.request_type_id.as_str();
        let Some(principal) = &metadata.principal else {
            return Ok(RequestContext::anonymous(metadata.remote_addr, request_type_id));
        };

        match IdentityType::from_code(principal.identity_code)? {
            IdentityType::AnonymousByAddress => {
                Ok(RequestContext::anonymous(metadata.remote_addr, request_type_id))
            }
            identity_type => Ok(RequestContext::new(
                identity_type,
                principal.user_id.as_str(),
                request_type_id,
            )),
        }
    }
}
