//! Identity of the caller a request is attributed to.
//!
//! A [`RequestContext`] is built once per incoming request by a
//! [`ContextClassifier`](crate::application::ports::ContextClassifier) and
//! never changes afterwards. Its [`RequestKey`] selects the counter in the
//! request log: counters are never shared across identities or request types.

use crate::domain::error::ConfigurationError;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// Class of caller a request is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityType {
    /// Authenticated back-office user
    Admin,
    /// Authenticated storefront customer
    Customer,
    /// Unauthenticated caller identified by network address
    AnonymousByAddress,
}

impl IdentityType {
    /// Wire code used by classifiers for anonymous callers.
    pub const CODE_ADDRESS: i64 = 0;
    /// Wire code used by classifiers for customers.
    pub const CODE_CUSTOMER: i64 = 1;
    /// Wire code used by classifiers for admins.
    pub const CODE_ADMIN: i64 = 2;

    /// Decode a raw identity code.
    ///
    /// # Errors
    /// Returns `ConfigurationError::UnknownIdentityType` for codes outside the
    /// known set.
    pub fn from_code(code: i64) -> Result<Self, ConfigurationError> {
        match code {
            Self::CODE_ADDRESS => Ok(IdentityType::AnonymousByAddress),
            Self::CODE_CUSTOMER => Ok(IdentityType::Customer),
            Self::CODE_ADMIN => Ok(IdentityType::Admin),
            other => Err(ConfigurationError::UnknownIdentityType(other)),
        }
    }

    /// Raw code for this identity type.
    pub fn code(&self) -> i64 {
        match self {
            IdentityType::AnonymousByAddress => Self::CODE_ADDRESS,
            IdentityType::Customer => Self::CODE_CUSTOMER,
            IdentityType::Admin => Self::CODE_ADMIN,
        }
    }

    /// Whether the caller is authenticated.
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, IdentityType::AnonymousByAddress)
    }
}

impl TryFrom<i64> for IdentityType {
    type Error = ConfigurationError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl fmt::Display for IdentityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentityType::Admin => "admin",
            IdentityType::Customer => "customer",
            IdentityType::AnonymousByAddress => "address",
        };
        f.write_str(name)
    }
}

/// Key of one sliding-window counter: `(request type, identity type, identity)`.
///
/// The identity type is part of the key so customer `5` and admin `5` are
/// counted separately. Cloning is cheap; the string parts are reference
/// counted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    request_type_id: Arc<str>,
    identity_type: IdentityType,
    identity_key: Arc<str>,
}

impl RequestKey {
    /// Create a key from its parts.
    pub fn new(
        request_type_id: impl Into<Arc<str>>,
        identity_type: IdentityType,
        identity_key: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            request_type_id: request_type_id.into(),
            identity_type,
            identity_key: identity_key.into(),
        }
    }

    /// The limited operation, e.g. `quote-order`.
    pub fn request_type_id(&self) -> &str {
        &self.request_type_id
    }

    /// Class of the caller.
    pub fn identity_type(&self) -> IdentityType {
        self.identity_type
    }

    /// The caller the counter belongs to.
    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.request_type_id, self.identity_type, self.identity_key
        )
    }
}

/// Identity descriptor for one incoming request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestContext {
    identity_type: IdentityType,
    key: RequestKey,
}

impl RequestContext {
    /// Create a context from already classified parts.
    pub fn new(
        identity_type: IdentityType,
        identity_key: impl Into<Arc<str>>,
        request_type_id: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            identity_type,
            key: RequestKey::new(request_type_id, identity_type, identity_key),
        }
    }

    /// Create a context from a raw identity code.
    ///
    /// # Errors
    /// Returns `ConfigurationError::UnknownIdentityType` if `identity_code` is
    /// not a known identity type.
    pub fn from_code(
        identity_code: i64,
        identity_key: impl Into<Arc<str>>,
        request_type_id: impl Into<Arc<str>>,
    ) -> Result<Self, ConfigurationError> {
        let identity_type = IdentityType::from_code(identity_code)?;
        Ok(Self::new(identity_type, identity_key, request_type_id))
    }

    /// Context for an anonymous caller, keyed by its normalized address.
    pub fn anonymous(addr: IpAddr, request_type_id: impl Into<Arc<str>>) -> Self {
        Self::new(
            IdentityType::AnonymousByAddress,
            normalize_address(addr),
            request_type_id,
        )
    }

    /// Context for an authenticated customer.
    pub fn customer(user_id: impl Into<Arc<str>>, request_type_id: impl Into<Arc<str>>) -> Self {
        Self::new(IdentityType::Customer, user_id, request_type_id)
    }

    /// Context for an authenticated admin.
    pub fn admin(user_id: impl Into<Arc<str>>, request_type_id: impl Into<Arc<str>>) -> Self {
        Self::new(IdentityType::Admin, user_id, request_type_id)
    }

    /// Identity class.
    pub fn identity_type(&self) -> IdentityType {
        self.identity_type
    }

    /// User id or normalized network address.
    pub fn identity_key(&self) -> &str {
        self.key.identity_key()
    }

    /// The limited operation.
    pub fn request_type_id(&self) -> &str {
        self.key.request_type_id()
    }

    /// Counter key for this request.
    pub fn key(&self) -> &RequestKey {
        &self.key
    }
}

/// Canonical string form of a caller address.
///
/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) collapse to plain IPv4 so a
/// dual-stack listener does not split one caller over two counters.
pub fn normalize_address(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
    }
}
