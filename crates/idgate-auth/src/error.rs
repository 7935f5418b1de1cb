//! Error types for key resolution and token verification
//!
//! Three layers, each narrower than the one below it:
//!
//! - [`ConfigError`] - the verification configuration is absent or malformed
//! - [`ResolverError`] - the key resolver could not produce a signing key
//! - [`VerifyError`] - the classified outcome handed to request handlers
//!
//! Resolver failures never leak to callers as-is. They fold into
//! [`VerifyError::InvalidToken`] (or [`VerifyError::ServiceUnavailable`]) so a
//! caller cannot tell an unknown key apart from a forged token.

use thiserror::Error;

/// Verification configuration errors
///
/// Detected synchronously, before any network access.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting was not provided
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    /// A setting was provided but cannot be used
    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Name of the offending setting
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Key resolver errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolverError {
    /// The resolver was built without a usable configuration
    #[error("Identity provider configuration unavailable: {reason}")]
    ConfigurationUnavailable {
        /// Why the resolver is unusable
        reason: String,
    },

    /// The key identifier is not in the key set, even after a refresh
    #[error("Key not found: {kid}")]
    UnknownKey {
        /// The key identifier that was requested
        kid: String,
    },

    /// The key set could not be fetched or decoded
    #[error("JWKS fetch failed: {0}")]
    KeyFetch(String),
}

/// Classified token verification failure
///
/// Every variant except [`VerifyError::ServiceUnavailable`] is an
/// authentication failure (HTTP 401 at the boundary).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// The verifier cannot run at all (HTTP 503)
    #[error("Identity provider configuration not available")]
    ServiceUnavailable,

    /// Malformed structure, bad signature, disallowed algorithm or unresolvable key
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Signature is valid but `exp` is in the past
    #[error("Token has expired")]
    TokenExpired,

    /// Signature is valid but `iss` does not name the configured provider
    #[error("Invalid token issuer")]
    InvalidIssuer,
}

impl VerifyError {
    /// Whether this failure means "not authenticated" rather than "cannot check"
    pub fn is_unauthorized(&self) -> bool {
        !matches!(self, Self::ServiceUnavailable)
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable => "service_unavailable",
            Self::InvalidToken(_) => "invalid_token",
            Self::TokenExpired => "token_expired",
            Self::InvalidIssuer => "invalid_issuer",
        }
    }
}

/// Fixed reason used for every key resolution failure
pub(crate) const UNRESOLVED_KEY_REASON: &str = "unable to find a signing key that matches";

impl From<ResolverError> for VerifyError {
    fn from(err: ResolverError) -> Self {
        match err {
            ResolverError::ConfigurationUnavailable { .. } => Self::ServiceUnavailable,
            ResolverError::UnknownKey { .. } | ResolverError::KeyFetch(_) => {
                Self::InvalidToken(UNRESOLVED_KEY_REASON.to_string())
            }
        }
    }
}
