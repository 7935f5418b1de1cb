//! Bearer token verification
//!
//! One pass, no retries:
//!
//! 1. Availability: an unusable [`KeyResolver`] fails with
//!    [`VerifyError::ServiceUnavailable`]
//! 2. Key identification: `kid` is read from the unverified header
//! 3. Key resolution through the [`KeyResolver`]
//! 4. Signature, algorithm and `exp` checks (audience deliberately not checked)
//! 5. Issuer check, only after the signature is known to be good
//! 6. The decoded claims are returned unmodified

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Validation, decode, decode_header};
use tracing::{debug, warn};

use crate::claims::TokenClaims;
use crate::config::VerificationConfig;
use crate::error::{ConfigError, ResolverError, VerifyError};
use crate::jwks::{ASYMMETRIC_ALGORITHMS, KeyResolver};

/// Verifies bearer tokens issued by one identity provider instance
///
/// # Example
///
/// ```rust,no_run
/// # use idgate_auth::{TokenVerifier, VerificationConfig, VerifyError};
/// # tokio_test::block_on(async {
/// let config = VerificationConfig::cognito("us-east-1", "us-east-1_test123")?;
/// let verifier = TokenVerifier::from_config(&config)?;
///
/// match verifier.verify("eyJraWQiOi...").await {
///     Ok(claims) => println!("user {:?}", claims.subject()),
///     Err(VerifyError::TokenExpired) => println!("expired"),
///     Err(e) => println!("rejected: {e}"),
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    resolver: Arc<KeyResolver>,
    expected_issuer: String,
    clock_skew: Duration,
}

impl TokenVerifier {
    /// Create a verifier around a shared resolver
    pub fn new(resolver: Arc<KeyResolver>, expected_issuer: impl Into<String>) -> Self {
        Self {
            resolver,
            expected_issuer: expected_issuer.into(),
            clock_skew: Duration::ZERO,
        }
    }

    /// Create a verifier and its resolver from a configuration
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::ConfigurationUnavailable`] if the resolver
    /// cannot be built.
    pub fn from_config(config: &VerificationConfig) -> Result<Self, ResolverError> {
        let resolver = Arc::new(KeyResolver::new(config)?);
        Ok(Self::new(resolver, config.expected_issuer()).with_clock_skew(config.clock_skew))
    }

    /// Create a verifier from the outcome of loading configuration
    ///
    /// A configuration error yields a verifier whose every call fails with
    /// [`VerifyError::ServiceUnavailable`].
    pub fn from_config_result(config: Result<VerificationConfig, ConfigError>) -> Self {
        match config {
            Ok(config) => {
                let resolver = Arc::new(KeyResolver::from_config(Ok(config.clone())));
                Self::new(resolver, config.expected_issuer()).with_clock_skew(config.clock_skew)
            }
            Err(e) => Self::new(Arc::new(KeyResolver::from_config(Err(e))), String::new()),
        }
    }

    /// Set the leeway applied to `exp`
    pub fn with_clock_skew(mut self, leeway: Duration) -> Self {
        self.clock_skew = leeway;
        self
    }

    /// The `iss` value accepted tokens must carry
    pub fn expected_issuer(&self) -> &str {
        &self.expected_issuer
    }

    /// The underlying key resolver
    pub fn resolver(&self) -> &Arc<KeyResolver> {
        &self.resolver
    }

    /// Verify a raw bearer token and return its claims
    ///
    /// # Errors
    ///
    /// - [`VerifyError::ServiceUnavailable`] if the resolver is unusable
    /// - [`VerifyError::TokenExpired`] if the signature is good but `exp` has passed
    /// - [`VerifyError::InvalidIssuer`] if the signature is good but `iss` is wrong
    /// - [`VerifyError::InvalidToken`] for everything else
    pub async fn verify(&self, token: &str) -> Result<TokenClaims, VerifyError> {
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let result = self.verify_inner(token).await;

        match &result {
            Ok(_) => debug!("Token verified"),
            Err(VerifyError::ServiceUnavailable) => {
                warn!("Token verification unavailable: identity provider not configured");
            }
            Err(e) => debug!(kind = e.kind(), "Token rejected"),
        }

        #[cfg(feature = "metrics")]
        crate::auth_metrics::record_token_verification(&result, started.elapsed());

        result
    }

    async fn verify_inner(&self, token: &str) -> Result<TokenClaims, VerifyError> {
        if !self.resolver.is_available() {
            return Err(VerifyError::ServiceUnavailable);
        }

        let header = decode_header(token)
            .map_err(|e| VerifyError::InvalidToken(format!("malformed token: {e}")))?;

        if !ASYMMETRIC_ALGORITHMS.contains(&header.alg) {
            return Err(VerifyError::InvalidToken(format!(
                "algorithm {:?} not allowed",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| VerifyError::InvalidToken("token header has no 'kid'".to_string()))?;

        let key = self.resolver.resolve(&kid).await.map_err(|e| {
            debug!(kid = %kid, error = %e, "Signing key not resolved");
            VerifyError::from(e)
        })?;

        // Pinned to the published key's algorithm; a header naming anything else fails
        let mut validation = Validation::new(key.algorithm());
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = self.clock_skew.as_secs();
        validation.set_required_spec_claims(&["exp"]);

        let token_data =
            decode::<TokenClaims>(token, key.decoding_key(), &validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::ExpiredSignature => VerifyError::TokenExpired,
                    _ => VerifyError::InvalidToken(e.to_string()),
                }
            })?;

        let claims = token_data.claims;
        if claims.issuer() != Some(self.expected_issuer.as_str()) {
            warn!(kid = %kid, "Token issuer mismatch");
            return Err(VerifyError::InvalidIssuer);
        }

        debug!(kid = %kid, algorithm = ?key.algorithm(), "Token signature and claims valid");
        Ok(claims)
    }
}
