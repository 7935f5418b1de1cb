//! # Idgate Auth - Bearer Token Verification
//!
//! Verifies bearer tokens issued by an OpenID Connect identity provider
//! (AWS Cognito user pools first and foremost) against the provider's
//! published JSON Web Key Set.
//!
//! ## Architecture
//!
//! - [`config`] - Provider coordinates, derived issuer and JWKS endpoint
//! - [`jwks`] - [`KeyResolver`]: cached `kid` to signing key lookup with
//!   refresh on miss
//! - [`verifier`] - [`TokenVerifier`]: signature, expiry and issuer checks
//! - [`claims`] - [`TokenClaims`]: the decoded claim set, unmodified
//! - [`error`] - Configuration, resolver and verification errors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use idgate_auth::{TokenVerifier, VerificationConfig};
//!
//! # async fn run(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let config = VerificationConfig::cognito("us-east-1", "us-east-1_test123")?;
//! let verifier = TokenVerifier::from_config(&config)?;
//!
//! let claims = verifier.verify(token).await?;
//! println!("{:?} ({:?})", claims.username(), claims.email());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics` - Verification and JWKS refresh counters via the `metrics` facade
//! - `test-util` - Fixed RSA keys, token minting and a mock JWKS endpoint

pub mod claims;
pub mod config;
pub mod error;
pub mod jwks;
pub mod verifier;

#[cfg(feature = "metrics")]
pub mod auth_metrics;

#[cfg(feature = "test-util")]
pub mod testutil;

#[doc(inline)]
pub use claims::TokenClaims;
#[doc(inline)]
pub use config::VerificationConfig;
#[doc(inline)]
pub use error::{ConfigError, ResolverError, VerifyError};
#[doc(inline)]
pub use jwks::{Jwk, JwkSet, KeyResolver, KeySet, ResolverStats, SigningKey};
#[doc(inline)]
pub use verifier::TokenVerifier;

#[cfg(feature = "metrics")]
pub use auth_metrics::init_auth_metrics;
