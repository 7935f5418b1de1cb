//! Verification configuration
//!
//! Derives the JWKS endpoint and the expected issuer from the identity
//! provider coordinates. Built once at process start and read-only after.

use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

/// Path of the key set document relative to the issuer
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Default bound on a single JWKS fetch
pub const DEFAULT_JWKS_TIMEOUT: Duration = Duration::from_secs(10);

/// Verification configuration for one identity provider instance
///
/// # Example
///
/// ```rust
/// use idgate_auth::VerificationConfig;
///
/// let config = VerificationConfig::cognito("us-east-1", "us-east-1_test123").unwrap();
/// assert_eq!(
///     config.expected_issuer(),
///     "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_test123"
/// );
/// assert_eq!(
///     config.jwks_url().as_str(),
///     "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_test123/.well-known/jwks.json"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationConfig {
    expected_issuer: String,
    jwks_url: Url,
    /// Bound on each JWKS fetch
    pub jwks_timeout: Duration,
    /// Optional cache lifetime; `None` refreshes only on a key miss
    pub cache_ttl: Option<Duration>,
    /// Optional minimum gap between miss-triggered refreshes
    pub refresh_cooldown: Option<Duration>,
    /// Leeway applied to `exp`
    pub clock_skew: Duration,
}

impl VerificationConfig {
    /// Configuration for an AWS Cognito user pool
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the region or pool id is empty, contains
    /// characters outside `[A-Za-z0-9_-]`, or the pool id does not belong to
    /// the region.
    pub fn cognito(region: &str, user_pool_id: &str) -> Result<Self, ConfigError> {
        let region = region.trim();
        let user_pool_id = user_pool_id.trim();

        validate_segment("region", region)?;
        validate_segment("user_pool_id", user_pool_id)?;

        if !user_pool_id.starts_with(&format!("{region}_")) {
            return Err(ConfigError::invalid(
                "user_pool_id",
                format!("pool id must be prefixed by the region '{region}_'"),
            ));
        }

        Self::from_issuer(&format!(
            "https://cognito-idp.{region}.amazonaws.com/{user_pool_id}"
        ))
    }

    /// Configuration for a generic provider publishing its keys under
    /// `<issuer>/.well-known/jwks.json`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the issuer is empty or the derived JWKS URL
    /// is not an acceptable endpoint.
    pub fn from_issuer(issuer: &str) -> Result<Self, ConfigError> {
        let issuer = issuer.trim().trim_end_matches('/');
        if issuer.is_empty() {
            return Err(ConfigError::Missing("issuer"));
        }
        Self::new(issuer, &format!("{issuer}{JWKS_PATH}"))
    }

    /// Fully explicit configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the issuer is empty, the JWKS URL does not
    /// parse, or it uses plain HTTP against a non-loopback host.
    pub fn new(expected_issuer: &str, jwks_url: &str) -> Result<Self, ConfigError> {
        if expected_issuer.trim().is_empty() {
            return Err(ConfigError::Missing("issuer"));
        }

        let jwks_url = Url::parse(jwks_url)
            .map_err(|e| ConfigError::invalid("jwks_url", e.to_string()))?;
        validate_jwks_url(&jwks_url)?;

        Ok(Self {
            expected_issuer: expected_issuer.to_string(),
            jwks_url,
            jwks_timeout: DEFAULT_JWKS_TIMEOUT,
            cache_ttl: None,
            refresh_cooldown: None,
            clock_skew: Duration::ZERO,
        })
    }

    /// Set the JWKS fetch timeout
    pub fn with_jwks_timeout(mut self, timeout: Duration) -> Self {
        self.jwks_timeout = timeout;
        self
    }

    /// Expire the cached key set after `ttl`
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Suppress miss-triggered refreshes for `cooldown` after one that failed
    /// or did not find the requested key
    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = Some(cooldown);
        self
    }

    /// Set the clock skew leeway for `exp`
    pub fn with_clock_skew(mut self, leeway: Duration) -> Self {
        self.clock_skew = leeway;
        self
    }

    /// The `iss` value every accepted token must carry
    pub fn expected_issuer(&self) -> &str {
        &self.expected_issuer
    }

    /// Where the key set is published
    pub fn jwks_url(&self) -> &Url {
        &self.jwks_url
    }
}

fn validate_segment(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Missing(field));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::invalid(
            field,
            "only ASCII letters, digits, '-' and '_' are allowed",
        ));
    }
    Ok(())
}

fn validate_jwks_url(url: &Url) -> Result<(), ConfigError> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if is_loopback(url) => Ok(()),
        "http" => Err(ConfigError::invalid(
            "jwks_url",
            "JWKS endpoint must use HTTPS (HTTP only allowed for loopback hosts)",
        )),
        other => Err(ConfigError::invalid(
            "jwks_url",
            format!("unsupported scheme '{other}'"),
        )),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain == "localhost",
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cognito_derivation() {
        let config = VerificationConfig::cognito("eu-west-2", "eu-west-2_AbC123").unwrap();
        assert_eq!(
            config.expected_issuer(),
            "https://cognito-idp.eu-west-2.amazonaws.com/eu-west-2_AbC123"
        );
        assert_eq!(
            config.jwks_url().as_str(),
            "https://cognito-idp.eu-west-2.amazonaws.com/eu-west-2_AbC123/.well-known/jwks.json"
        );
        assert_eq!(config.jwks_timeout, DEFAULT_JWKS_TIMEOUT);
        assert_eq!(config.cache_ttl, None);
        assert_eq!(config.refresh_cooldown, None);
        assert_eq!(config.clock_skew, Duration::ZERO);
    }

    #[test]
    fn test_cognito_rejects_missing_values() {
        assert_eq!(
            VerificationConfig::cognito("us-east-1", ""),
            Err(ConfigError::Missing("user_pool_id"))
        );
        assert_eq!(
            VerificationConfig::cognito("  ", "us-east-1_x"),
            Err(ConfigError::Missing("region"))
        );
    }

    #[test]
    fn test_cognito_rejects_malformed_values() {
        assert!(VerificationConfig::cognito("us-east-1", "us-east-1_x/../y").is_err());
        assert!(VerificationConfig::cognito("us east 1", "us east 1_x").is_err());
        // Pool from another region
        assert!(VerificationConfig::cognito("us-east-1", "eu-west-1_abc").is_err());
    }

    #[test]
    fn test_from_issuer_trims_trailing_slash() {
        let config = VerificationConfig::from_issuer("https://idp.example/tenant/").unwrap();
        assert_eq!(config.expected_issuer(), "https://idp.example/tenant");
        assert_eq!(
            config.jwks_url().as_str(),
            "https://idp.example/tenant/.well-known/jwks.json"
        );
    }

    #[test]
    fn test_plain_http_only_for_loopback() {
        assert!(VerificationConfig::from_issuer("http://localhost:9000/pool").is_ok());
        assert!(VerificationConfig::from_issuer("http://127.0.0.1:9000/pool").is_ok());
        assert!(VerificationConfig::from_issuer("http://[::1]:9000/pool").is_ok());
        assert!(matches!(
            VerificationConfig::from_issuer("http://idp.example/pool"),
            Err(ConfigError::Invalid { field: "jwks_url", .. })
        ));
        assert!(VerificationConfig::new("iss", "ftp://idp.example/jwks").is_err());
        assert!(VerificationConfig::new("iss", "not a url").is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let config = VerificationConfig::from_issuer("https://idp.example/pool")
            .unwrap()
            .with_jwks_timeout(Duration::from_secs(2))
            .with_cache_ttl(Duration::from_secs(600))
            .with_refresh_cooldown(Duration::from_secs(5))
            .with_clock_skew(Duration::from_secs(30));

        assert_eq!(config.jwks_timeout, Duration::from_secs(2));
        assert_eq!(config.cache_ttl, Some(Duration::from_secs(600)));
        assert_eq!(config.refresh_cooldown, Some(Duration::from_secs(5)));
        assert_eq!(config.clock_skew, Duration::from_secs(30));
    }
}
