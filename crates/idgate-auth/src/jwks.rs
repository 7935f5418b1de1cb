//! JWKS (JSON Web Key Set) fetching, caching and key lookup
//!
//! The [`KeyResolver`] maps a key identifier (`kid`) to a [`SigningKey`]:
//!
//! - **Cache hit**: served from the current [`KeySet`] without network access
//! - **Cache miss**: the whole key set is fetched again, swapped in, and the
//!   lookup is retried exactly once
//! - **Unusable configuration**: every call fails fast with
//!   [`ResolverError::ConfigurationUnavailable`], nothing is fetched
//!
//! # Concurrency
//!
//! The cache is an `Arc<KeySet>` behind a `parking_lot::RwLock`. Locks are
//! held only to clone or replace the `Arc`, never across a fetch. Concurrent
//! misses may each refresh; the last writer wins and every reader sees a
//! complete key set.
//!
//! # Cooldown
//!
//! With a refresh cooldown configured, a refresh that completes without the
//! requested key (or fails) starts the cooldown. Misses inside it are answered
//! from the last fetched key set, even past its TTL, without fetching.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, DecodingKey};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::VerificationConfig;
use crate::error::{ConfigError, ResolverError};

/// Asymmetric algorithms a published key may carry
pub const ASYMMETRIC_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// Why a published JWK could not be turned into a [`SigningKey`]
#[derive(Debug, thiserror::Error)]
pub(crate) enum KeyParseError {
    #[error("missing 'kid'")]
    MissingKeyId,

    #[error("key is not meant for signatures (use = {0})")]
    NotForSignatures(String),

    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),
}

/// JSON Web Key as published in a key set document (RFC 7517)
///
/// Only the members needed to verify signatures are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (`RSA`, `EC`, ...)
    pub kty: String,

    /// Key identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Intended use (`sig`, `enc`)
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Algorithm the key is meant for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// RSA modulus (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// Key set document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwkSet {
    /// Published keys
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

impl Jwk {
    fn algorithm(&self) -> Result<Algorithm, KeyParseError> {
        let algorithm = match (&self.alg, self.kty.as_str()) {
            (Some(alg), _) => alg
                .parse::<Algorithm>()
                .map_err(|_| KeyParseError::UnsupportedAlgorithm(alg.clone()))?,
            (None, "RSA") => Algorithm::RS256,
            (None, "EC") => match self.crv.as_deref() {
                Some("P-256") => Algorithm::ES256,
                Some("P-384") => Algorithm::ES384,
                other => {
                    return Err(KeyParseError::UnsupportedAlgorithm(format!(
                        "curve {}",
                        other.unwrap_or("<none>")
                    )));
                }
            },
            (None, kty) => return Err(KeyParseError::UnsupportedKeyType(kty.to_string())),
        };

        if !ASYMMETRIC_ALGORITHMS.contains(&algorithm) {
            return Err(KeyParseError::UnsupportedAlgorithm(format!("{algorithm:?}")));
        }
        Ok(algorithm)
    }

    fn decoding_key(&self, algorithm: Algorithm) -> Result<DecodingKey, KeyParseError> {
        match (self.kty.as_str(), algorithm) {
            (
                "RSA",
                Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512,
            ) => {
                let n = self.n.as_deref().ok_or_else(|| {
                    KeyParseError::InvalidKeyFormat("RSA key missing 'n' parameter".into())
                })?;
                let e = self.e.as_deref().ok_or_else(|| {
                    KeyParseError::InvalidKeyFormat("RSA key missing 'e' parameter".into())
                })?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| KeyParseError::InvalidKeyFormat(e.to_string()))
            }
            ("EC", Algorithm::ES256 | Algorithm::ES384) => {
                let x = self.x.as_deref().ok_or_else(|| {
                    KeyParseError::InvalidKeyFormat("EC key missing 'x' parameter".into())
                })?;
                let y = self.y.as_deref().ok_or_else(|| {
                    KeyParseError::InvalidKeyFormat("EC key missing 'y' parameter".into())
                })?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| KeyParseError::InvalidKeyFormat(e.to_string()))
            }
            ("RSA" | "EC", algorithm) => Err(KeyParseError::UnsupportedAlgorithm(format!(
                "{algorithm:?} for key type {}",
                self.kty
            ))),
            (kty, _) => Err(KeyParseError::UnsupportedKeyType(kty.to_string())),
        }
    }

    pub(crate) fn to_signing_key(&self) -> Result<SigningKey, KeyParseError> {
        let kid = self.kid.clone().ok_or(KeyParseError::MissingKeyId)?;
        if let Some(key_use) = &self.key_use
            && key_use != "sig"
        {
            return Err(KeyParseError::NotForSignatures(key_use.clone()));
        }
        let algorithm = self.algorithm()?;
        let key = self.decoding_key(algorithm)?;
        Ok(SigningKey {
            kid,
            algorithm,
            key,
        })
    }
}

/// A published public key, ready for signature verification
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: Algorithm,
    key: DecodingKey,
}

impl SigningKey {
    /// Key identifier
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm this key verifies
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Key material
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Keys of one fetched key set document, indexed by `kid`
#[derive(Debug, Clone)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Instant,
}

impl KeySet {
    /// Build a key set from a document, skipping keys that cannot verify signatures
    pub fn from_jwks(document: &JwkSet) -> Self {
        let mut keys = HashMap::with_capacity(document.keys.len());
        for jwk in &document.keys {
            match jwk.to_signing_key() {
                Ok(key) => {
                    debug!(kid = %key.kid, kty = %jwk.kty, algorithm = ?key.algorithm, "Parsed JWK");
                    keys.insert(key.kid.clone(), Arc::new(key));
                }
                Err(e) => {
                    warn!(kid = ?jwk.kid, kty = %jwk.kty, error = %e, "Skipping unusable JWK");
                }
            }
        }
        Self {
            keys,
            fetched_at: Instant::now(),
        }
    }

    /// Look up a key
    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    /// Number of usable keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set has no usable keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key identifiers in the set
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Snapshot of resolver activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Lookups served from the cache
    pub cache_hits: u64,
    /// Lookups that missed the cache
    pub cache_misses: u64,
    /// Successful key set fetches
    pub refreshes: u64,
    /// Failed key set fetches
    pub fetch_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    refreshes: AtomicU64,
    fetch_failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ResolverStats {
        ResolverStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
        }
    }
}

/// Network side of a configured resolver
struct JwksSource {
    jwks_url: Url,
    http_client: reqwest::Client,
    cache: RwLock<Option<Arc<KeySet>>>,
    cache_ttl: Option<Duration>,
    refresh_cooldown: Option<Duration>,
    cooldown_started: Mutex<Option<Instant>>,
}

impl JwksSource {
    fn current(&self) -> Option<Arc<KeySet>> {
        let cached = self.cache.read().clone()?;
        match self.cache_ttl {
            Some(ttl) if cached.age() >= ttl => {
                debug!(jwks_url = %self.jwks_url, "JWKS cache expired");
                None
            }
            _ => Some(cached),
        }
    }

    /// Lookup in the last fetched set, ignoring the TTL
    fn last_fetched(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.cache.read().as_ref()?.get(kid)
    }

    fn in_cooldown(&self) -> bool {
        match (self.refresh_cooldown, *self.cooldown_started.lock()) {
            (Some(cooldown), Some(started)) => started.elapsed() < cooldown,
            _ => false,
        }
    }

    /// Start the cooldown after an unproductive refresh
    fn start_cooldown(&self) {
        if self.refresh_cooldown.is_some() {
            *self.cooldown_started.lock() = Some(Instant::now());
        }
    }

    async fn fetch(&self) -> Result<KeySet, ResolverError> {
        info!(jwks_url = %self.jwks_url, "Fetching JWKS from endpoint");

        let response = self
            .http_client
            .get(self.jwks_url.as_str())
            .send()
            .await
            .map_err(|e| {
                error!(jwks_url = %self.jwks_url, error = %e, timeout = e.is_timeout(), "Failed to fetch JWKS");
                if e.is_timeout() {
                    ResolverError::KeyFetch("JWKS request timed out".to_string())
                } else {
                    ResolverError::KeyFetch(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(jwks_url = %self.jwks_url, status = %status, "JWKS endpoint returned error status");
            return Err(ResolverError::KeyFetch(format!(
                "JWKS endpoint returned status {status}"
            )));
        }

        let document: JwkSet = response.json().await.map_err(|e| {
            error!(jwks_url = %self.jwks_url, error = %e, "Failed to parse JWKS JSON");
            ResolverError::KeyFetch(format!("Invalid JWKS format: {e}"))
        })?;

        let key_set = KeySet::from_jwks(&document);
        if key_set.is_empty() {
            error!(jwks_url = %self.jwks_url, published = document.keys.len(), "No usable keys in JWKS");
            return Err(ResolverError::KeyFetch(
                "No usable signing keys in JWKS".to_string(),
            ));
        }

        info!(jwks_url = %self.jwks_url, key_count = key_set.len(), "Successfully fetched JWKS");
        Ok(key_set)
    }

    fn swap(&self, key_set: KeySet) -> Arc<KeySet> {
        let key_set = Arc::new(key_set);
        *self.cache.write() = Some(Arc::clone(&key_set));
        key_set
    }
}

enum ResolverState {
    Ready(JwksSource),
    Unavailable { reason: String },
}

/// Resolves key identifiers to the identity provider's signing keys
///
/// # Example
///
/// ```rust,no_run
/// # use idgate_auth::{KeyResolver, VerificationConfig};
/// # tokio_test::block_on(async {
/// let config = VerificationConfig::cognito("us-east-1", "us-east-1_test123")?;
/// let resolver = KeyResolver::new(&config)?;
///
/// let key = resolver.resolve("key-id-from-token-header").await?;
/// println!("verifying with {:?}", key.algorithm());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
pub struct KeyResolver {
    state: ResolverState,
    counters: Counters,
}

impl fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("KeyResolver");
        match &self.state {
            ResolverState::Ready(source) => debug
                .field("jwks_url", &source.jwks_url.as_str())
                .field("cache_ttl", &source.cache_ttl)
                .field("refresh_cooldown", &source.refresh_cooldown),
            ResolverState::Unavailable { reason } => debug.field("unavailable", reason),
        };
        debug.field("stats", &self.counters.snapshot()).finish()
    }
}

impl KeyResolver {
    /// Create a resolver for a validated configuration
    ///
    /// Nothing is fetched until the first [`resolve`](Self::resolve) or
    /// [`refresh`](Self::refresh).
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::ConfigurationUnavailable`] if the HTTP client
    /// cannot be built.
    pub fn new(config: &VerificationConfig) -> Result<Self, ResolverError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.jwks_timeout)
            .build()
            .map_err(|e| ResolverError::ConfigurationUnavailable {
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            state: ResolverState::Ready(JwksSource {
                jwks_url: config.jwks_url().clone(),
                http_client,
                cache: RwLock::new(None),
                cache_ttl: config.cache_ttl,
                refresh_cooldown: config.refresh_cooldown,
                cooldown_started: Mutex::new(None),
            }),
            counters: Counters::default(),
        })
    }

    /// Create a resolver that refuses every request
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: ResolverState::Unavailable {
                reason: reason.into(),
            },
            counters: Counters::default(),
        }
    }

    /// Create a resolver from the outcome of loading configuration
    ///
    /// Any failure yields the unusable state; the reason is logged once here.
    pub fn from_config(config: Result<VerificationConfig, ConfigError>) -> Self {
        let built = config
            .map_err(|e| e.to_string())
            .and_then(|config| Self::new(&config).map_err(|e| e.to_string()));

        match built {
            Ok(resolver) => resolver,
            Err(reason) => {
                warn!(reason = %reason, "Key resolver unavailable, token verification disabled");
                Self::unavailable(reason)
            }
        }
    }

    /// Whether the resolver can serve lookups
    pub fn is_available(&self) -> bool {
        matches!(self.state, ResolverState::Ready(_))
    }

    /// The JWKS endpoint, if configured
    pub fn jwks_url(&self) -> Option<&Url> {
        match &self.state {
            ResolverState::Ready(source) => Some(&source.jwks_url),
            ResolverState::Unavailable { .. } => None,
        }
    }

    fn source(&self) -> Result<&JwksSource, ResolverError> {
        match &self.state {
            ResolverState::Ready(source) => Ok(source),
            ResolverState::Unavailable { reason } => Err(ResolverError::ConfigurationUnavailable {
                reason: reason.clone(),
            }),
        }
    }

    /// Resolve a key identifier to a signing key
    ///
    /// On a miss the key set is fetched again and the lookup retried once.
    ///
    /// # Errors
    ///
    /// - [`ResolverError::ConfigurationUnavailable`] for an unusable resolver
    /// - [`ResolverError::KeyFetch`] if the refresh fails or times out
    /// - [`ResolverError::UnknownKey`] if the key is absent after the refresh,
    ///   or absent from the last fetched set while the cooldown runs
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, ResolverError> {
        let source = self.source()?;

        if let Some(key) = source.current().and_then(|set| set.get(kid)) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!(kid = %kid, "JWKS cache hit");
            return Ok(key);
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        if source.in_cooldown() {
            if let Some(key) = source.last_fetched(kid) {
                debug!(kid = %kid, "JWKS cooldown active, serving last fetched key");
                return Ok(key);
            }
            warn!(kid = %kid, "JWKS refresh suppressed by cooldown");
            return Err(ResolverError::UnknownKey {
                kid: kid.to_string(),
            });
        }

        let key_set = self.fetch_and_swap(source).await.inspect_err(|_| {
            source.start_cooldown();
        })?;
        key_set.get(kid).ok_or_else(|| {
            warn!(kid = %kid, "Key ID not found in JWKS after refresh");
            source.start_cooldown();
            ResolverError::UnknownKey {
                kid: kid.to_string(),
            }
        })
    }

    /// Fetch the key set now and replace the cache, returning the key count
    ///
    /// Useful to warm the cache at startup.
    ///
    /// # Errors
    ///
    /// Same as the refresh path of [`resolve`](Self::resolve).
    pub async fn refresh(&self) -> Result<usize, ResolverError> {
        let source = self.source()?;
        Ok(self.fetch_and_swap(source).await?.len())
    }

    async fn fetch_and_swap(&self, source: &JwksSource) -> Result<Arc<KeySet>, ResolverError> {
        match source.fetch().await {
            Ok(key_set) => {
                self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                crate::auth_metrics::record_jwks_refresh(true);
                Ok(source.swap(key_set))
            }
            Err(e) => {
                self.counters.fetch_failures.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                crate::auth_metrics::record_jwks_refresh(false);
                Err(e)
            }
        }
    }

    /// Identifiers in the current cache (empty when nothing is cached)
    pub fn cached_key_ids(&self) -> Vec<String> {
        let Ok(source) = self.source() else {
            return Vec::new();
        };
        let mut ids: Vec<String> = source
            .cache
            .read()
            .as_ref()
            .map(|set| set.key_ids().map(str::to_string).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Drop the cached key set
    pub fn clear(&self) {
        if let Ok(source) = self.source() {
            *source.cache.write() = None;
            debug!(jwks_url = %source.jwks_url, "JWKS cache cleared");
        }
    }

    /// Activity counters
    pub fn stats(&self) -> ResolverStats {
        self.counters.snapshot()
    }
}
