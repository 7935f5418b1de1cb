//! Shared test fixtures for token verification.
//!
//! Fixed RSA key pairs (so no key generation at test time), helpers to mint
//! RS256 tokens with a chosen `kid`, and a [`MockIdentityProvider`] that
//! serves a key set document over `wiremock`. Feature-gated behind
//! `test-util` to keep it out of production builds.
//!
//! ```toml
//! [dev-dependencies]
//! idgate-auth = { path = "../idgate-auth", features = ["test-util"] }
//! ```

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::{JWKS_PATH, VerificationConfig};

/// User pool used by the fixtures
pub const TEST_POOL_ID: &str = "us-east-1_test123";

/// RSA public exponent of both fixture keys (65537)
pub const RSA_EXPONENT: &str = "AQAB";

const PRIMARY_PEM: &str = include_str!("../testdata/primary_rsa.pem");
const PRIMARY_MODULUS: &str = "tKYXJW_A4uV-pHoomZq4Uf39S059DmOPwqAg4QCFgDdnbTrCjv0IBmZ84CWCr9Oi6aimuFYxqTcPXED57pSmtjd-6TTl9hppIkkFAyaDFyNQGHraHqNie32wKzHEeS51gOk_16dCQj8RHwr1GsGquRraWbs8wPtPp0YMEvEdS8Y_g5qUdIPCgtLIR6H_WWzEyUjiddgR78U-173a5BbQYeLnBCVktL66fpUQq9hbd6rgwowoEvOYK_4spxkFTAjrGkXOS1thACmRk1nscAIJKt2UORouR9XYgb5-yjBId800pEptdyim46Sjr6YoSOQjffOy5x5Z92Zridj3Xt9uCw";

const ROGUE_PEM: &str = include_str!("../testdata/rogue_rsa.pem");
const ROGUE_MODULUS: &str = "r76ww8xeZcTCxae0VHrIJxiHJ36fQRHKV516d6HbXs9DPs0NV0Iyh5Y0xOnqu_COEXXkmleGa89tGQJTTvl3dY9Wu-6AtF5egIEFF5HGwF-KTR9PiEqzfycN8IQBpfPJ5YfglSNR5ARfyXWAfQTqFrr6jVlyb8ARGc51svHaRFp9AfWEJSLML4KiHrdBQ5Bx5hQJxSORCFZkt9bb8FpQnlELbEUd2Why5S7La1mlgq_5PhwmKb0Er0GzrbKrEbFe_xmCT9nGSLUbv33hLGwR580QpMz-y84v2rweeKv4YxNoPxHjJFmP1QQRMjhfVQb2CUhMhvQVjrdr7G2rl-F_Fw";

/// An RSA key pair with a key identifier
#[derive(Debug, Clone)]
pub struct TestKey {
    kid: String,
    private_pem: &'static str,
    modulus: &'static str,
}

impl TestKey {
    /// The key the mock provider normally publishes (`kid = "test-key-1"`)
    pub fn primary() -> Self {
        Self {
            kid: "test-key-1".to_string(),
            private_pem: PRIMARY_PEM,
            modulus: PRIMARY_MODULUS,
        }
    }

    /// A second, unrelated key pair (`kid = "rogue-key"`)
    pub fn rogue() -> Self {
        Self {
            kid: "rogue-key".to_string(),
            private_pem: ROGUE_PEM,
            modulus: ROGUE_MODULUS,
        }
    }

    /// Same key material under another identifier
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = kid.into();
        self
    }

    /// Key identifier
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Public half as a JWK
    pub fn jwk(&self) -> Value {
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "use": "sig",
            "alg": "RS256",
            "n": self.modulus,
            "e": RSA_EXPONENT,
        })
    }

    /// Mint an RS256 token carrying this key's `kid`
    ///
    /// # Panics
    ///
    /// Panics if the fixture PEM cannot be loaded or encoding fails.
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        header.typ = Some("JWT".to_string());
        self.sign_with_header(&header, claims)
    }

    /// Mint a token with a caller-built header
    ///
    /// # Panics
    ///
    /// Panics if the fixture PEM cannot be loaded or encoding fails.
    pub fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        let key = EncodingKey::from_rsa_pem(self.private_pem.as_bytes())
            .expect("fixture RSA key should load");
        encode(header, claims, &key).expect("fixture token should encode")
    }
}

/// Key set document containing the given keys
pub fn jwks_document(keys: &[&TestKey]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}

/// Current Unix time in seconds
pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Cognito-shaped access token claims for `issuer`, expiring in an hour
pub fn valid_claims(issuer: &str) -> Value {
    json!({
        "sub": "user-123",
        "email": "test@example.com",
        "cognito:username": "testuser",
        "token_use": "access",
        "iss": issuer,
        "iat": now(),
        "exp": now() + 3600,
    })
}

/// Same as [`valid_claims`] but expired an hour ago
pub fn expired_claims(issuer: &str) -> Value {
    let mut claims = valid_claims(issuer);
    claims["iat"] = json!(now() - 7200);
    claims["exp"] = json!(now() - 3600);
    claims
}

/// Hand-built token with arbitrary header and signature segments
///
/// Used for `alg: none` and other structures `jsonwebtoken` refuses to emit.
pub fn raw_token(header: &Value, claims: &Value, signature: &str) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        signature
    )
}

/// Identity provider double serving `/<pool>/.well-known/jwks.json`
#[derive(Debug)]
pub struct MockIdentityProvider {
    /// Underlying mock server (for custom mounts)
    pub server: MockServer,
}

impl MockIdentityProvider {
    /// Start a provider with nothing mounted
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Issuer string for [`TEST_POOL_ID`] on this server
    pub fn issuer(&self) -> String {
        format!("{}/{}", self.server.uri(), TEST_POOL_ID)
    }

    /// Request path of the key set document
    pub fn jwks_path(&self) -> String {
        format!("/{TEST_POOL_ID}{JWKS_PATH}")
    }

    /// Full key set URL
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), self.jwks_path())
    }

    /// Verification configuration pointing at this server
    ///
    /// # Panics
    ///
    /// Panics if the mock server URI is rejected, which would be a fixture bug.
    pub fn config(&self) -> VerificationConfig {
        VerificationConfig::from_issuer(&self.issuer()).expect("mock issuer should be valid")
    }

    /// Serve a key set; when `expected_fetches` is set, the server panics on
    /// drop unless it was fetched exactly that many times
    pub async fn serve_keys(&self, keys: &[&TestKey], expected_fetches: Option<u64>) {
        self.serve_response(
            ResponseTemplate::new(200).set_body_json(jwks_document(keys)),
            expected_fetches,
        )
        .await;
    }

    /// Serve keys after a delay (for timeout tests)
    pub async fn serve_keys_slowly(&self, keys: &[&TestKey], delay: Duration) {
        self.serve_response(
            ResponseTemplate::new(200)
                .set_body_json(jwks_document(keys))
                .set_delay(delay),
            None,
        )
        .await;
    }

    /// Answer key set requests with a bare status code
    pub async fn serve_status(&self, status: u16, expected_fetches: Option<u64>) {
        self.serve_response(ResponseTemplate::new(status), expected_fetches)
            .await;
    }

    /// Mount an arbitrary response on the key set path
    pub async fn serve_response(&self, response: ResponseTemplate, expected_fetches: Option<u64>) {
        let mock = Mock::given(method("GET"))
            .and(path(self.jwks_path()))
            .respond_with(response);
        match expected_fetches {
            Some(n) => mock.expect(n).mount(&self.server).await,
            None => mock.mount(&self.server).await,
        }
    }

    /// Swap what the provider publishes (key rotation)
    pub async fn rotate_to(&self, keys: &[&TestKey], expected_fetches: Option<u64>) {
        self.server.reset().await;
        self.serve_keys(keys, expected_fetches).await;
    }

    /// Number of key set requests received so far
    pub async fn jwks_fetches(&self) -> usize {
        let jwks_path = self.jwks_path();
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == jwks_path)
            .count()
    }
}
