//! Decoded token claims
//!
//! Identity providers add claims freely, so claims are kept as an open
//! mapping. Only a handful are read by name.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Cognito's username claim
pub const COGNITO_USERNAME_CLAIM: &str = "cognito:username";

/// Claims of a verified token, exactly as the provider issued them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenClaims(Map<String, Value>);

impl TokenClaims {
    /// Raw claim value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// String claim value; `None` when absent or not a string
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// `sub`
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// `email`
    pub fn email(&self) -> Option<&str> {
        self.get_str("email")
    }

    /// `cognito:username`, falling back to `username`
    pub fn username(&self) -> Option<&str> {
        self.get_str(COGNITO_USERNAME_CLAIM)
            .or_else(|| self.get_str("username"))
    }

    /// `token_use` (`access` or `id` for Cognito)
    pub fn token_use(&self) -> Option<&str> {
        self.get_str("token_use")
    }

    /// `iss`
    pub fn issuer(&self) -> Option<&str> {
        self.get_str("iss")
    }

    /// `exp` as seconds since the Unix epoch
    pub fn expires_at(&self) -> Option<u64> {
        self.get("exp").and_then(Value::as_u64)
    }

    /// Iterate over every claim
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of claims
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no claims
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the underlying mapping
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for TokenClaims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> TokenClaims {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_known_claims() {
        let claims = claims(json!({
            "sub": "user-123",
            "email": "test@example.com",
            "cognito:username": "testuser",
            "token_use": "access",
            "iss": "https://idp.example/pool",
            "exp": 9_999_999_999u64,
        }));

        assert_eq!(claims.subject(), Some("user-123"));
        assert_eq!(claims.email(), Some("test@example.com"));
        assert_eq!(claims.username(), Some("testuser"));
        assert_eq!(claims.token_use(), Some("access"));
        assert_eq!(claims.issuer(), Some("https://idp.example/pool"));
        assert_eq!(claims.expires_at(), Some(9_999_999_999));
        assert_eq!(claims.len(), 6);
    }

    #[test]
    fn test_username_fallback() {
        let claims = claims(json!({ "username": "plain" }));
        assert_eq!(claims.username(), Some("plain"));
    }

    #[test]
    fn test_non_string_claims_are_not_coerced() {
        let claims = claims(json!({ "sub": 42, "email": null }));
        assert_eq!(claims.subject(), None);
        assert_eq!(claims.email(), None);
        assert_eq!(claims.get("sub"), Some(&json!(42)));
    }

    #[test]
    fn test_serializes_transparently() {
        let original = json!({ "sub": "u", "custom:tenant": "acme", "groups": ["a", "b"] });
        let claims = claims(original.clone());
        assert_eq!(serde_json::to_value(&claims).unwrap(), original);
        assert_eq!(Value::Object(claims.into_inner()), original);
    }
}
