//! Bearer token extraction

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use idgate_auth::TokenClaims;

use crate::error::ApiError;
use crate::routes::AppState;

/// Claims of a verified bearer token
///
/// Rejects with 403 when the request carries no `Bearer` credentials, before
/// the verifier is consulted.
#[derive(Debug, Clone)]
pub struct VerifiedClaims(pub TokenClaims);

impl FromRequestParts<AppState> for VerifiedClaims {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::NotAuthenticated)?;
        let claims = state.verifier.verify(token).await?;
        Ok(Self(claims))
    }
}

/// Credentials of an `Authorization: Bearer <token>` header
///
/// The scheme is case-insensitive; empty credentials count as absent.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, credentials) = value.trim().split_once(' ')?;
    let credentials = credentials.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !credentials.is_empty()).then_some(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc.def.ghi"))), Some("abc.def.ghi"));
        assert_eq!(bearer_token(&parts(Some("bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts(Some("BEARER   abc  "))), Some("abc"));
    }

    #[test]
    fn test_missing_or_unusable_credentials() {
        assert_eq!(bearer_token(&parts(None)), None);
        assert_eq!(bearer_token(&parts(Some("Basic dXNlcjpwYXNz"))), None);
        assert_eq!(bearer_token(&parts(Some("Bearer"))), None);
        assert_eq!(bearer_token(&parts(Some("Bearer    "))), None);
        assert_eq!(bearer_token(&parts(Some("abc.def.ghi"))), None);
    }
}
