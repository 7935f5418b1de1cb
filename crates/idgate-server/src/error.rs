//! HTTP error responses
//!
//! Every error body is `{"detail": "..."}`. Authentication failures are 401
//! with `WWW-Authenticate: Bearer`; a missing or malformed `Authorization`
//! header is 403; an unconfigured identity provider is 503.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use idgate_auth::VerifyError;
use serde_json::json;

/// Request rejected before or during authentication
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No usable bearer credentials on the request
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The token was checked and rejected, or could not be checked
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl ApiError {
    /// Status code this error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotAuthenticated => StatusCode::FORBIDDEN,
            Self::Verify(VerifyError::ServiceUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Verify(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut resp = (status, Json(json!({ "detail": self.to_string() }))).into_response();

        if status == StatusCode::UNAUTHORIZED {
            resp.headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        resp
    }
}
