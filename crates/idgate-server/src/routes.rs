//! Routes and router assembly

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use idgate_auth::{TokenClaims, TokenVerifier};
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::extract::VerifiedClaims;
use crate::settings::CorsOrigins;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    /// Verifier shared by every request
    pub verifier: Arc<TokenVerifier>,
}

impl AppState {
    /// Wrap a verifier
    pub fn new(verifier: TokenVerifier) -> Self {
        Self {
            verifier: Arc::new(verifier),
        }
    }
}

/// Identity fields of a verified token; absent claims serialize as `null`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    /// `sub`
    pub user_id: Option<String>,
    /// `email`
    pub email: Option<String>,
    /// `cognito:username` or `username`
    pub username: Option<String>,
    /// `token_use`
    pub token_use: Option<String>,
}

impl From<&TokenClaims> for UserInfo {
    fn from(claims: &TokenClaims) -> Self {
        Self {
            user_id: claims.subject().map(str::to_string),
            email: claims.email().map(str::to_string),
            username: claims.username().map(str::to_string),
            token_use: claims.token_use().map(str::to_string),
        }
    }
}

/// Body of `POST /api/v1/auth/validate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidateResponse {
    /// Always `true`; failures are error responses
    pub valid: bool,
    /// Identity of the token holder
    #[serde(flatten)]
    pub user: UserInfo,
}

async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Identity Gate API",
    }))
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn validate_handler(VerifiedClaims(claims): VerifiedClaims) -> Json<ValidateResponse> {
    let user = UserInfo::from(&claims);
    info!(user_id = ?user.user_id, "Token validated");
    Json(ValidateResponse { valid: true, user })
}

async fn me_handler(VerifiedClaims(claims): VerifiedClaims) -> Json<UserInfo> {
    Json(UserInfo::from(&claims))
}

/// Build the CORS layer
///
/// Credentials are only honored with an explicit origin list; with `*`
/// the flag is dropped.
pub fn cors_layer(origins: &CorsOrigins, allow_credentials: bool) -> CorsLayer {
    match origins {
        CorsOrigins::Any => {
            if allow_credentials {
                warn!("CORS credentials cannot be combined with wildcard origins; disabled");
            }
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        CorsOrigins::List(list) => CorsLayer::new()
            .allow_origin(list.clone())
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(allow_credentials),
    }
}

/// Assemble the application router
pub fn build_router(state: AppState, cors: CorsLayer, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/v1/auth/validate", post(validate_handler))
        .route("/api/v1/auth/me", get(me_handler))
        .with_state(state)
        .layer(cors)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
}
