//! # Idgate Server
//!
//! HTTP front end for [`idgate_auth`]: a public root and health check, plus
//! endpoints that authenticate the caller's bearer token and echo back who
//! they are.
//!
//! | Route | Auth | Response |
//! |-------|------|----------|
//! | `GET /` | no | service banner |
//! | `GET /health` | no | `{"status":"healthy"}` |
//! | `POST /api/v1/auth/validate` | bearer | `{valid, user_id, email, username, token_use}` |
//! | `GET /api/v1/auth/me` | bearer | `{user_id, email, username, token_use}` |

pub mod error;
pub mod extract;
pub mod routes;
pub mod settings;
pub mod telemetry;

pub use error::ApiError;
pub use extract::VerifiedClaims;
pub use routes::{AppState, UserInfo, ValidateResponse, build_router, cors_layer};
pub use settings::{CorsOrigins, Settings, SettingsError};
