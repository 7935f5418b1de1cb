//! Verification metrics
//!
//! Enable with the `metrics` feature flag. Requires a `metrics` recorder
//! to be installed (e.g., via `metrics-exporter-prometheus`).
//!
//! ## Metrics Provided
//!
//! - `idgate_token_verifications_total` - Counter (labels: outcome)
//! - `idgate_token_verification_duration_seconds` - Histogram
//! - `idgate_jwks_refresh_total` - Counter for key set fetches (labels: status)

use std::sync::Once;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

use crate::claims::TokenClaims;
use crate::error::VerifyError;

static INIT: Once = Once::new();

/// Register metric descriptions. Idempotent; call once at startup.
pub fn init_auth_metrics() {
    INIT.call_once(|| {
        describe_counter!(
            "idgate_token_verifications_total",
            "Bearer token verifications by outcome"
        );
        describe_histogram!(
            "idgate_token_verification_duration_seconds",
            "Bearer token verification duration in seconds"
        );
        describe_counter!(
            "idgate_jwks_refresh_total",
            "JWKS fetches triggered by cache misses or explicit refresh"
        );
    });
}

pub(crate) fn record_token_verification(
    result: &Result<TokenClaims, VerifyError>,
    elapsed: Duration,
) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    counter!("idgate_token_verifications_total", "outcome" => outcome).increment(1);
    histogram!("idgate_token_verification_duration_seconds").record(elapsed.as_secs_f64());
}

pub(crate) fn record_jwks_refresh(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("idgate_jwks_refresh_total", "status" => status).increment(1);
}
