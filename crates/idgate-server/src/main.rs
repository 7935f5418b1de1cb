//! `idgate-server` binary

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use idgate_auth::TokenVerifier;
use idgate_server::{AppState, Settings, build_router, cors_layer, telemetry};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "idgate-server", version, about = "Bearer token authentication API")]
struct Cli {
    /// Settings file (TOML, YAML or JSON)
    #[arg(long, short = 'c', env = "IDGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the `bind` setting
    #[arg(long)]
    bind: Option<String>,

    /// Log filter, overrides the `log_level` setting
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(bind) = cli.bind {
        settings.bind = bind;
    }
    if let Some(log_level) = cli.log_level {
        settings.log_level = log_level;
    }
    let addr = settings.bind_addr()?;

    telemetry::init(&settings.log_level, settings.json_logs)
        .context("failed to initialize logging")?;

    #[cfg(feature = "metrics")]
    idgate_auth::init_auth_metrics();

    let verifier = TokenVerifier::from_config_result(settings.verification_config());
    if let Some(jwks_url) = verifier.resolver().jwks_url() {
        info!(jwks_url = %jwks_url, issuer = %verifier.expected_issuer(), "Token verification configured");
    }

    if settings.warm_jwks && verifier.resolver().is_available() {
        match verifier.resolver().refresh().await {
            Ok(key_count) => info!(key_count, "JWKS cache warmed"),
            // Lookups will retry on demand
            Err(e) => warn!(error = %e, "Initial JWKS fetch failed"),
        }
    }

    let state = AppState::new(verifier);
    let cors = cors_layer(&settings.cors_origins(), settings.cors_allow_credentials);
    let app = build_router(state, cors, settings.request_timeout());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}
