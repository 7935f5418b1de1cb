//! Server settings
//!
//! Loaded once at startup from an optional file (TOML, YAML or JSON)
//! overlaid by environment variables:
//!
//! | Variable | Setting | Default |
//! |----------|---------|---------|
//! | `COGNITO_USER_POOL_ID` | `user_pool_id` | none |
//! | `AWS_REGION` | `region` | `us-east-1` |
//! | `CORS_ALLOW_ORIGINS` | `cors_allow_origins` | `*` |
//! | `CORS_ALLOW_CREDENTIALS` | `cors_allow_credentials` | `true` |
//! | `IDGATE_<SETTING>` | any setting below | |
//!
//! The unprefixed variables win over their `IDGATE_` spellings.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::http::HeaderValue;
use config::{Config, Environment, File, FileFormat};
use idgate_auth::{ConfigError, VerificationConfig};
use serde::Deserialize;
use tracing::warn;

/// Environment variables read without the `IDGATE_` prefix
const UNPREFIXED_ENV: &[(&str, &str)] = &[
    ("COGNITO_USER_POOL_ID", "user_pool_id"),
    ("AWS_REGION", "region"),
    ("CORS_ALLOW_ORIGINS", "cors_allow_origins"),
    ("CORS_ALLOW_CREDENTIALS", "cors_allow_credentials"),
];

/// Settings loading errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Settings file not found
    #[error("Settings file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported settings file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// A source could not be parsed or a value has the wrong type
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] config::ConfigError),

    /// The bind address is not `host:port`
    #[error("Invalid bind address '{0}'")]
    InvalidBind(String),
}

/// Which origins the CORS layer admits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    /// `*`
    Any,
    /// An explicit list
    List(Vec<HeaderValue>),
}

/// Server settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Cognito user pool; without it (or `issuer_url`) verification is unavailable
    #[serde(default)]
    pub user_pool_id: Option<String>,
    /// AWS region of the user pool
    pub region: String,
    /// Generic OIDC issuer, used instead of the Cognito derivation when set
    #[serde(default)]
    pub issuer_url: Option<String>,
    /// Comma-separated allowed origins, or `*`
    pub cors_allow_origins: String,
    /// Whether CORS responses allow credentials
    pub cors_allow_credentials: bool,
    /// Listen address
    pub bind: String,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON logs instead of pretty text
    pub json_logs: bool,
    /// Bound on each JWKS fetch
    pub jwks_timeout_secs: u64,
    /// Optional key set cache lifetime
    #[serde(default)]
    pub jwks_cache_ttl_secs: Option<u64>,
    /// Optional minimum gap between miss-triggered refreshes
    #[serde(default)]
    pub jwks_refresh_cooldown_secs: Option<u64>,
    /// Leeway applied to `exp`
    pub clock_skew_secs: u64,
    /// Fetch the key set once before serving
    pub warm_jwks: bool,
    /// Per-request timeout
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_pool_id: None,
            region: "us-east-1".to_string(),
            issuer_url: None,
            cors_allow_origins: "*".to_string(),
            cors_allow_credentials: true,
            bind: "0.0.0.0:8000".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            jwks_timeout_secs: 10,
            jwks_cache_ttl_secs: None,
            jwks_refresh_cooldown_secs: None,
            clock_skew_secs: 0,
            warm_jwks: true,
            request_timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Load settings from an optional file and the process environment
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the file is missing or unreadable, or a
    /// value cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_with_env(path, std::env::vars().collect())
    }

    /// Load settings from an optional file and the given environment
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn load_with_env(
        path: Option<&Path>,
        env: HashMap<String, String>,
    ) -> Result<Self, SettingsError> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("region", defaults.region)?
            .set_default("cors_allow_origins", defaults.cors_allow_origins)?
            .set_default("cors_allow_credentials", defaults.cors_allow_credentials)?
            .set_default("bind", defaults.bind)?
            .set_default("log_level", defaults.log_level)?
            .set_default("json_logs", defaults.json_logs)?
            .set_default("jwks_timeout_secs", defaults.jwks_timeout_secs)?
            .set_default("clock_skew_secs", defaults.clock_skew_secs)?
            .set_default("warm_jwks", defaults.warm_jwks)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs)?;

        if let Some(path) = path {
            if !path.exists() {
                return Err(SettingsError::FileNotFound(path.to_path_buf()));
            }
            let format = match path.extension().and_then(|s| s.to_str()) {
                Some("toml") => FileFormat::Toml,
                Some("yaml") | Some("yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => return Err(SettingsError::UnsupportedFormat),
            };
            let path = path.to_str().ok_or(SettingsError::UnsupportedFormat)?;
            builder = builder.add_source(File::new(path, format));
        }

        builder = builder.add_source(
            Environment::with_prefix("IDGATE")
                .prefix_separator("_")
                .try_parsing(true)
                .source(Some(env.clone())),
        );

        for (var, key) in UNPREFIXED_ENV {
            builder = builder.set_override_option(*key, env.get(*var).cloned())?;
        }

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.bind_addr()?;
        Ok(settings)
    }

    /// Parsed listen address
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidBind`] if `bind` is not `host:port`.
    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        self.bind
            .parse()
            .map_err(|_| SettingsError::InvalidBind(self.bind.clone()))
    }

    /// Verification configuration, or why there is none
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if neither a usable user pool nor an issuer
    /// URL is configured.
    pub fn verification_config(&self) -> Result<VerificationConfig, ConfigError> {
        let config = match self.issuer_url.as_deref().map(str::trim) {
            Some(issuer) if !issuer.is_empty() => VerificationConfig::from_issuer(issuer)?,
            _ => VerificationConfig::cognito(
                &self.region,
                self.user_pool_id.as_deref().unwrap_or_default(),
            )?,
        };

        let mut config = config
            .with_jwks_timeout(Duration::from_secs(self.jwks_timeout_secs))
            .with_clock_skew(Duration::from_secs(self.clock_skew_secs));
        if let Some(ttl) = self.jwks_cache_ttl_secs {
            config = config.with_cache_ttl(Duration::from_secs(ttl));
        }
        if let Some(cooldown) = self.jwks_refresh_cooldown_secs {
            config = config.with_refresh_cooldown(Duration::from_secs(cooldown));
        }
        Ok(config)
    }

    /// Allowed CORS origins
    pub fn cors_origins(&self) -> CorsOrigins {
        parse_cors_origins(&self.cors_allow_origins)
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Parse a comma-separated origin list; `*` anywhere means any origin
///
/// Entries that are not valid header values are dropped with a warning.
pub fn parse_cors_origins(raw: &str) -> CorsOrigins {
    let entries: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect();

    if entries.is_empty() || entries.contains(&"*") {
        return CorsOrigins::Any;
    }

    let origins: Vec<HeaderValue> = entries
        .into_iter()
        .filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|_| warn!(origin = %origin, "Ignoring invalid CORS origin"))
                .ok()
        })
        .collect();
    if origins.is_empty() {
        warn!("No valid CORS origins configured; cross-origin requests will be refused");
    }
    CorsOrigins::List(origins)
}
