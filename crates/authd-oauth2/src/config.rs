//! Authorization server configuration.
//!
//! All durations are written in humantime format (`"15m"`, `"30d"`).
//!
//! # Example (TOML)
//!
//! ```toml
//! enabled = true
//! server_url = "https://auth.example.com"
//! client_url = "https://app.example.com"
//! access_token_lifetime = "15m"
//!
//! [cimd]
//! enabled = true
//!
//! [signing]
//! issuer = "https://auth.example.com"
//! algorithm = "HS256"
//! secret = "a-secret-of-at-least-thirty-two-bytes"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Minimum length of an HMAC signing secret.
pub const MIN_SIGNING_SECRET_LEN: usize = 32;

/// Root configuration of the authorization server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuth2Config {
    /// Enable/disable the provider.
    pub enabled: bool,

    /// Public base URL of the authorization server. Discovery endpoint URLs
    /// are built from it.
    pub server_url: String,

    /// Base URL of the frontend application.
    pub client_url: String,

    /// Login/consent UI URL. Falls back to `{client_url}/oauth2/login`.
    pub login_url: Option<String>,

    /// Access token (and ID token) lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Lifetime of a pending authorization request.
    #[serde(with = "humantime_serde")]
    pub auth_request_lifetime: Duration,

    /// Authorization code lifetime.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Period of the expired-record sweeper.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,

    /// Client ID Metadata Document settings.
    pub cimd: CimdConfig,

    /// Token signing settings.
    pub signing: SigningConfig,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: "http://localhost:4000".to_string(),
            client_url: "http://localhost:3000".to_string(),
            login_url: None,
            access_token_lifetime: Duration::from_secs(15 * 60),
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
            auth_request_lifetime: Duration::from_secs(10 * 60),
            authorization_code_lifetime: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(10 * 60),
            cimd: CimdConfig::default(),
            signing: SigningConfig::default(),
        }
    }
}

/// Client ID Metadata Document (dynamic client) settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CimdConfig {
    /// Accept URL-shaped client identifiers and fetch their metadata.
    pub enabled: bool,

    /// Development only: allow `http` client IDs and private addresses.
    pub allow_insecure_transport: bool,

    /// Total timeout of one metadata fetch.
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,

    /// Maximum metadata document size in bytes.
    pub max_document_size: usize,

    /// How long a fetched document is reused.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Maximum number of redirects followed during a fetch.
    pub max_redirects: usize,
}

impl Default for CimdConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_insecure_transport: false,
            fetch_timeout: Duration::from_secs(5),
            max_document_size: 5 * 1024,
            cache_ttl: Duration::from_secs(3600),
            max_redirects: 3,
        }
    }
}

/// Token signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Issuer written into every token.
    pub issuer: String,

    /// HMAC algorithm: HS256, HS384 or HS512.
    pub algorithm: String,

    /// HMAC key.
    pub secret: String,

    /// Claim under which the GraphQL authorization block is placed.
    pub claims_namespace: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:4000".to_string(),
            algorithm: "HS256".to_string(),
            secret: String::new(),
            claims_namespace: "https://hasura.io/jwt/claims".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or merged.
    #[error("Configuration load error: {0}")]
    Load(String),
}

impl OAuth2Config {
    /// Returns the login UI base URL.
    #[must_use]
    pub fn login_base_url(&self) -> String {
        match self.login_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => url.to_string(),
            None => format!("{}/oauth2/login", self.client_url.trim_end_matches('/')),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - `server_url`, `client_url` or `login_url` is not an absolute URL
    /// - any lifetime is zero
    /// - the signing algorithm is not an HMAC algorithm
    /// - the provider is enabled with a signing secret shorter than 32 bytes
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("server_url", Some(self.server_url.as_str())),
            ("client_url", Some(self.client_url.as_str())),
            ("login_url", self.login_url.as_deref()),
        ] {
            if let Some(value) = value
                && Url::parse(value).is_err()
            {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must be an absolute URL, got '{value}'"
                )));
            }
        }

        for (name, value) in [
            ("access_token_lifetime", self.access_token_lifetime),
            ("refresh_token_lifetime", self.refresh_token_lifetime),
            ("auth_request_lifetime", self.auth_request_lifetime),
            ("authorization_code_lifetime", self.authorization_code_lifetime),
            ("cleanup_interval", self.cleanup_interval),
            ("cimd.fetch_timeout", self.cimd.fetch_timeout),
            ("cimd.cache_ttl", self.cimd.cache_ttl),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
            }
        }

        if self.cimd.max_document_size == 0 {
            return Err(ConfigError::InvalidValue(
                "cimd.max_document_size must be > 0".to_string(),
            ));
        }

        match self.signing.algorithm.as_str() {
            "HS256" | "HS384" | "HS512" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{}'. Must be HS256, HS384, or HS512",
                    other
                )));
            }
        }

        if self.enabled {
            if self.signing.issuer.is_empty() {
                return Err(ConfigError::Missing("signing.issuer".to_string()));
            }
            if self.signing.secret.len() < MIN_SIGNING_SECRET_LEN {
                return Err(ConfigError::InvalidValue(format!(
                    "signing.secret must be at least {MIN_SIGNING_SECRET_LEN} bytes"
                )));
            }
        }

        Ok(())
    }
}

pub mod loader {
    use super::{ConfigError, OAuth2Config};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file looked up when no path is given.
    pub const DEFAULT_CONFIG_FILE: &str = "authd.toml";

    /// Loads the configuration from an optional TOML file and `AUTHD__*`
    /// environment variables, then validates it.
    ///
    /// Environment variables override the file, e.g.
    /// `AUTHD__CIMD__ENABLED=true`.
    pub fn load_config(path: Option<&str>) -> Result<OAuth2Config, ConfigError> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            return Err(ConfigError::Load(format!(
                "config file not found: {}",
                pathbuf.display()
            )));
        }
        builder = builder.add_source(
            Environment::with_prefix("AUTHD")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?;
        let merged: OAuth2Config = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        Ok(merged)
    }
}
