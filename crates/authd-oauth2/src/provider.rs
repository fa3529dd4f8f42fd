//! The authorization server provider.
//!
//! [`OAuth2Provider`] owns the injected collaborators and exposes every
//! protocol operation. The operations themselves live next to their
//! protocol concern under [`crate::oauth`], each adding an `impl` block.
//!
//! # Usage
//!
//! ```ignore
//! let provider = OAuth2Provider::new(
//!     config,
//!     Arc::new(store),
//!     Arc::new(JwtSigner::from_config(&config.signing)?),
//!     argon2_verifier(),
//!     build_http_client(&config.cimd)?,
//! );
//!
//! let login_url = provider.validate_authorize_request(&request).await?;
//! ```

use std::sync::Arc;

use crate::config::{ConfigError, OAuth2Config};
use crate::oauth::ssrf::build_http_client;
use crate::secret::{VerifySecretFn, argon2_verifier};
use crate::storage::DBClient;
use crate::token::{JwtSigner, Signer, SignerError};

/// Errors raised while assembling a provider from configuration.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The signer could not be created.
    #[error("signer: {0}")]
    Signer(#[from] SignerError),

    /// The metadata HTTP client could not be created.
    #[error("http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// OAuth 2.0 / OpenID Connect authorization server.
pub struct OAuth2Provider {
    pub(crate) db: Arc<dyn DBClient>,
    pub(crate) signer: Arc<dyn Signer>,
    pub(crate) verify_secret: VerifySecretFn,
    pub(crate) http_client: reqwest::Client,
    pub(crate) config: OAuth2Config,
}

impl OAuth2Provider {
    /// Creates a provider from its collaborators.
    ///
    /// # Arguments
    ///
    /// * `config` - Provider configuration
    /// * `db` - Storage backend
    /// * `signer` - Token signer
    /// * `verify_secret` - Client secret verification
    /// * `http_client` - Client used for metadata document fetches
    #[must_use]
    pub fn new(
        config: OAuth2Config,
        db: Arc<dyn DBClient>,
        signer: Arc<dyn Signer>,
        verify_secret: VerifySecretFn,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            db,
            signer,
            verify_secret,
            http_client,
            config,
        }
    }

    /// Creates a provider with the shipped collaborators: an HMAC
    /// [`JwtSigner`], Argon2 secret verification, and the metadata client
    /// selected by `cimd.allow_insecure_transport`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a collaborator
    /// cannot be built.
    pub fn from_config(config: OAuth2Config, db: Arc<dyn DBClient>) -> Result<Self, BuildError> {
        config.validate()?;
        let signer = JwtSigner::from_config(&config.signing)?;
        let http_client = build_http_client(&config.cimd)?;
        Ok(Self::new(
            config,
            db,
            Arc::new(signer),
            argon2_verifier(),
            http_client,
        ))
    }

    /// Provider configuration.
    #[must_use]
    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    /// Issuer of every token and redirect.
    #[must_use]
    pub fn issuer(&self) -> &str {
        self.signer.issuer()
    }
}

impl std::fmt::Debug for OAuth2Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Provider")
            .field("issuer", &self.signer.issuer())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
