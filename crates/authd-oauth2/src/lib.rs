//! # authd-oauth2
//!
//! OAuth 2.0 / OpenID Connect authorization server core.
//!
//! This crate provides:
//! - Authorization request validation and login completion
//! - Authorization code and refresh token grants with PKCE
//! - Dynamic clients resolved from Client ID Metadata Documents
//! - Token introspection, revocation and userinfo
//! - Discovery and JWKS documents
//!
//! HTTP routing and persistence are left to the embedding service: storage
//! is the [`DBClient`] capability and signing is the [`Signer`] capability,
//! both injected into [`OAuth2Provider`].
//!
//! ## Modules
//!
//! - [`config`] - Provider configuration and loader
//! - [`error`] - OAuth error taxonomy and HTTP mapping
//! - [`oauth`] - Protocol operations
//! - [`provider`] - The provider and its collaborators
//! - [`storage`] - Storage capability and in-memory implementation
//! - [`token`] - Claims, signing and credential hashing
//! - [`types`] - Clients, authorization requests, refresh tokens, users
//! - [`secret`] - Client secret hashing
//! - [`cleanup`] - Expired record sweeper

pub mod cleanup;
pub mod config;
pub mod error;
pub mod oauth;
pub mod provider;
pub mod secret;
pub mod storage;
pub mod token;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{CimdConfig, ConfigError, OAuth2Config, SigningConfig};
pub use error::{AuthorizeRejection, ErrorResponse, OAuthError};
pub use oauth::{
    AuthorizeRequest, DiscoveryDocument, IntrospectRequest, IntrospectResponse,
    LoginCompleteResponse, LoginResponse, RevokeRequest, TokenRequest, TokenResponse,
    UserinfoResponse,
};
pub use provider::{BuildError, OAuth2Provider};
pub use secret::VerifySecretFn;
pub use storage::{DBClient, MemoryStore, StorageError};
pub use token::{JwtSigner, Signer, SignerError, TokenClaims};
pub use types::{AuthRequest, Client, ClientType, RefreshToken, User};

/// Type alias for protocol operation results.
pub type OAuthResult<T> = Result<T, OAuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use authd_oauth2::prelude::*;
/// ```
pub mod prelude {
    pub use crate::OAuthResult;
    pub use crate::config::{CimdConfig, ConfigError, OAuth2Config, SigningConfig};
    pub use crate::error::{AuthorizeRejection, ErrorResponse, OAuthError};
    pub use crate::oauth::{
        AuthorizeRequest, DiscoveryDocument, IntrospectRequest, IntrospectResponse,
        LoginCompleteResponse, LoginResponse, RevokeRequest, TokenRequest, TokenResponse,
        UserinfoResponse,
    };
    pub use crate::provider::{BuildError, OAuth2Provider};
    pub use crate::secret::{VerifySecretFn, argon2_verifier, hash_client_secret};
    pub use crate::storage::{DBClient, MemoryStore, StorageError};
    pub use crate::token::{JwtSigner, Signer, SignerError, TokenClaims};
    pub use crate::types::{AuthRequest, Client, ClientType, RefreshToken, User, scope};
}
