//! The signing capability injected into the provider.

use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use super::claims::TokenClaims;

/// Errors that can occur during token signing and validation.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    Decoding {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// The signing key is unusable.
    #[error("Invalid key: {message}")]
    Key {
        /// Description of the key problem.
        message: String,
    },
}

impl SignerError {
    /// Creates a new `Encoding` error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Creates a new `Decoding` error.
    #[must_use]
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Returns `true` if the token was rejected (as opposed to a key or
    /// encoding problem on our side).
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::InvalidSignature | Self::InvalidClaims { .. } | Self::Decoding { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for SignerError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidKeyFormat => Self::Key {
                message: err.to_string(),
            },
            _ => Self::decoding(err.to_string()),
        }
    }
}

/// The `aud` claim, which JWT allows as a string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// Single audience.
    Single(String),
    /// Multiple audiences.
    Multiple(Vec<String>),
}

impl Audience {
    /// Returns `true` if `client_id` is one of the audiences.
    #[must_use]
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Self::Single(aud) => aud == client_id,
            Self::Multiple(auds) => auds.iter().any(|a| a == client_id),
        }
    }
}

/// Claims of a token that passed signature, issuer and expiry checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedClaims {
    /// Subject.
    pub sub: String,
    /// Audience.
    pub aud: Audience,
    /// Issuer.
    pub iss: String,
    /// Expiration (unix seconds).
    pub exp: i64,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Granted scopes, space separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Everything else.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Token signing capability.
///
/// Implementations own the key material. The provider never touches keys
/// directly; it hands typed claims to [`Signer::sign`] and reads verified
/// claims back from [`Signer::validate`].
pub trait Signer: Send + Sync {
    /// Issuer written into and required on every token.
    fn issuer(&self) -> &str;

    /// JWS algorithm name, e.g. `HS256`.
    fn algorithm(&self) -> &str;

    /// Sign the claims, adding `iss`, `iat` and `exp`.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be encoded or signed.
    fn sign(&self, claims: &TokenClaims, expires_at: OffsetDateTime)
    -> Result<String, SignerError>;

    /// Verify a token's signature, algorithm, issuer and expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not acceptable.
    fn validate(&self, token: &str) -> Result<ValidatedClaims, SignerError>;

    /// Build the GraphQL authorization claims block.
    ///
    /// Returns the claim name (namespace) and its value.
    ///
    /// # Errors
    ///
    /// Returns an error if the block cannot be built.
    fn graphql_claims(
        &self,
        user_id: Uuid,
        is_anonymous: bool,
        allowed_roles: &[String],
        default_role: &str,
    ) -> Result<(String, Value), SignerError>;

    /// Public keys, served unchanged by the JWKS endpoint.
    fn jwks(&self) -> JwkSet;
}
