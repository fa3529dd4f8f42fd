//! OAuth 2.0 client type.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// How a client came to be known to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// Registered by an operator.
    Static,
    /// Resolved from a Client ID Metadata Document.
    Cimd,
}

/// OAuth 2.0 client.
///
/// A client with a `client_secret_hash` is confidential and must
/// authenticate at the token, introspection and revocation endpoints.
/// A client without one is public and must use PKCE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Client identifier. For metadata-document clients this is the
    /// document URL.
    pub client_id: String,

    /// Hashed client secret. `None` for public clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_hash: Option<String>,

    /// Redirect URIs, compared by exact string match.
    pub redirect_uris: Vec<String>,

    /// Scopes the client may request.
    pub scopes: Vec<String>,

    /// Origin of the registration.
    pub client_type: ClientType,

    /// When the metadata document was last fetched (metadata-document
    /// clients only).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub metadata_fetched_at: Option<OffsetDateTime>,
}

impl Client {
    /// Returns `true` if the client has no secret.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.client_secret_hash.is_none()
    }

    /// Returns `true` if the redirect URI is registered (exact match).
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    /// Returns `true` if the client may request the scope.
    #[must_use]
    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        self.scopes.iter().any(|allowed| allowed == scope)
    }
}
