//! OAuth 2.0 protocol error types.
//!
//! Every operation of the provider fails with an [`OAuthError`]. Each variant
//! corresponds to one protocol error code and carries a human-readable
//! description that is safe to return to the client. Internal failures are
//! collapsed into [`OAuthError::ServerError`] with an opaque description;
//! their details only ever reach the logs.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use url::Url;

/// Description used for every opaque `server_error`.
pub const INTERNAL_ERROR_DESCRIPTION: &str = "Internal server error";

/// Errors returned by the authorization server operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OAuthError {
    /// The request is missing a parameter or is otherwise malformed.
    #[error("invalid_request: {description}")]
    InvalidRequest {
        /// Client-facing description.
        description: String,
    },

    /// Client authentication failed or the client is unknown.
    #[error("invalid_client: {description}")]
    InvalidClient {
        /// Client-facing description.
        description: String,
    },

    /// The authorization code or refresh token is invalid, expired or
    /// already used.
    #[error("invalid_grant: {description}")]
    InvalidGrant {
        /// Client-facing description.
        description: String,
    },

    /// The requested scope is unknown or not allowed for the client.
    #[error("invalid_scope: {description}")]
    InvalidScope {
        /// Client-facing description.
        description: String,
    },

    /// Only `response_type=code` is supported.
    #[error("unsupported_response_type: {description}")]
    UnsupportedResponseType {
        /// Client-facing description.
        description: String,
    },

    /// The grant type is not supported by the token endpoint.
    #[error("unsupported_grant_type: {description}")]
    UnsupportedGrantType {
        /// Client-facing description.
        description: String,
    },

    /// A client metadata document is unusable.
    #[error("invalid_client_metadata: {description}")]
    InvalidClientMetadata {
        /// Client-facing description.
        description: String,
    },

    /// A bearer token could not be accepted.
    #[error("invalid_token: {description}")]
    InvalidToken {
        /// Client-facing description.
        description: String,
    },

    /// Storage, signing or transport failure inside the server.
    #[error("server_error: {description}")]
    ServerError {
        /// Client-facing description.
        description: String,
    },
}

impl OAuthError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::InvalidRequest {
            description: description.into(),
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::InvalidClient {
            description: description.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::InvalidGrant {
            description: description.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::InvalidScope {
            description: description.into(),
        }
    }

    /// Creates a new `UnsupportedResponseType` error.
    #[must_use]
    pub fn unsupported_response_type(description: impl Into<String>) -> Self {
        Self::UnsupportedResponseType {
            description: description.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            description: description.into(),
        }
    }

    /// Creates a new `InvalidClientMetadata` error.
    #[must_use]
    pub fn invalid_client_metadata(description: impl Into<String>) -> Self {
        Self::InvalidClientMetadata {
            description: description.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self::InvalidToken {
            description: description.into(),
        }
    }

    /// Creates the opaque `server_error` returned for internal failures.
    #[must_use]
    pub fn internal() -> Self {
        Self::ServerError {
            description: INTERNAL_ERROR_DESCRIPTION.to_string(),
        }
    }

    /// Returns the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::UnsupportedResponseType { .. } => "unsupported_response_type",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::InvalidClientMetadata { .. } => "invalid_client_metadata",
            Self::InvalidToken { .. } => "invalid_token",
            Self::ServerError { .. } => "server_error",
        }
    }

    /// Returns the client-facing description.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::InvalidRequest { description }
            | Self::InvalidClient { description }
            | Self::InvalidGrant { description }
            | Self::InvalidScope { description }
            | Self::UnsupportedResponseType { description }
            | Self::UnsupportedGrantType { description }
            | Self::InvalidClientMetadata { description }
            | Self::InvalidToken { description }
            | Self::ServerError { description } => description,
        }
    }

    /// Returns the HTTP status the transport layer should use.
    ///
    /// `invalid_client` and `invalid_token` map to 401, `server_error` to
    /// 500, everything else to 400.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidClient { .. } | Self::InvalidToken { .. } => StatusCode::UNAUTHORIZED,
            Self::ServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Returns the serialisable error body.
    #[must_use]
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.oauth_error_code().to_string(),
            error_description: self.description().to_string(),
        }
    }

    /// Returns true if this is an internal failure.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ServerError { .. })
    }
}

/// OAuth 2.0 error body (RFC 6749 Section 5.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,
    /// Human-readable description.
    pub error_description: String,
}

/// Failure of the authorization request validation.
///
/// `redirect_url` is only present once the redirect URI has been verified
/// against the client registration. Before that point the error must be
/// shown to the user directly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error}")]
pub struct AuthorizeRejection {
    /// The protocol error.
    pub error: OAuthError,
    /// Error redirect to the client, when it is safe to redirect.
    pub redirect_url: Option<String>,
}

impl AuthorizeRejection {
    /// A rejection that must not be redirected.
    #[must_use]
    pub fn direct(error: OAuthError) -> Self {
        Self {
            error,
            redirect_url: None,
        }
    }
}

// =============================================================================
// Error Redirects
// =============================================================================

/// Builds the error redirect sent back to a client's redirect URI.
///
/// Existing query parameters of the redirect URI are preserved. `state` is
/// only added when non-empty. Returns `None` if the redirect URI does not
/// parse.
#[must_use]
pub fn error_redirect_url(
    redirect_uri: &str,
    state: Option<&str>,
    issuer: &str,
    error: &OAuthError,
) -> Option<String> {
    let mut url = Url::parse(redirect_uri).ok()?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("error", error.oauth_error_code());
        query.append_pair("error_description", error.description());
        query.append_pair("iss", issuer);
        if let Some(state) = state.filter(|s| !s.is_empty()) {
            query.append_pair("state", state);
        }
    }
    Some(url.into())
}

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = self.to_response();

        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        if status == StatusCode::UNAUTHORIZED {
            let www_auth = format!(
                "Bearer error=\"{}\", error_description=\"{}\"",
                body.error,
                body.error_description.replace('"', "'")
            );
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        (status, headers, Json(body)).into_response()
    }
}
