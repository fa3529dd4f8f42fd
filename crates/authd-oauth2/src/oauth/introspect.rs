//! Token introspection (RFC 7662).

use serde::{Deserialize, Serialize};

use crate::error::OAuthError;
use crate::provider::OAuth2Provider;
use crate::token::hash_token;
use crate::types::Client;

/// Introspection request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntrospectRequest {
    pub token: String,
    #[serde(default)]
    pub token_type_hint: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Introspection response. Inactive tokens carry only `active: false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectResponse {
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// `access_token` or `refresh_token`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl IntrospectResponse {
    /// The response for any token that is not active.
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }
}

impl OAuth2Provider {
    /// Reports the state of a refresh token or access token.
    ///
    /// Unknown, expired, foreign or malformed tokens are reported as
    /// inactive rather than as errors.
    ///
    /// # Errors
    ///
    /// - `invalid_client` if the caller cannot be authenticated
    /// - `server_error` on storage failures while resolving the caller
    pub async fn introspect(
        &self,
        request: &IntrospectRequest,
    ) -> Result<IntrospectResponse, OAuthError> {
        let client = self
            .authenticate_caller(request.client_id.as_deref(), request.client_secret.as_deref())
            .await?;

        if request.token.is_empty() {
            return Ok(IntrospectResponse::inactive());
        }

        let hint = request.token_type_hint.as_deref();
        if matches!(hint, None | Some("refresh_token")) {
            if let Some(response) = self.introspect_refresh_token(&request.token, &client).await {
                return Ok(response);
            }
            if hint.is_some() {
                return Ok(IntrospectResponse::inactive());
            }
        }

        Ok(self.introspect_access_token(&request.token, &client))
    }

    async fn introspect_refresh_token(
        &self,
        token: &str,
        client: &Client,
    ) -> Option<IntrospectResponse> {
        let stored = match self.db.get_refresh_token_by_hash(&hash_token(token)).await {
            Ok(stored) => stored?,
            Err(e) => {
                tracing::error!(client_id = %client.client_id, error = %e, "failed to look up refresh token for introspection");
                return None;
            }
        };
        if stored.client_id != client.client_id || stored.is_expired() {
            return None;
        }

        Some(IntrospectResponse {
            active: true,
            client_id: Some(stored.client_id.clone()),
            sub: Some(stored.user_id.to_string()),
            scope: Some(stored.scope_string()),
            exp: Some(stored.expires_at.unix_timestamp()),
            iat: Some(stored.created_at.unix_timestamp()),
            iss: Some(self.signer.issuer().to_string()),
            token_type: Some("refresh_token".to_string()),
        })
    }

    fn introspect_access_token(&self, token: &str, client: &Client) -> IntrospectResponse {
        let claims = match self.signer.validate(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(client_id = %client.client_id, error = %e, "introspected token did not validate");
                return IntrospectResponse::inactive();
            }
        };
        if !claims.aud.contains(&client.client_id) {
            tracing::debug!(client_id = %client.client_id, "introspected token issued to another client");
            return IntrospectResponse::inactive();
        }

        IntrospectResponse {
            active: true,
            client_id: Some(client.client_id.clone()),
            sub: Some(claims.sub),
            scope: claims.scope,
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            iss: Some(claims.iss),
            token_type: Some("access_token".to_string()),
        }
    }
}
