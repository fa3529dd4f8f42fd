//! Token revocation (RFC 7009) and user-initiated mass revocation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OAuthError;
use crate::provider::OAuth2Provider;
use crate::token::hash_token;

/// Revocation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
    #[serde(default)]
    pub token_type_hint: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl OAuth2Provider {
    /// Revokes a refresh token issued to the calling client.
    ///
    /// Succeeds whether or not the token existed. Storage failures are
    /// logged and also reported as success.
    ///
    /// # Errors
    ///
    /// - `invalid_client` if the caller cannot be authenticated
    /// - `server_error` on storage failures while resolving the caller
    pub async fn revoke(&self, request: &RevokeRequest) -> Result<(), OAuthError> {
        let client = self
            .authenticate_caller(request.client_id.as_deref(), request.client_secret.as_deref())
            .await?;

        if request.token.is_empty() {
            return Ok(());
        }

        match self
            .db
            .delete_refresh_token(&hash_token(&request.token), &client.client_id)
            .await
        {
            Ok(0) => {
                tracing::debug!(client_id = %client.client_id, "revocation matched no refresh token");
            }
            Ok(_) => {
                tracing::info!(client_id = %client.client_id, "refresh token revoked");
            }
            Err(e) => {
                tracing::error!(client_id = %client.client_id, error = %e, "failed to revoke refresh token");
            }
        }
        Ok(())
    }

    /// Deletes every refresh token of a user and returns how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns `server_error` on storage failures.
    pub async fn revoke_user_tokens(&self, user_id: Uuid) -> Result<u64, OAuthError> {
        let deleted = self
            .db
            .delete_refresh_tokens_by_user(user_id)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %user_id, error = %e, "failed to revoke user refresh tokens");
                OAuthError::internal()
            })?;
        tracing::info!(user_id = %user_id, deleted, "revoked user refresh tokens");
        Ok(deleted)
    }
}
