//! Client authentication for the token, introspection and revocation
//! endpoints.

use crate::error::OAuthError;
use crate::provider::OAuth2Provider;
use crate::secret::VerifySecretFn;
use crate::types::Client;

/// Authenticates the caller as `client`.
///
/// Rules, in order:
/// 1. a supplied `client_id` must equal the resolved client's id
/// 2. public clients only need to have supplied their `client_id`
/// 3. confidential clients must supply a non-empty secret that verifies
///    against the stored hash
///
/// # Errors
///
/// Returns `invalid_client` for every failure.
pub fn authenticate_client(
    client: &Client,
    client_id: Option<&str>,
    client_secret: Option<&str>,
    verify_secret: &VerifySecretFn,
) -> Result<(), OAuthError> {
    if let Some(id) = client_id
        && id != client.client_id
    {
        return Err(OAuthError::invalid_client("Client ID mismatch"));
    }

    let Some(secret_hash) = client.client_secret_hash.as_deref() else {
        if client_id.is_none() {
            return Err(OAuthError::invalid_client("Client ID is required"));
        }
        return Ok(());
    };

    let Some(secret) = client_secret.filter(|s| !s.is_empty()) else {
        return Err(OAuthError::invalid_client("Client secret required"));
    };

    if !verify_secret(secret, secret_hash) {
        tracing::warn!(client_id = %client.client_id, "client secret verification failed");
        return Err(OAuthError::invalid_client("Invalid client credentials"));
    }

    Ok(())
}

impl OAuth2Provider {
    /// Resolves and authenticates the caller of an endpoint that identifies
    /// the client only through its credentials (introspection, revocation).
    ///
    /// # Errors
    ///
    /// - `invalid_client` if `client_id` is missing, unknown, or the
    ///   credentials do not verify
    /// - `server_error` on storage failures
    pub async fn authenticate_caller(
        &self,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> Result<Client, OAuthError> {
        let Some(client_id) = client_id.filter(|id| !id.is_empty()) else {
            return Err(OAuthError::invalid_client("Client ID is required"));
        };
        let client = self.resolve_client(client_id).await?;
        authenticate_client(&client, Some(client_id), client_secret, &self.verify_secret)?;
        Ok(client)
    }
}
