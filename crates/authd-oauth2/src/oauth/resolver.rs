//! Client resolution: static registrations and metadata documents.

use time::OffsetDateTime;

use super::cimd::{
    fetch_client_metadata, is_cimd_client_id, resolve_document_scopes, validate_cimd_url,
    validate_client_metadata,
};
use crate::error::OAuthError;
use crate::provider::OAuth2Provider;
use crate::storage::UpsertCimdClient;
use crate::types::{Client, ClientType};

impl OAuth2Provider {
    /// Resolves a `client_id` to a client.
    ///
    /// URL-shaped identifiers go through the metadata document path when it
    /// is enabled; everything else is a static lookup.
    ///
    /// # Errors
    ///
    /// - `invalid_client` if the client is unknown or its metadata document
    ///   is rejected
    /// - `invalid_scope` if the metadata document declares unsupported scopes
    /// - `server_error` on storage failures
    pub async fn resolve_client(&self, client_id: &str) -> Result<Client, OAuthError> {
        let cimd = &self.config.cimd;
        if cimd.enabled && is_cimd_client_id(client_id, cimd.allow_insecure_transport) {
            return self.resolve_cimd_client(client_id).await;
        }
        self.lookup_client(client_id).await
    }

    pub(crate) async fn lookup_client(&self, client_id: &str) -> Result<Client, OAuthError> {
        match self.db.get_client(client_id).await {
            Ok(Some(client)) => Ok(client),
            Ok(None) => Err(OAuthError::invalid_client("Unknown client")),
            Err(e) => {
                tracing::error!(client_id = %client_id, error = %e, "failed to load client");
                Err(OAuthError::internal())
            }
        }
    }

    async fn resolve_cimd_client(&self, client_id: &str) -> Result<Client, OAuthError> {
        let cimd = &self.config.cimd;
        let url = validate_cimd_url(client_id, cimd.allow_insecure_transport).await?;

        match self.db.get_client(client_id).await {
            // an operator registration under the same URL takes precedence
            Ok(Some(client)) if client.client_type == ClientType::Static => return Ok(client),
            Ok(Some(client)) => {
                let fresh = client.metadata_fetched_at.is_some_and(|fetched_at| {
                    OffsetDateTime::now_utc() - fetched_at < cimd.cache_ttl
                });
                if fresh {
                    tracing::debug!(client_id = %client_id, "metadata document cache hit");
                    return Ok(client);
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(client_id = %client_id, error = %e, "failed to load client");
                return Err(OAuthError::internal());
            }
        }

        let document = fetch_client_metadata(&self.http_client, &url, cimd).await?;
        validate_client_metadata(&document, client_id, &url)?;
        let scopes = resolve_document_scopes(&document)?;

        let client = self
            .db
            .upsert_cimd_client(UpsertCimdClient {
                client_id: client_id.to_string(),
                redirect_uris: document.redirect_uris,
                scopes,
                fetched_at: OffsetDateTime::now_utc(),
            })
            .await
            .map_err(|e| {
                tracing::error!(client_id = %client_id, error = %e, "failed to store metadata client");
                OAuthError::internal()
            })?;

        tracing::info!(client_id = %client_id, "resolved client from metadata document");
        Ok(client)
    }
}
