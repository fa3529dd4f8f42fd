//! Login completion: binds an authenticated user to a pending
//! authorization request and issues the one-time authorization code.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::provider::OAuth2Provider;
use crate::storage::CompleteLogin;
use crate::token::{generate_token, hash_token};
use crate::types::AuthRequest;

/// Summary of a pending authorization request for the login UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub request_id: Uuid,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
}

/// Where to send the user agent after a completed login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCompleteResponse {
    pub redirect_uri: String,
}

impl OAuth2Provider {
    /// Returns the pending authorization request for display.
    ///
    /// # Errors
    ///
    /// - `invalid_request` if the request is unknown or expired
    /// - `invalid_client` if its client no longer resolves
    /// - `server_error` on storage failures
    pub async fn get_login_request(&self, request_id: Uuid) -> Result<LoginResponse, OAuthError> {
        let auth_request = self.load_live_auth_request(request_id).await?;
        let client = self.resolve_client(&auth_request.client_id).await?;

        Ok(LoginResponse {
            request_id: auth_request.id,
            client_id: client.client_id,
            scopes: auth_request.scopes,
            redirect_uri: auth_request.redirect_uri,
        })
    }

    /// Completes the login for `user_id` and returns the redirect carrying
    /// the authorization code.
    ///
    /// # Errors
    ///
    /// - `invalid_request` if the request is unknown, expired or already
    ///   completed
    /// - `server_error` on storage failures
    pub async fn complete_login(
        &self,
        request_id: Uuid,
        user_id: Uuid,
    ) -> Result<LoginCompleteResponse, OAuthError> {
        let auth_request = self.load_live_auth_request(request_id).await?;
        if auth_request.done {
            return Err(OAuthError::invalid_request(
                "Authorization request already completed",
            ));
        }

        let mut redirect = Url::parse(&auth_request.redirect_uri).map_err(|e| {
            tracing::error!(request_id = %request_id, error = %e, "stored redirect_uri does not parse");
            OAuthError::internal()
        })?;

        let code = generate_token();
        let now = OffsetDateTime::now_utc();

        // done flag and code land in the same storage operation
        let completed = self
            .db
            .complete_login_and_insert_code(CompleteLogin {
                auth_request_id: request_id,
                user_id,
                auth_time: now,
                code_hash: hash_token(&code),
                code_expires_at: now + self.config.authorization_code_lifetime,
            })
            .await
            .map_err(|e| {
                tracing::error!(request_id = %request_id, error = %e, "failed to complete login");
                OAuthError::internal()
            })?;
        if completed.is_none() {
            tracing::warn!(request_id = %request_id, "concurrent login completion lost the race");
            return Err(OAuthError::invalid_request(
                "Authorization request already completed",
            ));
        }

        {
            let mut query = redirect.query_pairs_mut();
            query.append_pair("code", &code);
            query.append_pair("iss", self.issuer());
            if let Some(state) = auth_request.state.as_deref().filter(|s| !s.is_empty()) {
                query.append_pair("state", state);
            }
        }

        tracing::info!(
            request_id = %request_id,
            client_id = %auth_request.client_id,
            user_id = %user_id,
            "login completed"
        );
        Ok(LoginCompleteResponse {
            redirect_uri: redirect.into(),
        })
    }

    async fn load_live_auth_request(&self, request_id: Uuid) -> Result<AuthRequest, OAuthError> {
        let auth_request = match self.db.get_auth_request(request_id).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                return Err(OAuthError::invalid_request(
                    "Unknown authorization request",
                ));
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "failed to load authorization request");
                return Err(OAuthError::internal());
            }
        };

        if auth_request.is_expired() {
            return Err(OAuthError::invalid_request(
                "Authorization request expired",
            ));
        }
        Ok(auth_request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DBClient, MemoryStore, NewAuthRequest};
    use crate::testing::{
        CONFIDENTIAL_ID, FaultyStore, REDIRECT_URI, authorize_request, provider, query_param,
        seeded_store,
    };
    use std::sync::Arc;

    async fn pending_request(provider: &OAuth2Provider, state: Option<&str>) -> Uuid {
        let mut request = authorize_request(CONFIDENTIAL_ID, "openid email");
        request.state = state.map(str::to_string);
        let login_url = provider.validate_authorize_request(&request).await.unwrap();
        Uuid::parse_str(&query_param(&login_url, "request_id").unwrap()).unwrap()
    }

    async fn expired_request(store: &MemoryStore) -> Uuid {
        store
            .insert_auth_request(NewAuthRequest {
                client_id: CONFIDENTIAL_ID.to_string(),
                redirect_uri: REDIRECT_URI.to_string(),
                scopes: vec!["openid".to_string()],
                state: None,
                nonce: None,
                code_challenge: None,
                code_challenge_method: None,
                resource: None,
                expires_at: OffsetDateTime::now_utc() - time::Duration::seconds(1),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_get_login_request() {
        let (store, _) = seeded_store().await;
        let provider = provider(Arc::new(store));
        let request_id = pending_request(&provider, None).await;

        let summary = provider.get_login_request(request_id).await.unwrap();
        assert_eq!(summary.request_id, request_id);
        assert_eq!(summary.client_id, CONFIDENTIAL_ID);
        assert_eq!(summary.scopes, vec!["openid", "email"]);
        assert_eq!(summary.redirect_uri, REDIRECT_URI);
    }

    #[tokio::test]
    async fn test_unknown_and_expired_requests() {
        let (store, user) = seeded_store().await;
        let provider = provider(Arc::new(store.clone()));

        let err = provider.get_login_request(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err, OAuthError::invalid_request("Unknown authorization request"));

        let expired = expired_request(&store).await;
        let err = provider.get_login_request(expired).await.unwrap_err();
        assert_eq!(err, OAuthError::invalid_request("Authorization request expired"));
        let err = provider.complete_login(expired, user.id).await.unwrap_err();
        assert_eq!(err, OAuthError::invalid_request("Authorization request expired"));
    }

    #[tokio::test]
    async fn test_complete_login_redirect() {
        let (store, user) = seeded_store().await;
        let provider = provider(Arc::new(store.clone()));

        let request_id = pending_request(&provider, Some("st-1")).await;
        let completed = provider.complete_login(request_id, user.id).await.unwrap();

        assert!(completed.redirect_uri.starts_with(REDIRECT_URI));
        let code = query_param(&completed.redirect_uri, "code").unwrap();
        assert_eq!(code.len(), 43);
        assert_eq!(
            query_param(&completed.redirect_uri, "iss").as_deref(),
            Some(provider.issuer())
        );
        assert_eq!(
            query_param(&completed.redirect_uri, "state").as_deref(),
            Some("st-1")
        );

        let stored = store.get_auth_request(request_id).await.unwrap().unwrap();
        assert!(stored.done);
        assert_eq!(stored.user_id, Some(user.id));
        assert!(stored.auth_time.is_some());
        assert_eq!(store.authorization_code_count().await, 1);
    }

    #[tokio::test]
    async fn test_empty_state_is_omitted() {
        let (store, user) = seeded_store().await;
        let provider = provider(Arc::new(store));

        let request_id = pending_request(&provider, Some("")).await;
        let completed = provider.complete_login(request_id, user.id).await.unwrap();
        assert!(query_param(&completed.redirect_uri, "state").is_none());
    }

    #[tokio::test]
    async fn test_second_completion_rejected() {
        let (store, user) = seeded_store().await;
        let provider = provider(Arc::new(store.clone()));

        let request_id = pending_request(&provider, None).await;
        provider.complete_login(request_id, user.id).await.unwrap();
        let err = provider.complete_login(request_id, user.id).await.unwrap_err();
        assert_eq!(
            err,
            OAuthError::invalid_request("Authorization request already completed")
        );
        assert_eq!(store.authorization_code_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_completion_exactly_once() {
        let (store, user) = seeded_store().await;
        let provider = Arc::new(provider(Arc::new(store.clone())));
        let request_id = pending_request(&provider, None).await;
        let user_id = user.id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.complete_login(request_id, user_id).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 1);
        assert_eq!(store.authorization_code_count().await, 1);
    }

    #[tokio::test]
    async fn test_storage_failure_is_server_error() {
        let (store, user) = seeded_store().await;
        let faulty = Arc::new(FaultyStore::new(store));
        let provider = provider(faulty.clone());
        let request_id = pending_request(&provider, None).await;

        faulty.fail("complete_login_and_insert_code");
        let err = provider.complete_login(request_id, user.id).await.unwrap_err();
        assert!(err.is_server_error());
    }
}
