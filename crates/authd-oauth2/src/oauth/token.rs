//! Token endpoint: authorization code and refresh token grants.
//!
//! Each grant is split into a validation step, which has no side effects,
//! and an issuance step, which consumes the presented credential exactly
//! once through an atomic storage operation.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::client_auth::authenticate_client;
use super::pkce::verify_pkce;
use crate::error::OAuthError;
use crate::provider::OAuth2Provider;
use crate::storage::{ConsumeCode, RotateRefreshToken};
use crate::token::{TokenClaims, at_hash, generate_token, hash_token};
use crate::types::{AuthRequest, Client, RefreshToken, scope};

/// `grant_type` of the authorization code grant.
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
/// `grant_type` of the refresh token grant.
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// Token endpoint request (form parameters and client credentials).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Successful token response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `Bearer`.
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub refresh_token: String,
    /// Granted scopes, space separated.
    pub scope: String,
    /// Present when `openid` was granted and minting succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// A code exchange that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedCodeExchange {
    pub user_id: Uuid,
    pub code_hash: String,
    pub auth_request: AuthRequest,
    pub client: Client,
}

/// A refresh grant that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedRefreshGrant {
    pub token_hash: String,
    pub refresh_token: RefreshToken,
    pub client: Client,
}

impl OAuth2Provider {
    /// Dispatches a token request on its `grant_type`.
    ///
    /// # Errors
    ///
    /// - `invalid_request` if `grant_type` is missing
    /// - `unsupported_grant_type` for any grant other than
    ///   `authorization_code` and `refresh_token`
    /// - any error of the selected grant
    pub async fn token(&self, request: &TokenRequest) -> Result<TokenResponse, OAuthError> {
        match request.grant_type.as_deref() {
            Some(GRANT_AUTHORIZATION_CODE) => {
                let validated = self.validate_code_exchange(request).await?;
                self.issue_tokens_from_code(validated).await
            }
            Some(GRANT_REFRESH_TOKEN) => {
                let validated = self.validate_refresh_grant(request).await?;
                self.issue_tokens_from_refresh(validated).await
            }
            None | Some("") => Err(OAuthError::invalid_request("Missing grant_type")),
            Some(other) => Err(OAuthError::unsupported_grant_type(format!(
                "Unsupported grant_type: {other}"
            ))),
        }
    }

    // =========================================================================
    // Authorization Code Grant
    // =========================================================================

    /// Validates an authorization code exchange.
    ///
    /// # Errors
    ///
    /// - `invalid_request` for a missing code, an unexpected `redirect_uri`
    ///   or missing PKCE
    /// - `invalid_grant` for an unknown/expired/incomplete code, a
    ///   `redirect_uri` mismatch or a wrong verifier
    /// - `invalid_client` if client resolution or authentication fails
    /// - `server_error` on storage failures
    pub async fn validate_code_exchange(
        &self,
        request: &TokenRequest,
    ) -> Result<ValidatedCodeExchange, OAuthError> {
        let Some(code) = request.code.as_deref().filter(|c| !c.is_empty()) else {
            return Err(OAuthError::invalid_request("Missing code"));
        };
        let code_hash = hash_token(code);

        let auth_request = match self.db.get_auth_request_by_code_hash(&code_hash).await {
            Ok(Some(auth_request)) => auth_request,
            Ok(None) => {
                tracing::warn!("token request with unknown authorization code");
                return Err(OAuthError::invalid_grant("Invalid authorization code"));
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to look up authorization code");
                return Err(OAuthError::internal());
            }
        };

        let Some(user_id) = auth_request.user_id else {
            return Err(OAuthError::invalid_grant("Authorization not completed"));
        };

        check_redirect_uri(&auth_request.redirect_uri, request.redirect_uri.as_deref())?;

        let client = self.resolve_client(&auth_request.client_id).await?;

        verify_pkce(
            &auth_request,
            request.code_verifier.as_deref(),
            client.is_public(),
        )?;

        authenticate_client(
            &client,
            request.client_id.as_deref(),
            request.client_secret.as_deref(),
            &self.verify_secret,
        )?;

        Ok(ValidatedCodeExchange {
            user_id,
            code_hash,
            auth_request,
            client,
        })
    }

    /// Issues tokens for a validated code exchange, consuming the code.
    ///
    /// # Errors
    ///
    /// - `invalid_grant` if the code was consumed concurrently
    /// - `server_error` on storage or signing failures
    pub async fn issue_tokens_from_code(
        &self,
        validated: ValidatedCodeExchange,
    ) -> Result<TokenResponse, OAuthError> {
        let ValidatedCodeExchange {
            user_id,
            code_hash,
            auth_request,
            client,
        } = validated;
        let scopes = auth_request.scopes.clone();

        let access_token = self
            .mint_access_token(user_id, &client.client_id, &scopes)
            .await?;

        let refresh_token = generate_token();
        let consumed = self
            .db
            .consume_code_and_insert_refresh_token(ConsumeCode {
                code_hash,
                refresh_token_hash: hash_token(&refresh_token),
                client_id: client.client_id.clone(),
                user_id,
                scopes: scopes.clone(),
                auth_request_id: auth_request.id,
                expires_at: OffsetDateTime::now_utc() + self.config.refresh_token_lifetime,
            })
            .await
            .map_err(|e| {
                tracing::error!(client_id = %client.client_id, error = %e, "failed to consume authorization code");
                OAuthError::internal()
            })?;
        if consumed.is_none() {
            tracing::warn!(client_id = %client.client_id, "authorization code already consumed");
            return Err(OAuthError::invalid_grant("Invalid authorization code"));
        }

        let id_token = if scopes.iter().any(|s| s == scope::OPENID) {
            let auth_time = auth_request
                .auth_time
                .unwrap_or_else(OffsetDateTime::now_utc);
            self.mint_id_token(
                user_id,
                &client.client_id,
                &scopes,
                auth_request.nonce.as_deref(),
                auth_time,
                &access_token,
            )
            .await
        } else {
            None
        };

        tracing::info!(client_id = %client.client_id, user_id = %user_id, "issued tokens for authorization code");
        Ok(self.token_response(access_token, refresh_token, &scopes, id_token))
    }

    // =========================================================================
    // Refresh Token Grant
    // =========================================================================

    /// Validates a refresh token grant.
    ///
    /// # Errors
    ///
    /// - `invalid_request` if the refresh token is missing
    /// - `invalid_grant` if it is unknown or expired
    /// - `invalid_client` if client resolution or authentication fails
    /// - `server_error` on storage failures
    pub async fn validate_refresh_grant(
        &self,
        request: &TokenRequest,
    ) -> Result<ValidatedRefreshGrant, OAuthError> {
        let Some(presented) = request.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
            return Err(OAuthError::invalid_request("Missing refresh_token"));
        };
        let token_hash = hash_token(presented);

        let refresh_token = match self.db.get_refresh_token_by_hash(&token_hash).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::warn!("refresh grant with unknown refresh token");
                return Err(OAuthError::invalid_grant("Invalid refresh token"));
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to look up refresh token");
                return Err(OAuthError::internal());
            }
        };

        if refresh_token.is_expired() {
            return Err(OAuthError::invalid_grant("Refresh token expired"));
        }

        let client = self.resolve_client(&refresh_token.client_id).await?;

        authenticate_client(
            &client,
            request.client_id.as_deref(),
            request.client_secret.as_deref(),
            &self.verify_secret,
        )?;

        Ok(ValidatedRefreshGrant {
            token_hash,
            refresh_token,
            client,
        })
    }

    /// Issues tokens for a validated refresh grant, rotating the refresh
    /// token.
    ///
    /// # Errors
    ///
    /// - `invalid_grant` if the token was rotated concurrently
    /// - `server_error` on storage or signing failures
    pub async fn issue_tokens_from_refresh(
        &self,
        validated: ValidatedRefreshGrant,
    ) -> Result<TokenResponse, OAuthError> {
        let ValidatedRefreshGrant {
            token_hash,
            refresh_token: stored,
            client,
        } = validated;
        let scopes = stored.scopes.clone();

        let access_token = self
            .mint_access_token(stored.user_id, &client.client_id, &scopes)
            .await?;

        let refresh_token = generate_token();
        let rotated = self
            .db
            .rotate_refresh_token(RotateRefreshToken {
                old_token_hash: token_hash,
                new_token_hash: hash_token(&refresh_token),
                expires_at: OffsetDateTime::now_utc() + self.config.refresh_token_lifetime,
            })
            .await
            .map_err(|e| {
                tracing::error!(client_id = %client.client_id, error = %e, "failed to rotate refresh token");
                OAuthError::internal()
            })?;
        if rotated.is_none() {
            tracing::warn!(
                client_id = %client.client_id,
                user_id = %stored.user_id,
                "refresh token reuse detected"
            );
            return Err(OAuthError::invalid_grant("Invalid refresh token"));
        }

        let id_token = if scopes.iter().any(|s| s == scope::OPENID) {
            let auth_time = self.original_auth_time(stored.auth_request_id).await;
            self.mint_id_token(
                stored.user_id,
                &client.client_id,
                &scopes,
                None,
                auth_time,
                &access_token,
            )
            .await
        } else {
            None
        };

        tracing::info!(client_id = %client.client_id, user_id = %stored.user_id, "refreshed tokens");
        Ok(self.token_response(access_token, refresh_token, &scopes, id_token))
    }

    // =========================================================================
    // Claim Assembly
    // =========================================================================

    async fn mint_access_token(
        &self,
        user_id: Uuid,
        client_id: &str,
        scopes: &[String],
    ) -> Result<String, OAuthError> {
        let mut claims = TokenClaims::new(user_id.to_string(), client_id).with_scope(scopes.join(" "));

        if scopes.iter().any(|s| s == scope::GRAPHQL) {
            let (namespace, block) = self.graphql_claims(user_id).await?;
            claims = claims.with_claim(namespace, block);
        }

        let expires_at = OffsetDateTime::now_utc() + self.config.access_token_lifetime;
        self.signer.sign(&claims, expires_at).map_err(|e| {
            tracing::error!(client_id = %client_id, error = %e, "failed to sign access token");
            OAuthError::internal()
        })
    }

    async fn graphql_claims(
        &self,
        user_id: Uuid,
    ) -> Result<(String, serde_json::Value), OAuthError> {
        let user = match self.db.get_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::error!(user_id = %user_id, "token subject does not exist");
                return Err(OAuthError::internal());
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "failed to load user");
                return Err(OAuthError::internal());
            }
        };

        let mut allowed_roles = self.db.get_user_roles(user_id).await.map_err(|e| {
            tracing::error!(user_id = %user_id, error = %e, "failed to load user roles");
            OAuthError::internal()
        })?;
        if !allowed_roles.contains(&user.default_role) {
            allowed_roles.push(user.default_role.clone());
        }

        self.signer
            .graphql_claims(user_id, user.is_anonymous, &allowed_roles, &user.default_role)
            .map_err(|e| {
                tracing::error!(user_id = %user_id, error = %e, "failed to build graphql claims");
                OAuthError::internal()
            })
    }

    /// Mints an ID token. Failures are logged and yield `None`.
    async fn mint_id_token(
        &self,
        user_id: Uuid,
        client_id: &str,
        scopes: &[String],
        nonce: Option<&str>,
        auth_time: OffsetDateTime,
        access_token: &str,
    ) -> Option<String> {
        let user = match self.db.get_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::error!(user_id = %user_id, "cannot mint id token for missing user");
                return None;
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "failed to load user for id token");
                return None;
            }
        };

        let claims = TokenClaims::new(user_id.to_string(), client_id)
            .with_auth_time(auth_time.unix_timestamp())
            .with_nonce(nonce)
            .with_at_hash(at_hash(access_token, self.signer.algorithm()))
            .with_user_claims(&user, scopes);

        let expires_at = OffsetDateTime::now_utc() + self.config.access_token_lifetime;
        match self.signer.sign(&claims, expires_at) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::error!(client_id = %client_id, error = %e, "failed to sign id token");
                None
            }
        }
    }

    /// `auth_time` of the authorization request a refresh token came from,
    /// or now when that request is gone.
    async fn original_auth_time(&self, auth_request_id: Uuid) -> OffsetDateTime {
        match self.db.get_auth_request(auth_request_id).await {
            Ok(Some(AuthRequest {
                auth_time: Some(auth_time),
                ..
            })) => auth_time,
            _ => OffsetDateTime::now_utc(),
        }
    }

    fn token_response(
        &self,
        access_token: String,
        refresh_token: String,
        scopes: &[String],
        id_token: Option<String>,
    ) -> TokenResponse {
        TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_lifetime.as_secs(),
            refresh_token,
            scope: scopes.join(" "),
            id_token,
        }
    }
}

/// The `redirect_uri` of a code exchange must repeat the one used at the
/// authorization endpoint; when none was used, none may be sent.
fn check_redirect_uri(stored: &str, presented: Option<&str>) -> Result<(), OAuthError> {
    if !stored.is_empty() {
        if presented != Some(stored) {
            return Err(OAuthError::invalid_grant("redirect_uri mismatch"));
        }
    } else if presented.is_some() {
        return Err(OAuthError::invalid_request("redirect_uri not expected"));
    }
    Ok(())
}
