//! Authorization endpoint request validation.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::error::{AuthorizeRejection, OAuthError, error_redirect_url};
use crate::provider::OAuth2Provider;
use crate::storage::NewAuthRequest;
use crate::types::scope;

/// Parameters of an authorization request.
///
/// Optional parameters keep the distinction between absent and empty; the
/// validator treats an empty `scope` or `code_challenge` as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default)]
    pub code_challenge_method: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    /// Forwarded to the login UI, e.g. `consent`.
    #[serde(default)]
    pub prompt: Option<String>,
}

impl AuthorizeRequest {
    /// Requested scopes; `openid` when none are given.
    #[must_use]
    pub fn requested_scopes(&self) -> Vec<String> {
        let scopes: Vec<String> = self
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if scopes.is_empty() {
            vec![scope::OPENID.to_string()]
        } else {
            scopes
        }
    }
}

impl OAuth2Provider {
    /// Validates an authorization request and persists it.
    ///
    /// Returns the login UI URL the user agent should be sent to.
    ///
    /// # Errors
    ///
    /// Failures up to and including the redirect URI check are returned
    /// without a redirect URL. Later failures carry an error redirect to the
    /// now trusted redirect URI.
    pub async fn validate_authorize_request(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<String, AuthorizeRejection> {
        // Step 1: Resolve the client
        let client = self
            .resolve_client(&request.client_id)
            .await
            .map_err(AuthorizeRejection::direct)?;

        // Step 2: Verify the redirect URI before trusting it
        if !client.is_redirect_uri_allowed(&request.redirect_uri) {
            tracing::warn!(
                client_id = %request.client_id,
                redirect_uri = %request.redirect_uri,
                "authorization request with unregistered redirect_uri"
            );
            return Err(AuthorizeRejection::direct(OAuthError::invalid_request(
                "Invalid redirect_uri",
            )));
        }

        let redirect = |error: OAuthError| AuthorizeRejection {
            redirect_url: error_redirect_url(
                &request.redirect_uri,
                request.state.as_deref(),
                self.issuer(),
                &error,
            ),
            error,
        };

        // Step 3: Response type
        if request.response_type != "code" {
            return Err(redirect(OAuthError::unsupported_response_type(
                "Only response_type=code is supported",
            )));
        }

        // Step 4: Scopes must be allowed for the client
        let scopes = request.requested_scopes();
        if let Some(denied) = scopes.iter().find(|s| !client.is_scope_allowed(s)) {
            return Err(redirect(OAuthError::invalid_scope(format!(
                "Scope \"{denied}\" not allowed for this client"
            ))));
        }

        // Step 5: Public clients must use PKCE
        let has_challenge = request
            .code_challenge
            .as_deref()
            .is_some_and(|c| !c.is_empty());
        if client.is_public() && !has_challenge {
            return Err(redirect(OAuthError::invalid_request(
                "PKCE code_challenge is required for public clients",
            )));
        }

        // Step 6: Persist the request
        let auth_request = self
            .db
            .insert_auth_request(NewAuthRequest {
                client_id: client.client_id.clone(),
                redirect_uri: request.redirect_uri.clone(),
                scopes,
                state: request.state.clone(),
                nonce: request.nonce.clone(),
                code_challenge: request.code_challenge.clone(),
                code_challenge_method: request.code_challenge_method.clone(),
                resource: request.resource.clone(),
                expires_at: OffsetDateTime::now_utc() + self.config.auth_request_lifetime,
            })
            .await
            .map_err(|e| {
                tracing::error!(client_id = %client.client_id, error = %e, "failed to store authorization request");
                redirect(OAuthError::internal())
            })?;

        // Step 7: Hand over to the login UI
        let mut login_url = Url::parse(&self.config.login_base_url()).map_err(|e| {
            tracing::error!(error = %e, "login URL is not a valid URL");
            redirect(OAuthError::internal())
        })?;
        {
            let mut query = login_url.query_pairs_mut();
            query.append_pair("request_id", &auth_request.id.to_string());
            if let Some(prompt) = request.prompt.as_deref().filter(|p| !p.is_empty()) {
                query.append_pair("prompt", prompt);
            }
        }

        tracing::debug!(
            client_id = %client.client_id,
            request_id = %auth_request.id,
            "authorization request accepted"
        );
        Ok(login_url.into())
    }
}
