//! OIDC userinfo.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OAuthError;
use crate::provider::OAuth2Provider;
use crate::token::claims::non_empty;
use crate::types::{User, scope};

/// Scope-filtered userinfo claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserinfoResponse {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number_verified: Option<bool>,
}

impl UserinfoResponse {
    /// Projects `user` onto the claims allowed by `scopes`.
    #[must_use]
    pub fn for_user<S: AsRef<str>>(user: &User, scopes: &[S]) -> Self {
        let has = |s: &str| scopes.iter().any(|x| x.as_ref() == s);
        let mut response = Self {
            sub: user.id.to_string(),
            ..Self::default()
        };

        if has(scope::EMAIL)
            && let Some(email) = user.valid_email()
        {
            response.email = Some(email.to_string());
            response.email_verified = Some(user.email_verified);
        }

        if has(scope::PROFILE) {
            response.name = non_empty(&user.display_name);
            response.picture = non_empty(&user.avatar_url);
            response.locale = non_empty(&user.locale);
        }

        if has(scope::PHONE)
            && let Some(phone) = user.valid_phone_number()
        {
            response.phone_number = Some(phone.to_string());
            response.phone_number_verified = Some(user.phone_number_verified);
        }

        response
    }
}

impl OAuth2Provider {
    /// Builds the userinfo response for a user and the scopes granted to
    /// the presented token.
    ///
    /// # Errors
    ///
    /// - `invalid_token` if the user does not exist
    /// - `server_error` on storage failures
    pub async fn get_userinfo<S: AsRef<str>>(
        &self,
        user_id: Uuid,
        scopes: &[S],
    ) -> Result<UserinfoResponse, OAuthError> {
        let user = match self.db.get_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return Err(OAuthError::invalid_token("User not found")),
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "failed to load user for userinfo");
                return Err(OAuthError::internal());
            }
        };
        Ok(UserinfoResponse::for_user(&user, scopes))
    }

    /// Validates a bearer access token and returns the userinfo for its
    /// subject and scopes.
    ///
    /// # Errors
    ///
    /// - `invalid_token` if the token does not validate, its subject is not
    ///   a user id, or the user does not exist
    /// - `server_error` on storage failures
    pub async fn userinfo_from_access_token(
        &self,
        access_token: &str,
    ) -> Result<UserinfoResponse, OAuthError> {
        let claims = self.signer.validate(access_token).map_err(|e| {
            tracing::debug!(error = %e, "userinfo bearer token rejected");
            OAuthError::invalid_token("Invalid access token")
        })?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| OAuthError::invalid_token("Invalid access token"))?;
        let scopes: Vec<&str> = claims
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default();
        self.get_userinfo(user_id, &scopes).await
    }
}
