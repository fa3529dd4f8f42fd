//! Typed claims for access and ID tokens.
//!
//! Well-known claims are typed fields. Anything else (the GraphQL
//! authorization block, deployment-specific claims) goes into the explicit
//! `additional` bag, which is flattened into the token payload.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::types::{User, scope};

/// Claims handed to a [`Signer`](super::Signer). `iss`, `iat` and `exp` are
/// added by the signer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id).
    pub sub: String,

    /// Audience (client id).
    pub aud: String,

    /// Granted scopes, space separated (access tokens).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Time of user authentication, unix seconds (ID tokens).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,

    /// Nonce from the authorization request (ID tokens).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Access token hash (ID tokens).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,

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

    /// Extra claims.
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

impl TokenClaims {
    /// Creates claims with subject and audience.
    #[must_use]
    pub fn new(sub: impl Into<String>, aud: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            aud: aud.into(),
            ..Self::default()
        }
    }

    /// Sets the scope claim.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Sets `auth_time`.
    #[must_use]
    pub fn with_auth_time(mut self, auth_time: i64) -> Self {
        self.auth_time = Some(auth_time);
        self
    }

    /// Sets the nonce. Empty nonces are dropped.
    #[must_use]
    pub fn with_nonce(mut self, nonce: Option<&str>) -> Self {
        self.nonce = nonce.filter(|n| !n.is_empty()).map(str::to_string);
        self
    }

    /// Sets `at_hash`.
    #[must_use]
    pub fn with_at_hash(mut self, at_hash: impl Into<String>) -> Self {
        self.at_hash = Some(at_hash.into());
        self
    }

    /// Adds an extra claim.
    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: Value) -> Self {
        self.additional.insert(name.into(), value);
        self
    }

    /// Adds the profile, email and phone claims allowed by `scopes`.
    ///
    /// - `email`: `email` and `email_verified`, only when the user has one
    /// - `profile`: `name`, `picture` and `locale`, each only when non-empty
    /// - `phone`: `phone_number` and `phone_number_verified`, only when set
    #[must_use]
    pub fn with_user_claims<S: AsRef<str>>(mut self, user: &User, scopes: &[S]) -> Self {
        let has = |s: &str| scopes.iter().any(|x| x.as_ref() == s);

        if has(scope::EMAIL)
            && let Some(email) = user.valid_email()
        {
            self.email = Some(email.to_string());
            self.email_verified = Some(user.email_verified);
        }

        if has(scope::PROFILE) {
            self.name = non_empty(&user.display_name);
            self.picture = non_empty(&user.avatar_url);
            self.locale = non_empty(&user.locale);
        }

        if has(scope::PHONE)
            && let Some(phone) = user.valid_phone_number()
        {
            self.phone_number = Some(phone.to_string());
            self.phone_number_verified = Some(user.phone_number_verified);
        }

        self
    }
}

pub(crate) fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Computes the OIDC `at_hash` of an access token: the base64url encoding
/// of the left half of its digest, using the hash matching the signing
/// algorithm's size.
#[must_use]
pub fn at_hash(access_token: &str, algorithm: &str) -> String {
    let digest: Vec<u8> = match algorithm {
        "HS384" | "RS384" | "ES384" | "PS384" => Sha384::digest(access_token.as_bytes()).to_vec(),
        "HS512" | "RS512" | "ES512" | "PS512" => Sha512::digest(access_token.as_bytes()).to_vec(),
        _ => Sha256::digest(access_token.as_bytes()).to_vec(),
    };
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}
