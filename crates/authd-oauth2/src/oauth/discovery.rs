//! OpenID Provider metadata and JWKS.

use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};

use super::pkce::S256;
use super::token::{GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN};
use crate::provider::OAuth2Provider;
use crate::types::scope::SUPPORTED_SCOPES;

/// Claims that may appear in ID tokens and userinfo responses.
pub const CLAIMS_SUPPORTED: &[&str] = &[
    "sub",
    "iss",
    "aud",
    "exp",
    "iat",
    "auth_time",
    "nonce",
    "at_hash",
    "email",
    "email_verified",
    "name",
    "picture",
    "locale",
    "phone_number",
    "phone_number_verified",
];

/// Client authentication methods accepted at the token endpoint.
pub const TOKEN_ENDPOINT_AUTH_METHODS: &[&str] =
    &["client_secret_basic", "client_secret_post", "none"];

/// OpenID Connect discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub introspection_endpoint: String,
    pub revocation_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id_metadata_document_supported: Option<bool>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

impl OAuth2Provider {
    /// Builds the discovery document served at
    /// `/.well-known/openid-configuration`.
    #[must_use]
    pub fn discovery_document(&self) -> DiscoveryDocument {
        let base = self.config.server_url.trim_end_matches('/');
        let endpoint = |path: &str| format!("{base}{path}");

        DiscoveryDocument {
            issuer: self.signer.issuer().to_string(),
            authorization_endpoint: endpoint("/oauth2/authorize"),
            token_endpoint: endpoint("/oauth2/token"),
            userinfo_endpoint: endpoint("/oauth2/userinfo"),
            jwks_uri: endpoint("/.well-known/jwks.json"),
            introspection_endpoint: endpoint("/oauth2/introspect"),
            revocation_endpoint: endpoint("/oauth2/revoke"),
            response_types_supported: strings(&["code"]),
            grant_types_supported: strings(&[GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN]),
            subject_types_supported: strings(&["public"]),
            id_token_signing_alg_values_supported: vec![self.signer.algorithm().to_string()],
            scopes_supported: strings(SUPPORTED_SCOPES),
            token_endpoint_auth_methods_supported: strings(TOKEN_ENDPOINT_AUTH_METHODS),
            claims_supported: strings(CLAIMS_SUPPORTED),
            code_challenge_methods_supported: strings(&[S256]),
            client_id_metadata_document_supported: self.config.cimd.enabled.then_some(true),
        }
    }

    /// The signer's public keys, passed through unchanged.
    #[must_use]
    pub fn jwks(&self) -> JwkSet {
        self.signer.jwks()
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{ISSUER, provider, provider_with_config, test_config};
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_discovery_document() {
        let mut config = test_config();
        config.server_url = "https://auth.example.com/v1/".to_string();
        let provider = provider_with_config(Arc::new(MemoryStore::new()), config);

        let doc = provider.discovery_document();
        assert_eq!(doc.issuer, ISSUER);
        assert_eq!(doc.authorization_endpoint, "https://auth.example.com/v1/oauth2/authorize");
        assert_eq!(doc.token_endpoint, "https://auth.example.com/v1/oauth2/token");
        assert_eq!(doc.jwks_uri, "https://auth.example.com/v1/.well-known/jwks.json");
        assert_eq!(doc.response_types_supported, vec!["code"]);
        assert_eq!(doc.grant_types_supported, vec!["authorization_code", "refresh_token"]);
        assert_eq!(doc.id_token_signing_alg_values_supported, vec!["HS256"]);
        assert_eq!(doc.code_challenge_methods_supported, vec!["S256"]);
        assert!(doc.scopes_supported.contains(&"graphql".to_string()));
        assert!(doc.client_id_metadata_document_supported.is_none());

        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("client_id_metadata_document_supported").is_none());
    }

    #[test]
    fn test_discovery_advertises_cimd() {
        let mut config = test_config();
        config.cimd.enabled = true;
        let provider = provider_with_config(Arc::new(MemoryStore::new()), config);
        assert_eq!(
            provider.discovery_document().client_id_metadata_document_supported,
            Some(true)
        );
    }

    #[test]
    fn test_jwks_passthrough() {
        let provider = provider(Arc::new(MemoryStore::new()));
        assert!(provider.jwks().keys.is_empty());
    }
}
