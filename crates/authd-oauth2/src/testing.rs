//! Shared fixtures for unit tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;
use uuid::Uuid;

use crate::config::{OAuth2Config, SigningConfig};
use crate::oauth::AuthorizeRequest;
use crate::oauth::pkce::s256_challenge;
use crate::provider::OAuth2Provider;
use crate::secret::VerifySecretFn;
use crate::storage::{
    CompleteLogin, ConsumeCode, DBClient, MemoryStore, NewAuthRequest, RotateRefreshToken,
    StorageError, StorageResult, UpsertCimdClient,
};
use crate::token::JwtSigner;
use crate::types::{AuthRequest, Client, ClientType, RefreshToken, User};

pub const ISSUER: &str = "https://auth.example.com";
pub const SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";
pub const CONFIDENTIAL_ID: &str = "confidential-app";
pub const CONFIDENTIAL_SECRET: &str = "app-secret";
pub const PUBLIC_ID: &str = "public-app";

pub fn test_config() -> OAuth2Config {
    OAuth2Config {
        enabled: true,
        signing: SigningConfig {
            issuer: ISSUER.to_string(),
            algorithm: "HS256".to_string(),
            secret: SECRET.to_string(),
            ..SigningConfig::default()
        },
        ..OAuth2Config::default()
    }
}

/// Secrets "hash" to `hashed:<secret>`.
pub fn plain_verifier() -> VerifySecretFn {
    Arc::new(|secret: &str, hash: &str| hash == format!("hashed:{secret}"))
}

pub fn provider(db: Arc<dyn DBClient>) -> OAuth2Provider {
    provider_with_config(db, test_config())
}

pub fn provider_with_config(db: Arc<dyn DBClient>, config: OAuth2Config) -> OAuth2Provider {
    let signer = JwtSigner::from_config(&config.signing).unwrap();
    OAuth2Provider::new(
        config,
        db,
        Arc::new(signer),
        plain_verifier(),
        reqwest::Client::new(),
    )
}

pub fn confidential_client() -> Client {
    Client {
        client_id: CONFIDENTIAL_ID.to_string(),
        client_secret_hash: Some(format!("hashed:{CONFIDENTIAL_SECRET}")),
        redirect_uris: vec![REDIRECT_URI.to_string()],
        scopes: ["openid", "profile", "email", "phone", "offline_access", "graphql"]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
        client_type: ClientType::Static,
        metadata_fetched_at: None,
    }
}

pub fn public_client() -> Client {
    Client {
        client_id: PUBLIC_ID.to_string(),
        client_secret_hash: None,
        redirect_uris: vec![REDIRECT_URI.to_string()],
        scopes: vec!["openid".to_string(), "profile".to_string()],
        client_type: ClientType::Static,
        metadata_fetched_at: None,
    }
}

pub fn test_user() -> User {
    User {
        id: Uuid::new_v4(),
        display_name: "Jane Doe".to_string(),
        avatar_url: "https://img.example.com/jane.png".to_string(),
        locale: "en".to_string(),
        email: Some("jane@example.com".to_string()),
        email_verified: true,
        phone_number: None,
        phone_number_verified: false,
        default_role: "user".to_string(),
        is_anonymous: false,
    }
}

/// Store seeded with both test clients and one user.
pub async fn seeded_store() -> (MemoryStore, User) {
    let store = MemoryStore::new();
    store.insert_client(confidential_client()).await;
    store.insert_client(public_client()).await;
    let user = test_user();
    store.insert_user(user.clone()).await;
    store.set_user_roles(user.id, vec!["me".to_string()]).await;
    (store, user)
}

// =============================================================================
// Flow Helpers
// =============================================================================

pub const VERIFIER: &str = "dBjftJeZ4CVP-mJ92K9rsmdBqq8sSkBbtwPEOKPrRVVf7GtV2tZVH0DvoMnA";

pub fn authorize_request(client_id: &str, scope: &str) -> AuthorizeRequest {
    AuthorizeRequest {
        client_id: client_id.to_string(),
        redirect_uri: REDIRECT_URI.to_string(),
        response_type: "code".to_string(),
        scope: Some(scope.to_string()),
        code_challenge: Some(s256_challenge(VERIFIER)),
        code_challenge_method: Some("S256".to_string()),
        ..AuthorizeRequest::default()
    }
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Runs authorize and login completion, returning the authorization code.
pub async fn issue_code(provider: &OAuth2Provider, request: &AuthorizeRequest, user_id: Uuid) -> String {
    let login_url = provider.validate_authorize_request(request).await.unwrap();
    let request_id = Uuid::parse_str(&query_param(&login_url, "request_id").unwrap()).unwrap();
    let completed = provider.complete_login(request_id, user_id).await.unwrap();
    query_param(&completed.redirect_uri, "code").unwrap()
}

// =============================================================================
// Failure Injection
// =============================================================================

/// [`MemoryStore`] wrapper whose operations can be made to fail by name.
#[derive(Debug, Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    failing: Mutex<HashSet<&'static str>>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing: Mutex::default(),
        }
    }

    /// Makes every later call of `operation` fail with a backend error.
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    fn check(&self, operation: &'static str) -> StorageResult<()> {
        if self.failing.lock().unwrap().contains(operation) {
            return Err(StorageError::backend(format!(
                "injected failure in {operation}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DBClient for FaultyStore {
    async fn get_client(&self, client_id: &str) -> StorageResult<Option<Client>> {
        self.check("get_client")?;
        self.inner.get_client(client_id).await
    }

    async fn insert_auth_request(&self, request: NewAuthRequest) -> StorageResult<AuthRequest> {
        self.check("insert_auth_request")?;
        self.inner.insert_auth_request(request).await
    }

    async fn get_auth_request(&self, id: Uuid) -> StorageResult<Option<AuthRequest>> {
        self.check("get_auth_request")?;
        self.inner.get_auth_request(id).await
    }

    async fn complete_login_and_insert_code(
        &self,
        params: CompleteLogin,
    ) -> StorageResult<Option<AuthRequest>> {
        self.check("complete_login_and_insert_code")?;
        self.inner.complete_login_and_insert_code(params).await
    }

    async fn get_auth_request_by_code_hash(
        &self,
        code_hash: &str,
    ) -> StorageResult<Option<AuthRequest>> {
        self.check("get_auth_request_by_code_hash")?;
        self.inner.get_auth_request_by_code_hash(code_hash).await
    }

    async fn delete_authorization_code(&self, code_hash: &str) -> StorageResult<()> {
        self.check("delete_authorization_code")?;
        self.inner.delete_authorization_code(code_hash).await
    }

    async fn consume_code_and_insert_refresh_token(
        &self,
        params: ConsumeCode,
    ) -> StorageResult<Option<RefreshToken>> {
        self.check("consume_code_and_insert_refresh_token")?;
        self.inner.consume_code_and_insert_refresh_token(params).await
    }

    async fn get_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> StorageResult<Option<RefreshToken>> {
        self.check("get_refresh_token_by_hash")?;
        self.inner.get_refresh_token_by_hash(token_hash).await
    }

    async fn delete_refresh_token(&self, token_hash: &str, client_id: &str) -> StorageResult<u64> {
        self.check("delete_refresh_token")?;
        self.inner.delete_refresh_token(token_hash, client_id).await
    }

    async fn rotate_refresh_token(
        &self,
        params: RotateRefreshToken,
    ) -> StorageResult<Option<RefreshToken>> {
        self.check("rotate_refresh_token")?;
        self.inner.rotate_refresh_token(params).await
    }

    async fn delete_refresh_tokens_by_user(&self, user_id: Uuid) -> StorageResult<u64> {
        self.check("delete_refresh_tokens_by_user")?;
        self.inner.delete_refresh_tokens_by_user(user_id).await
    }

    async fn delete_expired_auth_requests(&self) -> StorageResult<u64> {
        self.check("delete_expired_auth_requests")?;
        self.inner.delete_expired_auth_requests().await
    }

    async fn delete_expired_authorization_codes(&self) -> StorageResult<u64> {
        self.check("delete_expired_authorization_codes")?;
        self.inner.delete_expired_authorization_codes().await
    }

    async fn delete_expired_refresh_tokens(&self) -> StorageResult<u64> {
        self.check("delete_expired_refresh_tokens")?;
        self.inner.delete_expired_refresh_tokens().await
    }

    async fn upsert_cimd_client(&self, params: UpsertCimdClient) -> StorageResult<Client> {
        self.check("upsert_cimd_client")?;
        self.inner.upsert_cimd_client(params).await
    }

    async fn get_user(&self, user_id: Uuid) -> StorageResult<Option<User>> {
        self.check("get_user")?;
        self.inner.get_user(user_id).await
    }

    async fn get_user_roles(&self, user_id: Uuid) -> StorageResult<Vec<String>> {
        self.check("get_user_roles")?;
        self.inner.get_user_roles(user_id).await
    }
}
