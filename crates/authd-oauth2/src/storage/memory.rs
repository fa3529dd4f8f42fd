//! In-memory [`DBClient`] implementation.
//!
//! All tables live behind a single `tokio::sync::RwLock`, so every compound
//! operation observes and mutates a consistent snapshot. This gives the
//! exactly-once guarantees of code consumption, login completion and token
//! rotation without any further coordination.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CompleteLogin, ConsumeCode, DBClient, NewAuthRequest, RotateRefreshToken, StorageError,
    StorageResult, UpsertCimdClient,
};
use crate::types::{AuthRequest, Client, ClientType, RefreshToken, User};

#[derive(Debug, Clone)]
struct StoredCode {
    auth_request_id: Uuid,
    expires_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct Tables {
    clients: HashMap<String, Client>,
    auth_requests: HashMap<Uuid, AuthRequest>,
    /// code hash -> code
    codes: HashMap<String, StoredCode>,
    /// token hash -> token
    refresh_tokens: HashMap<String, RefreshToken>,
    users: HashMap<Uuid, User>,
    roles: HashMap<Uuid, Vec<String>>,
}

/// In-memory storage backend.
///
/// Cloning is cheap and clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a client.
    pub async fn insert_client(&self, client: Client) {
        self.tables
            .write()
            .await
            .clients
            .insert(client.client_id.clone(), client);
    }

    /// Registers (or replaces) a user.
    pub async fn insert_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id, user);
    }

    /// Replaces the roles of a user.
    pub async fn set_user_roles(&self, user_id: Uuid, roles: Vec<String>) {
        self.tables.write().await.roles.insert(user_id, roles);
    }

    /// Number of refresh tokens currently stored.
    pub async fn refresh_token_count(&self) -> usize {
        self.tables.read().await.refresh_tokens.len()
    }

    /// Number of authorization codes currently stored.
    pub async fn authorization_code_count(&self) -> usize {
        self.tables.read().await.codes.len()
    }
}

#[async_trait]
impl DBClient for MemoryStore {
    async fn get_client(&self, client_id: &str) -> StorageResult<Option<Client>> {
        Ok(self.tables.read().await.clients.get(client_id).cloned())
    }

    async fn insert_auth_request(&self, request: NewAuthRequest) -> StorageResult<AuthRequest> {
        let record = AuthRequest {
            id: Uuid::new_v4(),
            client_id: request.client_id,
            redirect_uri: request.redirect_uri,
            scopes: request.scopes,
            state: request.state,
            nonce: request.nonce,
            code_challenge: request.code_challenge,
            code_challenge_method: request.code_challenge_method,
            resource: request.resource,
            user_id: None,
            done: false,
            auth_time: None,
            created_at: OffsetDateTime::now_utc(),
            expires_at: request.expires_at,
        };
        self.tables
            .write()
            .await
            .auth_requests
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_auth_request(&self, id: Uuid) -> StorageResult<Option<AuthRequest>> {
        Ok(self.tables.read().await.auth_requests.get(&id).cloned())
    }

    async fn complete_login_and_insert_code(
        &self,
        params: CompleteLogin,
    ) -> StorageResult<Option<AuthRequest>> {
        let mut tables = self.tables.write().await;

        let completed = match tables.auth_requests.get_mut(&params.auth_request_id) {
            Some(request) if !request.done => {
                request.done = true;
                request.user_id = Some(params.user_id);
                request.auth_time = Some(params.auth_time);
                request.clone()
            }
            _ => return Ok(None),
        };

        tables.codes.insert(
            params.code_hash,
            StoredCode {
                auth_request_id: completed.id,
                expires_at: params.code_expires_at,
            },
        );
        Ok(Some(completed))
    }

    async fn get_auth_request_by_code_hash(
        &self,
        code_hash: &str,
    ) -> StorageResult<Option<AuthRequest>> {
        let tables = self.tables.read().await;
        let now = OffsetDateTime::now_utc();
        Ok(tables
            .codes
            .get(code_hash)
            .filter(|code| code.expires_at > now)
            .and_then(|code| tables.auth_requests.get(&code.auth_request_id))
            .cloned())
    }

    async fn delete_authorization_code(&self, code_hash: &str) -> StorageResult<()> {
        self.tables.write().await.codes.remove(code_hash);
        Ok(())
    }

    async fn consume_code_and_insert_refresh_token(
        &self,
        params: ConsumeCode,
    ) -> StorageResult<Option<RefreshToken>> {
        let mut tables = self.tables.write().await;

        if !tables.codes.contains_key(&params.code_hash) {
            return Ok(None);
        }

        // a conflicting insert must leave the code redeemable
        if tables.refresh_tokens.contains_key(&params.refresh_token_hash) {
            return Err(StorageError::conflict("refresh token hash already exists"));
        }
        tables.codes.remove(&params.code_hash);

        let token = RefreshToken {
            id: Uuid::new_v4(),
            token_hash: params.refresh_token_hash,
            client_id: params.client_id,
            user_id: params.user_id,
            scopes: params.scopes,
            auth_request_id: params.auth_request_id,
            created_at: OffsetDateTime::now_utc(),
            expires_at: params.expires_at,
        };
        tables
            .refresh_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(Some(token))
    }

    async fn get_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> StorageResult<Option<RefreshToken>> {
        Ok(self
            .tables
            .read()
            .await
            .refresh_tokens
            .get(token_hash)
            .cloned())
    }

    async fn delete_refresh_token(&self, token_hash: &str, client_id: &str) -> StorageResult<u64> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .refresh_tokens
            .get(token_hash)
            .is_some_and(|t| t.client_id == client_id);
        if owned {
            tables.refresh_tokens.remove(token_hash);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn rotate_refresh_token(
        &self,
        params: RotateRefreshToken,
    ) -> StorageResult<Option<RefreshToken>> {
        let mut tables = self.tables.write().await;

        let Some(mut token) = tables.refresh_tokens.remove(&params.old_token_hash) else {
            return Ok(None);
        };
        token.token_hash = params.new_token_hash;
        token.expires_at = params.expires_at;
        tables
            .refresh_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(Some(token))
    }

    async fn delete_refresh_tokens_by_user(&self, user_id: Uuid) -> StorageResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.refresh_tokens.len();
        tables.refresh_tokens.retain(|_, t| t.user_id != user_id);
        Ok((before - tables.refresh_tokens.len()) as u64)
    }

    async fn delete_expired_auth_requests(&self) -> StorageResult<u64> {
        let now = OffsetDateTime::now_utc();
        let mut tables = self.tables.write().await;
        let before = tables.auth_requests.len();
        tables.auth_requests.retain(|_, r| r.expires_at > now);
        Ok((before - tables.auth_requests.len()) as u64)
    }

    async fn delete_expired_authorization_codes(&self) -> StorageResult<u64> {
        let now = OffsetDateTime::now_utc();
        let mut tables = self.tables.write().await;
        let before = tables.codes.len();
        tables.codes.retain(|_, c| c.expires_at > now);
        Ok((before - tables.codes.len()) as u64)
    }

    async fn delete_expired_refresh_tokens(&self) -> StorageResult<u64> {
        let now = OffsetDateTime::now_utc();
        let mut tables = self.tables.write().await;
        let before = tables.refresh_tokens.len();
        tables.refresh_tokens.retain(|_, t| t.expires_at > now);
        Ok((before - tables.refresh_tokens.len()) as u64)
    }

    async fn upsert_cimd_client(&self, params: UpsertCimdClient) -> StorageResult<Client> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables.clients.get_mut(&params.client_id) {
            if existing.client_type != ClientType::Cimd {
                return Err(StorageError::conflict(format!(
                    "client '{}' is statically registered",
                    params.client_id
                )));
            }
            existing.redirect_uris = params.redirect_uris;
            existing.scopes = params.scopes;
            existing.metadata_fetched_at = Some(params.fetched_at);
            return Ok(existing.clone());
        }

        let client = Client {
            client_id: params.client_id,
            client_secret_hash: None,
            redirect_uris: params.redirect_uris,
            scopes: params.scopes,
            client_type: ClientType::Cimd,
            metadata_fetched_at: Some(params.fetched_at),
        };
        tables
            .clients
            .insert(client.client_id.clone(), client.clone());
        Ok(client)
    }

    async fn get_user(&self, user_id: Uuid) -> StorageResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn get_user_roles(&self, user_id: Uuid) -> StorageResult<Vec<String>> {
        Ok(self
            .tables
            .read()
            .await
            .roles
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}
