//! Storage abstraction for clients, authorization requests, codes,
//! refresh tokens and users.
//!
//! The provider talks to persistence only through [`DBClient`]. Lookups
//! return `Ok(None)` when nothing matches so that "not found" is never
//! confused with a backend failure. The compound operations
//! ([`DBClient::complete_login_and_insert_code`],
//! [`DBClient::consume_code_and_insert_refresh_token`] and
//! [`DBClient::rotate_refresh_token`]) must be atomic: when two callers race
//! on the same record exactly one of them sees `Some`.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::{AuthRequest, Client, RefreshToken, User};

/// Storage backend failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// The backend failed (connection, query, serialization).
    #[error("Storage backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// The write conflicts with an existing record.
    #[error("Storage conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `Backend` error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Operation Parameters
// =============================================================================

/// New authorization request.
#[derive(Debug, Clone)]
pub struct NewAuthRequest {
    /// Requesting client.
    pub client_id: String,
    /// Redirect URI (may be empty).
    pub redirect_uri: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Client state.
    pub state: Option<String>,
    /// OIDC nonce.
    pub nonce: Option<String>,
    /// PKCE challenge.
    pub code_challenge: Option<String>,
    /// PKCE challenge method.
    pub code_challenge_method: Option<String>,
    /// Raw `resource` parameter.
    pub resource: Option<String>,
    /// Expiry of the request.
    pub expires_at: OffsetDateTime,
}

/// Completion of an authorization request by the login flow.
#[derive(Debug, Clone)]
pub struct CompleteLogin {
    /// The request being completed.
    pub auth_request_id: Uuid,
    /// The authenticated user.
    pub user_id: Uuid,
    /// When the user authenticated.
    pub auth_time: OffsetDateTime,
    /// Hash of the authorization code.
    pub code_hash: String,
    /// Expiry of the authorization code.
    pub code_expires_at: OffsetDateTime,
}

/// Exchange of an authorization code for a refresh token record.
#[derive(Debug, Clone)]
pub struct ConsumeCode {
    /// Hash of the code being consumed.
    pub code_hash: String,
    /// Hash of the new refresh token.
    pub refresh_token_hash: String,
    /// Client the tokens are issued to.
    pub client_id: String,
    /// Authorizing user.
    pub user_id: Uuid,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Originating authorization request.
    pub auth_request_id: Uuid,
    /// Expiry of the refresh token.
    pub expires_at: OffsetDateTime,
}

/// In-place rotation of a refresh token.
#[derive(Debug, Clone)]
pub struct RotateRefreshToken {
    /// Hash of the token being presented.
    pub old_token_hash: String,
    /// Hash of the replacement token.
    pub new_token_hash: String,
    /// New expiry.
    pub expires_at: OffsetDateTime,
}

/// Insert-or-refresh of a metadata-document client.
#[derive(Debug, Clone)]
pub struct UpsertCimdClient {
    /// Client identifier (the document URL).
    pub client_id: String,
    /// Redirect URIs from the document.
    pub redirect_uris: Vec<String>,
    /// Scopes from the document, or the defaults.
    pub scopes: Vec<String>,
    /// Fetch time.
    pub fetched_at: OffsetDateTime,
}

// =============================================================================
// DBClient Trait
// =============================================================================

/// Persistence operations required by the authorization server.
///
/// Implementations must be thread-safe (`Send + Sync`) as they will be
/// shared across async tasks.
#[async_trait]
pub trait DBClient: Send + Sync {
    /// Find a client by its identifier.
    ///
    /// # Returns
    ///
    /// `Ok(None)` if no client is registered under `client_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_client(&self, client_id: &str) -> StorageResult<Option<Client>>;

    /// Insert a new authorization request.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn insert_auth_request(&self, request: NewAuthRequest) -> StorageResult<AuthRequest>;

    /// Find an authorization request by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_auth_request(&self, id: Uuid) -> StorageResult<Option<AuthRequest>>;

    /// Atomically mark an authorization request done, bind the user and
    /// insert the authorization code.
    ///
    /// # Returns
    ///
    /// The completed request, or `Ok(None)` if the request does not exist
    /// or was already completed. The guard on `done` must be evaluated in
    /// the same atomic step as the update, e.g.
    ///
    /// ```sql
    /// UPDATE auth_requests SET done = true, user_id = $2, auth_time = $3
    /// WHERE id = $1 AND done = false RETURNING *
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn complete_login_and_insert_code(
        &self,
        params: CompleteLogin,
    ) -> StorageResult<Option<AuthRequest>>;

    /// Find the authorization request bound to an unexpired code.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_auth_request_by_code_hash(
        &self,
        code_hash: &str,
    ) -> StorageResult<Option<AuthRequest>>;

    /// Delete an authorization code. Deleting a missing code is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_authorization_code(&self, code_hash: &str) -> StorageResult<()>;

    /// Atomically delete the authorization code and insert a refresh token.
    ///
    /// # Returns
    ///
    /// The new refresh token record, or `Ok(None)` if the code no longer
    /// exists (already consumed). Exactly one of any number of concurrent
    /// callers for the same code gets `Some`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn consume_code_and_insert_refresh_token(
        &self,
        params: ConsumeCode,
    ) -> StorageResult<Option<RefreshToken>>;

    /// Find a refresh token by hash, expired or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> StorageResult<Option<RefreshToken>>;

    /// Delete a refresh token if it belongs to `client_id`.
    ///
    /// # Returns
    ///
    /// The number of records deleted (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_refresh_token(&self, token_hash: &str, client_id: &str) -> StorageResult<u64>;

    /// Atomically replace the hash and expiry of a refresh token.
    ///
    /// # Returns
    ///
    /// The rotated record, or `Ok(None)` if no record currently has
    /// `old_token_hash`. Exactly one of any number of concurrent callers
    /// presenting the same token gets `Some`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn rotate_refresh_token(
        &self,
        params: RotateRefreshToken,
    ) -> StorageResult<Option<RefreshToken>>;

    /// Delete every refresh token of a user.
    ///
    /// # Returns
    ///
    /// The number of records deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_refresh_tokens_by_user(&self, user_id: Uuid) -> StorageResult<u64>;

    /// Delete expired authorization requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_expired_auth_requests(&self) -> StorageResult<u64>;

    /// Delete expired authorization codes.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_expired_authorization_codes(&self) -> StorageResult<u64>;

    /// Delete expired refresh tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_expired_refresh_tokens(&self) -> StorageResult<u64>;

    /// Insert a metadata-document client or refresh an existing one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a static client already uses the
    /// identifier, or an error if the storage operation fails.
    async fn upsert_cimd_client(&self, params: UpsertCimdClient) -> StorageResult<Client>;

    /// Find a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_user(&self, user_id: Uuid) -> StorageResult<Option<User>>;

    /// List the roles granted to a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_user_roles(&self, user_id: Uuid) -> StorageResult<Vec<String>>;
}
