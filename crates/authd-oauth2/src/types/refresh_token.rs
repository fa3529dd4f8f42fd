//! Refresh token record.
//!
//! The token value itself is never stored, only its SHA-256 hash. The
//! record is rotated in place: each use replaces `token_hash` and pushes
//! `expires_at` forward.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Refresh token stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    /// Record identifier.
    pub id: Uuid,

    /// SHA-256 hash (hex) of the current token value.
    pub token_hash: String,

    /// Client the token was issued to.
    pub client_id: String,

    /// User who authorized the token.
    pub user_id: Uuid,

    /// Granted scopes.
    pub scopes: Vec<String>,

    /// Authorization request the token originated from.
    pub auth_request_id: Uuid,

    /// When the token was first issued.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the current token value expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl RefreshToken {
    /// Returns `true` if this token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Returns `true` if the token is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Space-joined scopes, as used on the wire.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}
