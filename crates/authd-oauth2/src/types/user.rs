//! User profile as seen by the token issuer and userinfo.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier, the `sub` of every token.
    pub id: Uuid,

    /// Display name, exposed as `name`.
    pub display_name: String,

    /// Avatar URL, exposed as `picture`.
    pub avatar_url: String,

    /// Preferred locale.
    pub locale: String,

    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the email address has been verified.
    pub email_verified: bool,

    /// Phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    /// Whether the phone number has been verified.
    pub phone_number_verified: bool,

    /// Role used when a request does not ask for one.
    pub default_role: String,

    /// Anonymous (guest) account.
    pub is_anonymous: bool,
}

impl User {
    /// Email, when present and non-empty.
    #[must_use]
    pub fn valid_email(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.is_empty())
    }

    /// Phone number, when present and non-empty.
    #[must_use]
    pub fn valid_phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref().filter(|p| !p.is_empty())
    }
}
