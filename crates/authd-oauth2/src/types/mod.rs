//! Domain types shared by the protocol components.
//!
//! - [`Client`] - registered or dynamically resolved OAuth 2.0 client
//! - [`AuthRequest`] - a pending or completed authorization request
//! - [`RefreshToken`] - persisted refresh token record
//! - [`User`] - the resource owner as seen by the token issuer
//! - [`scope`] - the supported scope vocabulary

pub mod auth_request;
pub mod client;
pub mod refresh_token;
pub mod scope;
pub mod user;

pub use auth_request::AuthRequest;
pub use client::{Client, ClientType};
pub use refresh_token::RefreshToken;
pub use user::User;
