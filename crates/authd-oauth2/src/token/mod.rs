//! Token minting, validation and hashing.
//!
//! - [`Signer`] - the injected signing capability
//! - [`JwtSigner`] - HMAC implementation on top of `jsonwebtoken`
//! - [`TokenClaims`] - typed claim builder for access and ID tokens
//! - [`hash_token`] / [`generate_token`] - opaque credential helpers

pub mod claims;
pub mod jwt;
pub mod signer;

pub use claims::{TokenClaims, at_hash};
pub use jwt::JwtSigner;
pub use signer::{Audience, Signer, SignerError, ValidatedClaims};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Hash an opaque credential (authorization code or refresh token) for
/// storage. Returns the lowercase hex SHA-256 digest.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a cryptographically secure random credential.
///
/// Returns a 256-bit random value encoded as base64url (43 characters).
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
