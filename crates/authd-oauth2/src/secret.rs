//! Client secret hashing and verification.
//!
//! The provider compares secrets through an injected [`VerifySecretFn`].
//! [`argon2_verifier`] is the shipped implementation: Argon2id PHC strings
//! as produced by [`hash_client_secret`].
//!
//! # Example
//!
//! ```
//! use authd_oauth2::secret::{hash_client_secret, verify_client_secret};
//!
//! let hash = hash_client_secret("s3cret").unwrap();
//! assert!(verify_client_secret("s3cret", &hash));
//! assert!(!verify_client_secret("wrong", &hash));
//! ```

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Compares a plaintext secret (first argument) against a stored hash
/// (second argument).
pub type VerifySecretFn = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Hash a client secret for storage using Argon2id with a random salt.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails (rare).
pub fn hash_client_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a client secret against a stored Argon2 hash.
///
/// A malformed stored hash never verifies.
#[must_use]
pub fn verify_client_secret(secret: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        tracing::warn!("stored client secret hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok()
}

/// [`verify_client_secret`] as an injectable capability.
#[must_use]
pub fn argon2_verifier() -> VerifySecretFn {
    Arc::new(verify_client_secret)
}
