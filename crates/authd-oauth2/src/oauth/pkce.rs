//! PKCE (Proof Key for Code Exchange) verification.
//!
//! Only the S256 method is accepted. A stored challenge without a method is
//! treated as S256; any explicit method other than `S256` is rejected.
//!
//! # Example
//!
//! ```
//! use authd_oauth2::oauth::pkce::{generate_code_verifier, s256_challenge};
//!
//! let verifier = generate_code_verifier();
//! let challenge = s256_challenge(&verifier);
//! assert_eq!(challenge.len(), 43);
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::OAuthError;
use crate::types::AuthRequest;

/// The only supported challenge method.
pub const S256: &str = "S256";

/// Generates a random 43-character code verifier.
#[must_use]
pub fn generate_code_verifier() -> String {
    crate::token::generate_token()
}

/// Derives the S256 challenge of a verifier:
/// `BASE64URL(SHA256(ASCII(verifier)))` without padding.
#[must_use]
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Checks a token request's `code_verifier` against the challenge stored
/// with the authorization request.
///
/// An empty challenge or verifier counts as absent.
///
/// # Errors
///
/// - `invalid_request` if there is no challenge and the client is public
/// - `invalid_grant` if a challenge exists and the verifier is missing
/// - `invalid_request` if the stored method is set to anything but `S256`
/// - `invalid_grant` if the verifier does not match
pub fn verify_pkce(
    auth_request: &AuthRequest,
    code_verifier: Option<&str>,
    is_public_client: bool,
) -> Result<(), OAuthError> {
    let Some(challenge) = auth_request
        .code_challenge
        .as_deref()
        .filter(|c| !c.is_empty())
    else {
        if is_public_client {
            return Err(OAuthError::invalid_request(
                "PKCE code_challenge is required for public clients",
            ));
        }
        return Ok(());
    };

    let Some(verifier) = code_verifier.filter(|v| !v.is_empty()) else {
        return Err(OAuthError::invalid_grant("Missing code_verifier"));
    };

    if let Some(method) = auth_request.code_challenge_method.as_deref()
        && !method.is_empty()
        && method != S256
    {
        return Err(OAuthError::invalid_request(
            "Unsupported code_challenge_method",
        ));
    }

    let computed = s256_challenge(verifier);
    if computed.as_bytes().ct_eq(challenge.as_bytes()).into() {
        Ok(())
    } else {
        Err(OAuthError::invalid_grant("Invalid code_verifier"))
    }
}
