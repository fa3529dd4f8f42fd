//! Supported scope vocabulary.

/// OpenID Connect authentication.
pub const OPENID: &str = "openid";
/// Profile claims (`name`, `picture`, `locale`).
pub const PROFILE: &str = "profile";
/// Email claims.
pub const EMAIL: &str = "email";
/// Phone claims.
pub const PHONE: &str = "phone";
/// Refresh token issuance.
pub const OFFLINE_ACCESS: &str = "offline_access";
/// GraphQL authorization claims in the access token.
pub const GRAPHQL: &str = "graphql";

/// Every scope the server understands.
pub const SUPPORTED_SCOPES: &[&str] = &[OPENID, PROFILE, EMAIL, PHONE, OFFLINE_ACCESS, GRAPHQL];

/// Scopes granted to a metadata-document client that declares none.
pub const DEFAULT_SCOPES: &[&str] = &[OPENID, PROFILE, EMAIL, PHONE, OFFLINE_ACCESS];

/// Returns `true` if the scope is part of the supported vocabulary.
#[must_use]
pub fn is_supported(scope: &str) -> bool {
    SUPPORTED_SCOPES.contains(&scope)
}

/// Owned copy of [`DEFAULT_SCOPES`].
#[must_use]
pub fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect()
}

/// Checks every scope against the vocabulary.
///
/// # Errors
///
/// Returns a description naming the first unsupported scope.
pub fn validate_scopes<S: AsRef<str>>(scopes: &[S]) -> Result<(), String> {
    match scopes.iter().find(|s| !is_supported(s.as_ref())) {
        Some(bad) => Err(format!("Scope \"{}\" is not supported", bad.as_ref())),
        None => Ok(()),
    }
}
