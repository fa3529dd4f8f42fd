//! Client ID Metadata Documents.
//!
//! A client may use an HTTPS URL as its `client_id`. The URL points at a
//! JSON document describing the client, which is fetched, validated and
//! cached as a public client registration.
//!
//! # Validation
//!
//! The URL itself must be HTTPS (unless insecure transport is enabled),
//! carry a non-root path, and have no fragment, credentials or dot
//! segments. Its host must not resolve to a private address.
//!
//! The document must:
//! - repeat the URL exactly in `client_id`
//! - carry no `client_secret` or `client_secret_expires_at`
//! - list at least one redirect URI, all on the URL's origin

use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use url::{Host, Url};

use super::ssrf::{is_blocked_host, is_blocked_ip};
use crate::config::CimdConfig;
use crate::error::OAuthError;
use crate::types::scope;

/// Client metadata document as published by the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientMetadataDocument {
    /// Must equal the URL the document was fetched from.
    pub client_id: String,

    /// Redirect URIs.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Requested scopes, space separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    /// Forbidden: a public document cannot carry a secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<serde_json::Value>,

    /// Forbidden together with `client_secret`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_expires_at: Option<serde_json::Value>,
}

/// Returns `true` if `client_id` looks like a metadata document URL:
/// HTTPS (or HTTP when insecure transport is allowed), a host, and a path
/// other than `/`.
#[must_use]
pub fn is_cimd_client_id(client_id: &str, allow_insecure: bool) -> bool {
    let Ok(url) = Url::parse(client_id) else {
        return false;
    };
    let scheme_ok = url.scheme() == "https" || (allow_insecure && url.scheme() == "http");
    let host_ok = url.host_str().is_some_and(|h| !h.is_empty());
    scheme_ok && host_ok && !url.path().is_empty() && url.path() != "/"
}

fn invalid_url(description: &str) -> OAuthError {
    OAuthError::invalid_client(description)
}

/// Validates a metadata document URL.
///
/// # Errors
///
/// Returns `invalid_client` describing the first violated rule.
pub async fn validate_cimd_url(client_id: &str, allow_insecure: bool) -> Result<Url, OAuthError> {
    let url = Url::parse(client_id).map_err(|_| invalid_url("Invalid client_id URL"))?;

    if url.scheme() != "https" && !(allow_insecure && url.scheme() == "http") {
        return Err(invalid_url(
            "Client ID metadata document URL must use HTTPS",
        ));
    }

    if url.path().is_empty() || url.path() == "/" {
        return Err(invalid_url("Client ID metadata document URL must have a path"));
    }

    if url.fragment().is_some() {
        return Err(invalid_url(
            "Client ID metadata document URL must not have a fragment",
        ));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(invalid_url(
            "Client ID metadata document URL must not have credentials",
        ));
    }

    // the parsed path is already normalised, so inspect the raw input
    if has_dot_segments(raw_path(client_id)) {
        return Err(invalid_url(
            "Client ID metadata document URL must not contain dot segments",
        ));
    }

    if !allow_insecure
        && let Some(host) = url.host()
        && host_is_private(&host).await
    {
        return Err(invalid_url(
            "Client ID metadata document URL must not point to a private address",
        ));
    }

    Ok(url)
}

/// Path portion of a raw `scheme://authority/path?query#fragment` string.
fn raw_path(input: &str) -> &str {
    let after_scheme = input.split_once("://").map_or(input, |(_, rest)| rest);
    let Some(start) = after_scheme.find('/') else {
        return "";
    };
    let path = &after_scheme[start..];
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

fn has_dot_segments(path: &str) -> bool {
    let path = path.replace("%2e", ".").replace("%2E", ".");
    path.contains("/./")
        || path.contains("/../")
        || path.ends_with("/.")
        || path.ends_with("/..")
}

/// An IP literal is checked directly; a name is resolved and every result
/// checked. A name that does not resolve is not considered private; the
/// fetch will fail on its own.
async fn host_is_private(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(name) => match tokio::net::lookup_host((*name, 443)).await {
            Ok(addrs) => addrs.into_iter().any(|addr| is_blocked_ip(addr.ip())),
            Err(_) => false,
        },
        literal => is_blocked_host(literal),
    }
}

/// Fetches and parses a metadata document.
///
/// # Errors
///
/// - `invalid_client` for transport failures, non-200 responses, oversized
///   or malformed bodies
/// - `server_error` if the request cannot be built
pub async fn fetch_client_metadata(
    http_client: &reqwest::Client,
    url: &Url,
    config: &CimdConfig,
) -> Result<ClientMetadataDocument, OAuthError> {
    let response = match http_client
        .get(url.clone())
        .header(ACCEPT, "application/json")
        .timeout(config.fetch_timeout)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) if e.is_builder() => {
            tracing::error!(url = %url, error = %e, "failed to build metadata request");
            return Err(OAuthError::internal());
        }
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "failed to fetch client metadata document");
            return Err(OAuthError::invalid_client(
                "Failed to fetch client metadata document",
            ));
        }
    };

    if response.status() != reqwest::StatusCode::OK {
        tracing::warn!(url = %url, status = %response.status(), "metadata document fetch returned non-200");
        return Err(OAuthError::invalid_client(
            "Client metadata document returned non-200 status",
        ));
    }

    let body = read_limited_body(response, config.max_document_size).await?;

    serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(url = %url, error = %e, "metadata document is not valid JSON");
        OAuthError::invalid_client("Invalid client metadata document JSON")
    })
}

/// Reads at most `max + 1` bytes, failing if the body is larger than `max`.
async fn read_limited_body(
    mut response: reqwest::Response,
    max: usize,
) -> Result<Vec<u8>, OAuthError> {
    let too_large = || OAuthError::invalid_client("Client metadata document exceeds maximum size");

    if response.content_length().is_some_and(|len| len > max as u64) {
        return Err(too_large());
    }

    let mut body = Vec::with_capacity(max.min(8 * 1024));
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let room = max + 1 - body.len();
                body.extend_from_slice(&chunk[..chunk.len().min(room)]);
                if body.len() > max {
                    return Err(too_large());
                }
            }
            Ok(None) => return Ok(body),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read client metadata document");
                return Err(OAuthError::invalid_client(
                    "Failed to read client metadata document",
                ));
            }
        }
    }
}

/// Validates a parsed document against the URL it was fetched from.
///
/// # Errors
///
/// Returns `invalid_client` describing the first violated rule.
pub fn validate_client_metadata(
    document: &ClientMetadataDocument,
    client_id: &str,
    url: &Url,
) -> Result<(), OAuthError> {
    if document.client_id != client_id {
        return Err(OAuthError::invalid_client(
            "Client ID in metadata does not match the URL",
        ));
    }

    if document.client_secret.is_some() || document.client_secret_expires_at.is_some() {
        return Err(OAuthError::invalid_client(
            "Client metadata document must not contain client_secret fields",
        ));
    }

    if document.redirect_uris.is_empty() {
        return Err(OAuthError::invalid_client(
            "Client metadata document must contain at least one redirect_uri",
        ));
    }

    let origin = url.origin();
    for redirect_uri in &document.redirect_uris {
        let same_origin = Url::parse(redirect_uri).is_ok_and(|r| r.origin() == origin);
        if !same_origin {
            return Err(OAuthError::invalid_client(
                "redirect_uri must be on the same origin as the client_id",
            ));
        }
    }

    Ok(())
}

/// Scopes granted to a document: its `scope` field when present and
/// non-empty, otherwise the default set.
///
/// # Errors
///
/// Returns `invalid_scope` if the document lists an unsupported scope.
pub fn resolve_document_scopes(document: &ClientMetadataDocument) -> Result<Vec<String>, OAuthError> {
    let Some(declared) = document.scope.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(scope::default_scopes());
    };
    let scopes: Vec<String> = declared.split(' ').map(str::to_string).collect();
    scope::validate_scopes(&scopes).map_err(OAuthError::invalid_scope)?;
    Ok(scopes)
}
