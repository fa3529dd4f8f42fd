//! OAuth 2.0 / OpenID Connect protocol operations.
//!
//! Every operation is a method on [`OAuth2Provider`](crate::OAuth2Provider);
//! the submodules group them by endpoint.
//!
//! # Authorization Code Flow
//!
//! - [`authorize`] - authorization request validation
//! - [`login`] - login completion and code issuance
//! - [`token`] - code and refresh token grants
//! - [`pkce`] - S256 verification
//! - [`client_auth`] - client credential checks
//!
//! # Clients
//!
//! - [`resolver`] - static lookup or metadata document resolution
//! - [`cimd`] - Client ID Metadata Document validation and fetching
//! - [`ssrf`] - outbound HTTP client for metadata documents
//!
//! # Token State
//!
//! - [`introspect`] - RFC 7662 introspection
//! - [`revoke`] - RFC 7009 revocation
//! - [`userinfo`] - OIDC userinfo
//! - [`discovery`] - provider metadata and JWKS

pub mod authorize;
pub mod cimd;
pub mod client_auth;
pub mod discovery;
pub mod introspect;
pub mod login;
pub mod pkce;
pub mod resolver;
pub mod revoke;
pub mod ssrf;
pub mod token;
pub mod userinfo;

pub use authorize::AuthorizeRequest;
pub use cimd::ClientMetadataDocument;
pub use client_auth::authenticate_client;
pub use discovery::DiscoveryDocument;
pub use introspect::{IntrospectRequest, IntrospectResponse};
pub use login::{LoginCompleteResponse, LoginResponse};
pub use pkce::{generate_code_verifier, s256_challenge, verify_pkce};
pub use revoke::RevokeRequest;
pub use ssrf::{build_http_client, build_insecure_http_client, build_safe_http_client};
pub use token::{TokenRequest, TokenResponse, ValidatedCodeExchange, ValidatedRefreshGrant};
pub use userinfo::UserinfoResponse;
