//! End-to-end flows through the public provider API.
//!
//! Each test builds a provider over a fresh [`MemoryStore`], drives the
//! authorize, login and token steps the way an HTTP layer would, and checks
//! the results a client observes.

use std::sync::Arc;

use authd_oauth2::oauth::{build_insecure_http_client, s256_challenge};
use authd_oauth2::prelude::*;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VERIFIER: &str = "dBjftJeZ4CVP-mJ92K9rsmdBqq8sSkBbtwPEOKPrRVVf7GtV2tZVH0DvoMnA";
const REDIRECT_URI: &str = "https://app.example.com/callback";
const WEB_ID: &str = "web-app";
const WEB_SECRET: &str = "correct horse battery staple";
const SPA_ID: &str = "spa";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("authd_oauth2=debug")
        .try_init();
}

fn config() -> OAuth2Config {
    OAuth2Config {
        enabled: true,
        server_url: "https://auth.example.com".to_string(),
        signing: SigningConfig {
            issuer: "https://auth.example.com".to_string(),
            algorithm: "HS256".to_string(),
            secret: "an-hmac-secret-of-at-least-32-bytes".to_string(),
            ..SigningConfig::default()
        },
        ..OAuth2Config::default()
    }
}

fn build_provider(config: OAuth2Config, store: &MemoryStore) -> OAuth2Provider {
    let signer = JwtSigner::from_config(&config.signing).expect("signer");
    let http_client = build_insecure_http_client(&config.cimd).expect("http client");
    OAuth2Provider::new(
        config,
        Arc::new(store.clone()),
        Arc::new(signer),
        argon2_verifier(),
        http_client,
    )
}

/// Store with one confidential and one public client and a single user.
async fn seeded() -> (MemoryStore, User) {
    let store = MemoryStore::new();
    store
        .insert_client(Client {
            client_id: WEB_ID.to_string(),
            client_secret_hash: Some(hash_client_secret(WEB_SECRET).expect("hash")),
            redirect_uris: vec![REDIRECT_URI.to_string()],
            scopes: scope::default_scopes(),
            client_type: ClientType::Static,
            metadata_fetched_at: None,
        })
        .await;
    store
        .insert_client(Client {
            client_id: SPA_ID.to_string(),
            client_secret_hash: None,
            redirect_uris: vec![REDIRECT_URI.to_string()],
            scopes: vec!["openid".to_string(), "profile".to_string()],
            client_type: ClientType::Static,
            metadata_fetched_at: None,
        })
        .await;

    let user = User {
        id: Uuid::new_v4(),
        display_name: "Alex Example".to_string(),
        avatar_url: String::new(),
        locale: "en".to_string(),
        email: Some("alex@example.com".to_string()),
        email_verified: true,
        phone_number: None,
        phone_number_verified: false,
        default_role: "user".to_string(),
        is_anonymous: false,
    };
    store.insert_user(user.clone()).await;
    (store, user)
}

fn param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .expect("valid url")
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn authorize(client_id: &str, scope: &str) -> AuthorizeRequest {
    AuthorizeRequest {
        client_id: client_id.to_string(),
        redirect_uri: REDIRECT_URI.to_string(),
        response_type: "code".to_string(),
        scope: Some(scope.to_string()),
        code_challenge: Some(s256_challenge(VERIFIER)),
        code_challenge_method: Some("S256".to_string()),
        ..AuthorizeRequest::default()
    }
}

/// Authorize plus login; returns the final client redirect.
async fn login(provider: &OAuth2Provider, request: &AuthorizeRequest, user_id: Uuid) -> String {
    let login_url = provider
        .validate_authorize_request(request)
        .await
        .expect("authorize");
    let request_id = Uuid::parse_str(&param(&login_url, "request_id").expect("request_id"))
        .expect("uuid");
    provider
        .complete_login(request_id, user_id)
        .await
        .expect("complete login")
        .redirect_uri
}

fn exchange(code: &str, client_id: &str, client_secret: Option<&str>) -> TokenRequest {
    TokenRequest {
        grant_type: Some("authorization_code".to_string()),
        code: Some(code.to_string()),
        redirect_uri: Some(REDIRECT_URI.to_string()),
        code_verifier: Some(VERIFIER.to_string()),
        client_id: Some(client_id.to_string()),
        client_secret: client_secret.map(str::to_string),
        ..TokenRequest::default()
    }
}

#[tokio::test]
async fn confidential_client_code_flow() {
    init_tracing();
    let (store, user) = seeded().await;
    let provider = build_provider(config(), &store);

    let redirect = login(&provider, &authorize(WEB_ID, "openid email"), user.id).await;
    assert!(redirect.starts_with(REDIRECT_URI));
    assert_eq!(param(&redirect, "iss").as_deref(), Some("https://auth.example.com"));
    assert!(param(&redirect, "state").is_none());
    let code = param(&redirect, "code").expect("code");

    let tokens = provider
        .token(&exchange(&code, WEB_ID, Some(WEB_SECRET)))
        .await
        .expect("token");
    assert_eq!(tokens.token_type, "Bearer");
    assert_eq!(tokens.scope, "openid email");
    assert!(!tokens.access_token.is_empty());
    assert!(!tokens.refresh_token.is_empty());
    assert!(tokens.id_token.as_deref().is_some_and(|t| !t.is_empty()));

    let info = provider
        .userinfo_from_access_token(&tokens.access_token)
        .await
        .expect("userinfo");
    assert_eq!(info.sub, user.id.to_string());
    assert_eq!(info.email.as_deref(), Some("alex@example.com"));
    assert!(info.name.is_none());
}

#[tokio::test]
async fn state_is_echoed_on_success_and_error() {
    let (store, user) = seeded().await;
    let provider = build_provider(config(), &store);

    let mut request = authorize(WEB_ID, "openid");
    request.state = Some("xyz 123".to_string());
    let redirect = login(&provider, &request, user.id).await;
    assert_eq!(param(&redirect, "state").as_deref(), Some("xyz 123"));

    request.scope = Some("openid graphql".to_string());
    let rejection = provider
        .validate_authorize_request(&request)
        .await
        .unwrap_err();
    let url = rejection.redirect_url.expect("error redirect");
    assert_eq!(param(&url, "error").as_deref(), Some("invalid_scope"));
    assert_eq!(param(&url, "state").as_deref(), Some("xyz 123"));
}

#[tokio::test]
async fn public_client_without_pkce_is_redirected_with_error() {
    let (store, _) = seeded().await;
    let provider = build_provider(config(), &store);

    let mut request = authorize(SPA_ID, "openid");
    request.code_challenge = None;
    request.code_challenge_method = None;

    let rejection = provider
        .validate_authorize_request(&request)
        .await
        .unwrap_err();
    assert_eq!(
        rejection.error,
        OAuthError::invalid_request("PKCE code_challenge is required for public clients")
    );
    let url = rejection.redirect_url.expect("error redirect");
    assert!(url.starts_with(REDIRECT_URI));
    assert_eq!(param(&url, "error").as_deref(), Some("invalid_request"));
    assert_eq!(
        param(&url, "error_description").as_deref(),
        Some("PKCE code_challenge is required for public clients")
    );
}

#[tokio::test]
async fn unregistered_redirect_is_never_followed() {
    let (store, _) = seeded().await;
    let provider = build_provider(config(), &store);

    let mut request = authorize(WEB_ID, "openid");
    request.redirect_uri = "https://attacker.example.com/callback".to_string();
    let rejection = provider
        .validate_authorize_request(&request)
        .await
        .unwrap_err();
    assert!(rejection.redirect_url.is_none());
    assert_eq!(rejection.error.oauth_error_code(), "invalid_request");
}

#[tokio::test]
async fn rotated_refresh_token_cannot_be_replayed() {
    let (store, user) = seeded().await;
    let provider = build_provider(config(), &store);

    let redirect = login(&provider, &authorize(SPA_ID, "openid profile"), user.id).await;
    let code = param(&redirect, "code").expect("code");
    let first = provider
        .token(&exchange(&code, SPA_ID, None))
        .await
        .expect("token");

    let refresh = |token: &str| TokenRequest {
        grant_type: Some("refresh_token".to_string()),
        refresh_token: Some(token.to_string()),
        client_id: Some(SPA_ID.to_string()),
        ..TokenRequest::default()
    };

    let second = provider
        .token(&refresh(&first.refresh_token))
        .await
        .expect("refresh");
    assert_ne!(second.refresh_token, first.refresh_token);
    assert_eq!(second.scope, "openid profile");

    let err = provider
        .token(&refresh(&first.refresh_token))
        .await
        .unwrap_err();
    assert_eq!(err, OAuthError::invalid_grant("Invalid refresh token"));
    assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

    // the rotated token still works
    provider
        .token(&refresh(&second.refresh_token))
        .await
        .expect("refresh with rotated token");
    assert_eq!(store.refresh_token_count().await, 1);
}

#[tokio::test]
async fn introspection_hides_tokens_of_other_clients() {
    let (store, user) = seeded().await;
    let provider = build_provider(config(), &store);

    let redirect = login(&provider, &authorize(WEB_ID, "openid"), user.id).await;
    let code = param(&redirect, "code").expect("code");
    let tokens = provider
        .token(&exchange(&code, WEB_ID, Some(WEB_SECRET)))
        .await
        .expect("token");

    let own = provider
        .introspect(&IntrospectRequest {
            token: tokens.access_token.clone(),
            token_type_hint: Some("access_token".to_string()),
            client_id: Some(WEB_ID.to_string()),
            client_secret: Some(WEB_SECRET.to_string()),
        })
        .await
        .expect("introspect");
    assert!(own.active);

    let foreign = provider
        .introspect(&IntrospectRequest {
            token: tokens.access_token,
            token_type_hint: None,
            client_id: Some(SPA_ID.to_string()),
            client_secret: None,
        })
        .await
        .expect("introspect");
    assert_eq!(
        serde_json::to_value(&foreign).expect("json"),
        json!({ "active": false })
    );
}

#[tokio::test]
async fn revoked_refresh_token_is_inactive() {
    let (store, user) = seeded().await;
    let provider = build_provider(config(), &store);

    let redirect = login(&provider, &authorize(WEB_ID, "openid offline_access"), user.id).await;
    let code = param(&redirect, "code").expect("code");
    let tokens = provider
        .token(&exchange(&code, WEB_ID, Some(WEB_SECRET)))
        .await
        .expect("token");

    provider
        .revoke(&RevokeRequest {
            token: tokens.refresh_token.clone(),
            token_type_hint: Some("refresh_token".to_string()),
            client_id: Some(WEB_ID.to_string()),
            client_secret: Some(WEB_SECRET.to_string()),
        })
        .await
        .expect("revoke");

    let response = provider
        .introspect(&IntrospectRequest {
            token: tokens.refresh_token,
            token_type_hint: Some("refresh_token".to_string()),
            client_id: Some(WEB_ID.to_string()),
            client_secret: Some(WEB_SECRET.to_string()),
        })
        .await
        .expect("introspect");
    assert!(!response.active);
}

#[tokio::test]
async fn concurrent_code_exchange_succeeds_once() {
    let (store, user) = seeded().await;
    let provider = Arc::new(build_provider(config(), &store));

    let redirect = login(&provider, &authorize(SPA_ID, "openid"), user.id).await;
    let code = param(&redirect, "code").expect("code");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let provider = provider.clone();
            let request = exchange(&code, SPA_ID, None);
            tokio::spawn(async move { provider.token(&request).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => successes += 1,
            Err(e) => assert_eq!(e, OAuthError::invalid_grant("Invalid authorization code")),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(store.refresh_token_count().await, 1);
    assert_eq!(store.authorization_code_count().await, 0);
}

#[tokio::test]
async fn metadata_document_client_flow() {
    init_tracing();
    let server = MockServer::start().await;
    let client_id = format!("{}/oauth/client.json", server.uri());
    let redirect_uri = format!("{}/callback", server.uri());
    Mock::given(method("GET"))
        .and(path("/oauth/client.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "client_id": client_id,
            "client_name": "Desktop App",
            "redirect_uris": [redirect_uri],
            "token_endpoint_auth_method": "none",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config();
    config.cimd.enabled = true;
    config.cimd.allow_insecure_transport = true;
    let (store, user) = seeded().await;
    let provider = build_provider(config, &store);
    assert_eq!(
        provider.discovery_document().client_id_metadata_document_supported,
        Some(true)
    );

    let request = AuthorizeRequest {
        client_id: client_id.clone(),
        redirect_uri: redirect_uri.clone(),
        response_type: "code".to_string(),
        scope: Some("openid email".to_string()),
        code_challenge: Some(s256_challenge(VERIFIER)),
        ..AuthorizeRequest::default()
    };
    let redirect = login(&provider, &request, user.id).await;
    assert!(redirect.starts_with(&redirect_uri));
    let code = param(&redirect, "code").expect("code");

    let tokens = provider
        .token(&TokenRequest {
            grant_type: Some("authorization_code".to_string()),
            code: Some(code),
            redirect_uri: Some(redirect_uri),
            code_verifier: Some(VERIFIER.to_string()),
            client_id: Some(client_id),
            ..TokenRequest::default()
        })
        .await
        .expect("token");
    assert!(tokens.id_token.is_some());
}

#[test]
fn error_responses_map_to_http_statuses() {
    let cases = [
        (OAuthError::invalid_request("x"), StatusCode::BAD_REQUEST),
        (OAuthError::invalid_client("x"), StatusCode::UNAUTHORIZED),
        (OAuthError::invalid_grant("x"), StatusCode::BAD_REQUEST),
        (OAuthError::invalid_token("x"), StatusCode::UNAUTHORIZED),
        (OAuthError::internal(), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (error, status) in cases {
        assert_eq!(error.into_response().status(), status);
    }
}
