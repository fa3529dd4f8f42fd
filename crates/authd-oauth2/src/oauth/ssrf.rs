//! Outbound HTTP client for client metadata documents.
//!
//! Metadata documents are fetched from URLs chosen by unauthenticated
//! parties, so the safe client refuses to talk to anything that is not a
//! public address:
//!
//! - DNS is resolved by [`PublicOnlyResolver`], which fails the lookup if
//!   any resolved address is loopback, private, link-local or unspecified
//! - redirects are limited in number, must stay on HTTPS and must not point
//!   at a blocked IP literal
//! - every request carries a total timeout
//!
//! The insecure variant keeps only the redirect limit and exists for local
//! development and tests.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, LazyLock};

use ipnetwork::IpNetwork;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect::Policy;
use url::{Host, Url};

use crate::config::CimdConfig;

/// Address ranges a metadata fetch must never reach.
static BLOCKED_NETWORKS: LazyLock<Vec<IpNetwork>> = LazyLock::new(|| {
    [
        "0.0.0.0/8",      // unspecified
        "10.0.0.0/8",     // private
        "127.0.0.0/8",    // loopback
        "169.254.0.0/16", // link-local (cloud metadata lives here)
        "172.16.0.0/12",  // private
        "192.168.0.0/16", // private
        "224.0.0.0/24",   // link-local multicast
        "::/128",         // unspecified
        "::1/128",        // loopback
        "fc00::/7",       // unique local
        "fe80::/10",      // link-local
        "ff02::/16",      // link-local multicast
    ]
    .iter()
    .filter_map(|cidr| cidr.parse().ok())
    .collect()
});

/// Errors raised while vetting an outbound destination.
#[derive(Debug, thiserror::Error)]
pub enum SsrfError {
    /// The host resolved to a blocked address.
    #[error("host '{host}' resolves to blocked address {ip}")]
    BlockedAddress {
        /// Host being resolved.
        host: String,
        /// The offending address.
        ip: IpAddr,
    },

    /// The host did not resolve to anything.
    #[error("host '{host}' has no addresses")]
    NoAddresses {
        /// Host being resolved.
        host: String,
    },

    /// DNS resolution failed.
    #[error("failed to resolve '{host}': {source}")]
    Resolve {
        /// Host being resolved.
        host: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Returns `true` if the address is loopback, private, link-local or
/// unspecified. IPv4-mapped IPv6 addresses are checked as IPv4.
#[must_use]
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(IpAddr::V6(v6), IpAddr::V4),
        v4 => v4,
    };
    BLOCKED_NETWORKS.iter().any(|net| net.contains(ip))
}

/// Returns `true` if the URL host is an IP literal in a blocked range.
#[must_use]
pub fn is_blocked_host(host: &Host<&str>) -> bool {
    match host {
        Host::Ipv4(ip) => is_blocked_ip(IpAddr::V4(*ip)),
        Host::Ipv6(ip) => is_blocked_ip(IpAddr::V6(*ip)),
        Host::Domain(_) => false,
    }
}

/// Resolves `host` and returns its addresses, failing if any of them is
/// blocked.
///
/// # Errors
///
/// Returns an error if resolution fails, yields nothing, or yields a
/// blocked address.
pub async fn resolve_public_addrs(host: &str, port: u16) -> Result<Vec<SocketAddr>, SsrfError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| SsrfError::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(SsrfError::NoAddresses {
            host: host.to_string(),
        });
    }
    if let Some(blocked) = addrs.iter().find(|addr| is_blocked_ip(addr.ip())) {
        return Err(SsrfError::BlockedAddress {
            host: host.to_string(),
            ip: blocked.ip(),
        });
    }
    Ok(addrs)
}

/// DNS resolver that only hands public addresses to the connector.
///
/// Resolution and the address check happen in one step, so the address
/// that was checked is the address that gets dialed.
#[derive(Debug, Default, Clone, Copy)]
pub struct PublicOnlyResolver;

impl Resolve for PublicOnlyResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let addrs = resolve_public_addrs(name.as_str(), 0).await.map_err(|e| {
                tracing::warn!(host = %name.as_str(), error = %e, "refusing metadata fetch destination");
                Box::new(e) as Box<dyn std::error::Error + Send + Sync>
            })?;
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok(addrs)
        })
    }
}

/// Decides whether a redirect to `url` may be followed.
///
/// `requested` is the number of URLs already requested, so the n-th
/// redirect sees `n`. With `public_https_only` the target must also be
/// HTTPS and must not be a blocked IP literal.
fn redirect_verdict(
    url: &Url,
    requested: usize,
    max_redirects: usize,
    public_https_only: bool,
) -> Result<(), &'static str> {
    if requested > max_redirects {
        return Err("too many redirects");
    }
    if !public_https_only {
        return Ok(());
    }
    if url.scheme() != "https" {
        return Err("redirect to non-HTTPS URL");
    }
    if url.host().is_some_and(|h| is_blocked_host(&h)) {
        return Err("redirect to blocked address");
    }
    Ok(())
}

fn redirect_policy(max_redirects: usize, public_https_only: bool) -> Policy {
    Policy::custom(move |attempt| {
        let verdict = redirect_verdict(
            attempt.url(),
            attempt.previous().len(),
            max_redirects,
            public_https_only,
        );
        match verdict {
            Ok(()) => attempt.follow(),
            Err(reason) => {
                tracing::warn!(url = %attempt.url(), reason, "refusing metadata redirect");
                attempt.error(reason)
            }
        }
    })
}

/// Builds the SSRF-hardened metadata client.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_safe_http_client(config: &CimdConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(config.fetch_timeout)
        .connect_timeout(config.fetch_timeout)
        .redirect(redirect_policy(config.max_redirects, true))
        .dns_resolver(Arc::new(PublicOnlyResolver))
        .https_only(true)
        .build()
}

/// Builds the development metadata client: plain HTTP, private addresses
/// and unverified certificates are all accepted.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_insecure_http_client(config: &CimdConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(config.fetch_timeout)
        .redirect(redirect_policy(config.max_redirects, false))
        .danger_accept_invalid_certs(true)
        .build()
}

/// Builds the client matching `allow_insecure_transport`.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_http_client(config: &CimdConfig) -> Result<reqwest::Client, reqwest::Error> {
    if config.allow_insecure_transport {
        tracing::warn!("metadata document fetches use the insecure development client");
        build_insecure_http_client(config)
    } else {
        build_safe_http_client(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_blocked_ipv4() {
        for ip in [
            Ipv4Addr::new(127, 0, 0, 1),
            Ipv4Addr::new(10, 1, 2, 3),
            Ipv4Addr::new(172, 16, 0, 1),
            Ipv4Addr::new(172, 31, 255, 255),
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(169, 254, 169, 254),
            Ipv4Addr::new(224, 0, 0, 251),
            Ipv4Addr::new(0, 0, 0, 0),
        ] {
            assert!(is_blocked_ip(IpAddr::V4(ip)), "{ip} should be blocked");
        }
    }

    #[test]
    fn test_public_ipv4_allowed() {
        for ip in [
            Ipv4Addr::new(8, 8, 8, 8),
            Ipv4Addr::new(1, 1, 1, 1),
            Ipv4Addr::new(172, 32, 0, 1),
        ] {
            assert!(!is_blocked_ip(IpAddr::V4(ip)), "{ip} should be allowed");
        }
    }

    #[test]
    fn test_blocked_ipv6() {
        assert!(is_blocked_ip(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_blocked_ip("fe80::1".parse().unwrap()));
        assert!(is_blocked_ip("fd00::1".parse().unwrap()));
        assert!(is_blocked_ip("::ffff:127.0.0.1".parse().unwrap()));
        assert!(is_blocked_ip("::ffff:10.0.0.1".parse().unwrap()));
        assert!(!is_blocked_ip("2606:4700:4700::1111".parse().unwrap()));
    }

    #[test]
    fn test_blocked_host_literals() {
        assert!(is_blocked_host(&Host::Ipv4(Ipv4Addr::LOCALHOST)));
        assert!(!is_blocked_host(&Host::Domain("example.com")));
    }

    #[tokio::test]
    async fn test_resolver_rejects_localhost() {
        let err = resolve_public_addrs("localhost", 443).await.unwrap_err();
        assert!(matches!(err, SsrfError::BlockedAddress { .. }));

        let err = resolve_public_addrs("127.0.0.1", 443).await.unwrap_err();
        assert!(matches!(err, SsrfError::BlockedAddress { .. }));
    }

    #[tokio::test]
    async fn test_safe_client_refuses_plain_http() {
        let client = build_safe_http_client(&CimdConfig::default()).unwrap();
        let err = client.get("http://example.com/x").send().await.unwrap_err();
        assert!(err.is_builder());
    }

    #[test]
    fn test_redirect_verdict_hop_limit() {
        let url = Url::parse("https://example.com/next").unwrap();
        for requested in 1..=3 {
            assert_eq!(redirect_verdict(&url, requested, 3, true), Ok(()));
        }
        assert_eq!(redirect_verdict(&url, 4, 3, true), Err("too many redirects"));
        assert_eq!(redirect_verdict(&url, 4, 3, false), Err("too many redirects"));
    }

    #[test]
    fn test_redirect_verdict_destinations() {
        let verdict = |url: &str| redirect_verdict(&Url::parse(url).unwrap(), 1, 3, true);
        assert_eq!(verdict("http://example.com/x"), Err("redirect to non-HTTPS URL"));
        assert_eq!(verdict("https://127.0.0.1/x"), Err("redirect to blocked address"));
        assert_eq!(verdict("https://[::1]/x"), Err("redirect to blocked address"));
        assert_eq!(verdict("https://169.254.169.254/latest"), Err("redirect to blocked address"));
        assert_eq!(verdict("https://example.com/x"), Ok(()));

        let relaxed = Url::parse("http://127.0.0.1/x").unwrap();
        assert_eq!(redirect_verdict(&relaxed, 1, 3, false), Ok(()));
    }

    async fn redirect_chain(server: &MockServer, hops: usize) {
        for i in 0..hops {
            Mock::given(method("GET"))
                .and(path(format!("/hop{i}")))
                .respond_with(
                    ResponseTemplate::new(302)
                        .insert_header("location", format!("{}/hop{}", server.uri(), i + 1)),
                )
                .mount(server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path(format!("/hop{hops}")))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_redirect_limit_is_enforced() {
        let server = MockServer::start().await;
        redirect_chain(&server, 4).await;
        let client = build_insecure_http_client(&CimdConfig::default()).unwrap();

        // /hop1 needs three redirects, /hop0 needs four
        let ok = client.get(format!("{}/hop1", server.uri())).send().await.unwrap();
        assert_eq!(ok.status(), reqwest::StatusCode::OK);

        let err = client
            .get(format!("{}/hop0", server.uri()))
            .send()
            .await
            .unwrap_err();
        assert!(err.is_redirect());
    }

    #[tokio::test]
    async fn test_hardened_policy_refuses_unsafe_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/to-http"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", format!("{}/done", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/to-loopback"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "https://127.0.0.1/done"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/done"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        // only the redirect policy of the safe client, so the test server is reachable
        let client = reqwest::Client::builder()
            .redirect(redirect_policy(3, true))
            .build()
            .unwrap();
        for route in ["/to-http", "/to-loopback"] {
            let err = client
                .get(format!("{}{route}", server.uri()))
                .send()
                .await
                .unwrap_err();
            assert!(err.is_redirect(), "{route}");
        }
    }
}
