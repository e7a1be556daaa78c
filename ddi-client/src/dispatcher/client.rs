//! Per-request HTTP client factory, grounded on
//! `ai-gateway::dispatcher::client::Client::new_inner`: a fresh
//! `reqwest::Client` is built for each logical request rather than shared,
//! so TLS identity and credential rotation stay simple.

use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    redirect::Policy,
};
use url::Url;

use crate::{auth::AuthStrategy, error::init::ConfigurationError};

/// Caps followed redirects the same way reqwest's own default policy does;
/// our custom policy replaces that default wholesale, so the bound has to
/// be reapplied explicitly.
const MAX_REDIRECTS: usize = 10;

/// Two URLs share an authority when scheme, host, and effective port all
/// match. `url::Url` has no `authority()` accessor (unlike `http::Uri`), so
/// this is compared field by field.
fn same_authority(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

/// Redirects within the same authority are always followed. Cross-authority
/// redirects are only followed when the active auth is replayable (bearer
/// tokens); a client certificate presented to the original host must never
/// be handed to a redirect target, per spec.md §4.3.
fn redirect_policy(auth: &AuthStrategy) -> Policy {
    let replayable = auth.is_replayable();
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.stop();
        }
        if replayable {
            return attempt.follow();
        }
        match attempt.previous().first() {
            Some(origin) if same_authority(origin, attempt.url()) => attempt.follow(),
            _ => attempt.stop(),
        }
    })
}

pub(crate) fn build_http_client(
    auth: &AuthStrategy,
    default_headers: &[(String, String)],
    verify_server_certificate: bool,
    timeout: Duration,
) -> Result<reqwest::Client, ConfigurationError> {
    let mut headers = HeaderMap::new();
    for (k, v) in default_headers {
        let name = HeaderName::from_bytes(k.as_bytes())
            .map_err(|e| ConfigurationError::InvalidIdentity(e.to_string()))?;
        let value = HeaderValue::from_str(v)
            .map_err(|e| ConfigurationError::InvalidIdentity(e.to_string()))?;
        headers.insert(name, value);
    }

    let mut builder = reqwest::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .default_headers(headers)
        .redirect(redirect_policy(auth))
        .danger_accept_invalid_certs(!verify_server_certificate);

    if let AuthStrategy::MutualTls { cert_pem, key_pem } = auth {
        let mut combined = cert_pem.expose().clone();
        combined.extend_from_slice(key_pem.expose());
        let identity = reqwest::Identity::from_pem(&combined)
            .map_err(|e| ConfigurationError::InvalidIdentity(e.to_string()))?;
        builder = builder.identity(identity);
    }

    builder
        .build()
        .map_err(|e| ConfigurationError::InvalidIdentity(e.to_string()))
}

/// Resolves a server-supplied href against the client's base URI, exactly as
/// the controller must when links are relative.
pub(crate) fn resolve_href(base: &Url, href: &str) -> Result<Url, url::ParseError> {
    match Url::parse(href) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base.join(href),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;

    #[test]
    fn resolves_absolute_href_unchanged() {
        let base: Url = "https://example.com/t/controller/v1/dev1".parse().unwrap();
        let resolved = resolve_href(&base, "https://other.example.com/x").unwrap();
        assert_eq!(resolved.as_str(), "https://other.example.com/x");
    }

    #[test]
    fn resolves_relative_href_against_base() {
        let base: Url = "https://example.com/t/controller/v1/dev1/".parse().unwrap();
        let resolved = resolve_href(&base, "deploymentBase/7").unwrap();
        assert_eq!(resolved.as_str(), "https://example.com/t/controller/v1/dev1/deploymentBase/7");
    }

    // Self-signed fixture identity, used only to exercise `redirect_policy`'s
    // authority check; never presented to a real server.
    const TEST_CERT_PEM: &str = include_str!("../../testdata/mtls_client_cert.pem");
    const TEST_KEY_PEM: &str = include_str!("../../testdata/mtls_client_key.pem");

    fn test_mtls_auth() -> AuthStrategy {
        AuthStrategy::MutualTls {
            cert_pem: TEST_CERT_PEM.as_bytes().to_vec().into(),
            key_pem: TEST_KEY_PEM.as_bytes().to_vec().into(),
        }
    }

    #[tokio::test]
    async fn mtls_cross_authority_redirect_is_not_followed() {
        let origin = MockServer::start().await;
        let other = MockServer::start().await;

        let target = format!("{}/landed", other.uri());
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", target.as_str()))
            .mount(&origin)
            .await;
        Mock::given(method("GET"))
            .and(path("/landed"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&other)
            .await;

        let client =
            build_http_client(&test_mtls_auth(), &[], true, Duration::from_secs(5)).unwrap();
        let response = client.get(format!("{}/start", origin.uri())).send().await.unwrap();

        // The redirect is stopped rather than followed, so the caller sees
        // the 302 itself, never the target's 200.
        assert_eq!(response.status(), reqwest::StatusCode::FOUND);
    }

    #[tokio::test]
    async fn mtls_same_authority_redirect_is_followed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/landed"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/landed"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client =
            build_http_client(&test_mtls_auth(), &[], true, Duration::from_secs(5)).unwrap();
        let response = client.get(format!("{}/start", server.uri())).send().await.unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn token_auth_cross_authority_redirect_is_followed() {
        let origin = MockServer::start().await;
        let other = MockServer::start().await;

        let target = format!("{}/landed", other.uri());
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", target.as_str()))
            .mount(&origin)
            .await;
        Mock::given(method("GET"))
            .and(path("/landed"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&other)
            .await;

        let auth = AuthStrategy::gateway_token("t".to_string());
        let client = build_http_client(&auth, &[], true, Duration::from_secs(5)).unwrap();
        let response = client.get(format!("{}/start", origin.uri())).send().await.unwrap();

        // Bearer tokens are safely replayable across hosts, so the client
        // follows the redirect to completion.
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }
}
