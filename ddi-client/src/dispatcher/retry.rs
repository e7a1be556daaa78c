//! Bounded-retry / auth-recovery wrapper around a single logical HTTP
//! request, grounded on the `backon::Retryable` retry loop in
//! `ai-gateway::control_plane::websocket::connect_with_retry` — same
//! backoff-iterator-driven retry shape, applied here to HTTP status-code
//! classification instead of websocket reconnect.

use std::time::Duration;

use reqwest::StatusCode;

use crate::{
    auth::AuthStrategy,
    config::RetryConfig,
    dispatcher::client::build_http_client,
    error::runtime::RequestError,
    handler::{AuthErrorAction, AuthErrorHandler, TokenRotator},
};

/// Feeds a rotated token from an [`AuthErrorHandler`] straight back into the
/// `AuthStrategy` in use, so the single permitted retry after a 401 actually
/// presents the new credential.
struct AuthRotator<'a>(&'a AuthStrategy);

impl TokenRotator for AuthRotator<'_> {
    fn set_token(&self, token: String) {
        self.0.rotate_token(token);
    }
}

/// Executes `build_request` (which only needs to describe method/url/body)
/// against a freshly built client, classifying the outcome by status code.
/// On 401 it asks `auth_error_handler` whether to retry once; on
/// 5xx/connection failure/timeout it retries up to the bound in
/// `retry_config` with the configured backoff.
pub(crate) async fn execute_with_retry<F>(
    build_request: F,
    auth: &AuthStrategy,
    default_headers: &[(String, String)],
    verify_server_certificate: bool,
    timeout: Duration,
    retry_config: &RetryConfig,
    auth_error_handler: Option<&(dyn AuthErrorHandler + Sync)>,
) -> Result<reqwest::Response, RequestError>
where
    F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
{
    let mut backoff = retry_config.as_iterator();
    let mut auth_retried = false;

    loop {
        // mTLS identity material is immutable for the life of the client;
        // a build failure here would only ever happen at startup, where
        // `ClientBuilder::build` already validates it.
        let client = build_http_client(auth, default_headers, verify_server_certificate, timeout)
            .expect("auth/TLS configuration was already validated at build time");

        let request = auth.apply_header(build_request(&client));

        let result = request.send().await;

        match result {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) if response.status() == StatusCode::UNAUTHORIZED => {
                if auth_retried {
                    return Err(RequestError::AuthFailure(
                        "received 401 again after re-authenticating".to_string(),
                    ));
                }
                match auth_error_handler {
                    Some(handler)
                        if handler.on_auth_error(&AuthRotator(auth)).await
                            == AuthErrorAction::Retry =>
                    {
                        auth_retried = true;
                        tracing::warn!("received 401, re-authenticated, retrying once");
                        continue;
                    }
                    _ => {
                        return Err(RequestError::AuthFailure(
                            "received 401 and no recovery was possible".to_string(),
                        ));
                    }
                }
            }
            Ok(response) if response.status().is_redirection() => {
                return Err(RequestError::UnexpectedStatus(response.status()));
            }
            Ok(response) if response.status().is_client_error() => {
                return Err(RequestError::ClientError(response.status()));
            }
            Ok(response) => {
                // 5xx: transient, fall through to the backoff/retry path below.
                match backoff.next() {
                    Some(delay) => {
                        tracing::warn!(
                            status = %response.status(),
                            delay_ms = delay.as_millis() as u64,
                            "server error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    None => {
                        return Err(RequestError::TransportError(
                            response.error_for_status().expect_err("status was checked above"),
                        ));
                    }
                }
            }
            Err(e) => match backoff.next() {
                Some(delay) => {
                    tracing::warn!(error = %e, delay_ms = delay.as_millis() as u64, "transport error, retrying");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                None => return Err(RequestError::TransportError(e)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::AuthStrategy, handler::TokenRotator};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    #[tokio::test]
    async fn succeeds_on_first_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let url = format!("{}/ok", server.uri());
        let retry = RetryConfig::Constant { delay: Duration::from_millis(1), max_retries: 2 };
        let resp = execute_with_retry(
            |c| c.get(&url),
            &AuthStrategy::None,
            &[],
            true,
            Duration::from_secs(5),
            &retry,
            None,
        )
        .await
        .unwrap();
        assert!(resp.status().is_success());
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/bad", server.uri());
        let retry = RetryConfig::Constant { delay: Duration::from_millis(1), max_retries: 5 };
        let err = execute_with_retry(
            |c| c.get(&url),
            &AuthStrategy::None,
            &[],
            true,
            Duration::from_secs(5),
            &retry,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RequestError::ClientError(s) if s == StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn server_error_is_retried_up_to_the_bound() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let url = format!("{}/flaky", server.uri());
        let retry = RetryConfig::Constant { delay: Duration::from_millis(1), max_retries: 2 };
        let err = execute_with_retry(
            |c| c.get(&url),
            &AuthStrategy::None,
            &[],
            true,
            Duration::from_secs(5),
            &retry,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RequestError::TransportError(_)));
        assert!(err.is_transient());
    }

    struct RotatingAuthHandler;

    #[async_trait::async_trait]
    impl AuthErrorHandler for RotatingAuthHandler {
        async fn on_auth_error(&self, rotate: &dyn TokenRotator) -> AuthErrorAction {
            rotate.set_token("new-token".to_string());
            AuthErrorAction::Retry
        }
    }

    #[tokio::test]
    async fn rotates_token_and_succeeds_on_the_single_permitted_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secure"))
            .and(header("Authorization", "GatewayToken old-token"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secure"))
            .and(header("Authorization", "GatewayToken new-token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/secure", server.uri());
        let auth = AuthStrategy::gateway_token("old-token".to_string());
        let retry = RetryConfig::Constant { delay: Duration::from_millis(1), max_retries: 2 };
        let resp = execute_with_retry(
            |c| c.get(&url),
            &auth,
            &[],
            true,
            Duration::from_secs(5),
            &retry,
            Some(&RotatingAuthHandler),
        )
        .await
        .unwrap();
        assert!(resp.status().is_success());
    }
}
