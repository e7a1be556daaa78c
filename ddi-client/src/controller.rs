//! The polling state machine and update-action controller: the
//! long-lived loop that sleeps, polls, dispatches to one of three sub-flows,
//! invokes the user's [`EventHandler`], streams artifacts, and posts
//! feedback.
//!
//! Grounded on the dispatch-by-discriminant shape of
//! `ai-gateway::dispatcher::service` and the reconnect-loop shape of
//! `ai-gateway::control_plane::websocket::ControlPlaneClient::run_control_plane_forever`
//! — both drive a single long-running async loop that logs and continues
//! past recoverable errors instead of terminating the task.

use std::{sync::Arc, time::Duration};

use url::Url;

use crate::{
    auth::AuthStrategy,
    config::RetryConfig,
    dispatcher::{client::resolve_href, retry::execute_with_retry},
    error::{init::ConfigurationError, runtime::RequestError},
    handler::{AuthErrorHandler, EventHandler},
    model::{
        cancel::CancelAction,
        deployment::{DeploymentBase, DownloadSession},
        poll::{ActionLink, PollResponse},
        response::{ConfigResponse, Response},
    },
};

const DEFAULT_POLLING_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TENANT: &str = "DEFAULT";

/// Staged constructor for [`Controller`]. Auth variants are mutually exclusive:
/// assigning a second one fails immediately rather than waiting for
/// [`ClientBuilder::build`], matching the original
/// `DefaultClientBuilderImpl::setGatewayToken`'s eager rejection.
pub struct ClientBuilder {
    endpoint: Option<Url>,
    default_headers: Vec<(String, String)>,
    default_polling_timeout: Duration,
    request_timeout: Duration,
    auth: AuthStrategy,
    verify_server_certificate: bool,
    handler: Option<Arc<dyn EventHandler + Send + Sync>>,
    auth_error_handler: Option<Arc<dyn AuthErrorHandler + Send + Sync>>,
    retry_config: RetryConfig,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            endpoint: None,
            default_headers: Vec::new(),
            default_polling_timeout: Duration::from_millis(DEFAULT_POLLING_TIMEOUT_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            auth: AuthStrategy::None,
            verify_server_certificate: true,
            handler: None,
            auth_error_handler: None,
            retry_config: RetryConfig::default(),
        }
    }
}

impl ClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the full hawkBit base URI directly (useful against a mock
    /// server in tests).
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidUrl`] if `endpoint` doesn't
    /// parse.
    pub fn hawkbit_endpoint(mut self, endpoint: &str) -> Result<Self, ConfigurationError> {
        self.endpoint = Some(Url::parse(endpoint)?);
        Ok(self)
    }

    /// Sets the hawkBit endpoint by composing
    /// `{scheme}://{authority}/{tenant}/controller/v1/{controller_id}`, the
    /// convention the original hawkBit C++ client builds
    /// (`default_client_builder.cpp`).
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidUrl`] if `endpoint` doesn't
    /// parse.
    pub fn target(
        mut self,
        endpoint: &str,
        controller_id: &str,
        tenant: Option<&str>,
    ) -> Result<Self, ConfigurationError> {
        let base = Url::parse(endpoint)?;
        let tenant = tenant.unwrap_or(DEFAULT_TENANT);
        let composed = format!(
            "{}://{}/{tenant}/controller/v1/{controller_id}",
            base.scheme(),
            base.authority(),
        );
        self.endpoint = Some(Url::parse(&composed)?);
        Ok(self)
    }

    #[must_use]
    pub fn default_polling_timeout(mut self, timeout: Duration) -> Self {
        self.default_polling_timeout = timeout;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn add_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn not_verify_server_certificate(mut self) -> Self {
        self.verify_server_certificate = false;
        self
    }

    #[must_use]
    pub fn event_handler(mut self, handler: impl EventHandler + Send + Sync + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn auth_error_handler(
        mut self,
        handler: impl AuthErrorHandler + Send + Sync + 'static,
    ) -> Self {
        self.auth_error_handler = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// # Errors
    /// Returns [`ConfigurationError::AuthAlreadySet`] if another auth
    /// variant is already configured.
    pub fn gateway_token(mut self, token: impl Into<String>) -> Result<Self, ConfigurationError> {
        self.require_auth_unset()?;
        self.auth = AuthStrategy::gateway_token(token.into());
        Ok(self)
    }

    /// # Errors
    /// Returns [`ConfigurationError::AuthAlreadySet`] if another auth
    /// variant is already configured.
    pub fn device_token(mut self, token: impl Into<String>) -> Result<Self, ConfigurationError> {
        self.require_auth_unset()?;
        self.auth = AuthStrategy::device_token(token.into());
        Ok(self)
    }

    /// # Errors
    /// Returns [`ConfigurationError::AuthAlreadySet`] if another auth
    /// variant is already configured.
    pub fn mutual_tls(
        mut self,
        cert_pem: Vec<u8>,
        key_pem: Vec<u8>,
    ) -> Result<Self, ConfigurationError> {
        self.require_auth_unset()?;
        self.auth = AuthStrategy::MutualTls { cert_pem: cert_pem.into(), key_pem: key_pem.into() };
        Ok(self)
    }

    fn require_auth_unset(&self) -> Result<(), ConfigurationError> {
        match self.auth {
            AuthStrategy::None => Ok(()),
            _ => Err(ConfigurationError::AuthAlreadySet),
        }
    }

    /// # Errors
    /// Returns [`ConfigurationError::MissingEndpoint`] or
    /// [`ConfigurationError::MissingEventHandler`] if a required field was
    /// never set.
    pub fn build(self) -> Result<Controller, ConfigurationError> {
        let endpoint = self.endpoint.ok_or(ConfigurationError::MissingEndpoint)?;
        let handler = self.handler.ok_or(ConfigurationError::MissingEventHandler)?;

        // Surface mTLS identity errors now rather than on the first request.
        crate::dispatcher::client::build_http_client(
            &self.auth,
            &self.default_headers,
            self.verify_server_certificate,
            self.request_timeout,
        )?;

        let base_is_tls = endpoint.scheme() == "https" || endpoint.scheme() == "wss";

        Ok(Controller {
            base_uri: endpoint,
            base_is_tls,
            default_headers: self.default_headers,
            auth: self.auth,
            verify_server_certificate: self.verify_server_certificate,
            request_timeout: self.request_timeout,
            retry_config: self.retry_config,
            handler,
            auth_error_handler: self.auth_error_handler,
            current_sleep: self.default_polling_timeout,
            ignore_sleep: false,
        })
    }
}

/// Drives the polling loop described above. Built via [`ClientBuilder`].
pub struct Controller {
    base_uri: Url,
    base_is_tls: bool,
    default_headers: Vec<(String, String)>,
    auth: AuthStrategy,
    verify_server_certificate: bool,
    request_timeout: Duration,
    retry_config: RetryConfig,
    handler: Arc<dyn EventHandler + Send + Sync>,
    auth_error_handler: Option<Arc<dyn AuthErrorHandler + Send + Sync>>,
    current_sleep: Duration,
    ignore_sleep: bool,
}

impl Controller {
    /// Runs the polling loop forever. Does not return under normal
    /// operation; the only way the embedding process stops this is to drop
    /// the task/process, since the protocol has no in-band cancellation of
    /// the loop itself.
    pub async fn run(mut self) -> ! {
        loop {
            self.sleep_step().await;

            let body = match self.poll().await {
                Ok(body) => body,
                Err(e) => {
                    Self::log_cycle_error(&e, "poll request failed");
                    continue;
                }
            };

            let poll_response = match PollResponse::parse(&body) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(error = %e, "unexpected payload from base poll");
                    continue;
                }
            };

            if let Some(sleep) = poll_response.sleep_hint() {
                self.current_sleep = sleep;
            }

            self.dispatch(poll_response).await;
        }
    }

    async fn sleep_step(&mut self) {
        if self.ignore_sleep {
            self.ignore_sleep = false;
            tracing::debug!("ignoreSleep latch set, skipping sleep this cycle");
        } else {
            tracing::debug!(ms = self.current_sleep.as_millis() as u64, "sleeping before next poll");
            tokio::time::sleep(self.current_sleep).await;
        }
    }

    async fn dispatch(&mut self, poll_response: PollResponse) {
        let ignore_sleep = match poll_response.dispatch_link() {
            Some(ActionLink::CancelAction(href)) => {
                let href = href.to_string();
                match self.handle_cancel_action(&href).await {
                    Ok(ignore_sleep) => ignore_sleep,
                    Err(e) => {
                        Self::log_cycle_error(&e, "cancel action flow failed");
                        false
                    }
                }
            }
            Some(ActionLink::DeploymentBase(href)) => {
                let href = href.to_string();
                match self.handle_deployment_base(&href).await {
                    Ok(ignore_sleep) => ignore_sleep,
                    Err(e) => {
                        Self::log_cycle_error(&e, "deployment base flow failed");
                        false
                    }
                }
            }
            Some(ActionLink::ConfigData(href)) => {
                let href = href.to_string();
                match self.handle_config_data(&href).await {
                    Ok(ignore_sleep) => ignore_sleep,
                    Err(e) => {
                        Self::log_cycle_error(&e, "config data flow failed");
                        false
                    }
                }
            }
            None => {
                self.handler.on_no_actions().await;
                false
            }
        };
        self.ignore_sleep = ignore_sleep;
    }

    async fn poll(&self) -> Result<bytes::Bytes, RequestError> {
        let url = self.base_uri.clone();
        let response = execute_with_retry(
            move |client| client.get(url.clone()),
            &self.auth,
            &self.default_headers,
            self.verify_server_certificate,
            self.request_timeout,
            &self.retry_config,
            self.auth_error_handler.as_deref(),
        )
        .await?;
        Ok(response.bytes().await?)
    }

    async fn get(&self, url: Url) -> Result<bytes::Bytes, RequestError> {
        let response = execute_with_retry(
            move |client| client.get(url.clone()),
            &self.auth,
            &self.default_headers,
            self.verify_server_certificate,
            self.request_timeout,
            &self.retry_config,
            self.auth_error_handler.as_deref(),
        )
        .await?;
        Ok(response.bytes().await?)
    }

    async fn post_json<T: serde::Serialize + Send + Sync>(
        &self,
        url: Url,
        body: &T,
    ) -> Result<reqwest::StatusCode, RequestError> {
        let body_bytes = serde_json::to_vec(body).expect("feedback body is always serializable");
        let response = execute_with_retry(
            move |client| client.post(url.clone()).header("Content-Type", "application/json").body(body_bytes.clone()),
            &self.auth,
            &self.default_headers,
            self.verify_server_certificate,
            self.request_timeout,
            &self.retry_config,
            self.auth_error_handler.as_deref(),
        )
        .await?;
        Ok(response.status())
    }

    async fn put_json<T: serde::Serialize + Send + Sync>(
        &self,
        url: Url,
        body: &T,
    ) -> Result<reqwest::StatusCode, RequestError> {
        let body_bytes = serde_json::to_vec(body).expect("feedback body is always serializable");
        let response = execute_with_retry(
            move |client| client.put(url.clone()).header("Content-Type", "application/json").body(body_bytes.clone()),
            &self.auth,
            &self.default_headers,
            self.verify_server_certificate,
            self.request_timeout,
            &self.retry_config,
            self.auth_error_handler.as_deref(),
        )
        .await?;
        Ok(response.status())
    }

    /// Logs a failed cycle at a severity matching `RequestError::is_transient`:
    /// transient transport failures (already retried with backoff once)
    /// drop to `warn`, since the next poll cycle may simply succeed;
    /// everything else — auth failures, schema mismatches, unexpected
    /// statuses — is an `error`, since retrying on the same schedule won't
    /// fix it.
    fn log_cycle_error(e: &RequestError, step: &str) {
        if e.is_transient() {
            tracing::warn!(error = %e, step, "transient failure, will retry next cycle");
        } else {
            tracing::error!(error = %e, step, "cycle step failed");
        }
    }

    fn resolve(&self, href: &str) -> Result<Url, RequestError> {
        resolve_href(&self.base_uri, href)
            .map_err(|_| RequestError::ClientError(reqwest::StatusCode::BAD_REQUEST))
    }

    /// Appends a `feedback` path segment to an action href, e.g.
    /// `.../cancelAction/14` -> `.../cancelAction/14/feedback`. `Url::join`
    /// would instead replace the last segment, which is wrong here.
    fn feedback_href(url: &Url) -> Url {
        let mut feedback = url.clone();
        feedback.path_segments_mut().map(|mut segments| segments.push("feedback")).ok();
        feedback
    }

    fn notify_delivery(status: reqwest::StatusCode, listener: Option<&(dyn crate::handler::ResponseDeliveryListener + Send + Sync)>) {
        let Some(listener) = listener else { return };
        if status.is_success() {
            listener.on_successful_delivery();
        } else {
            listener.on_error();
        }
    }

    /// Cancel-action flow. Returns whether the next cycle's sleep
    /// should be skipped.
    async fn handle_cancel_action(&self, href: &str) -> Result<bool, RequestError> {
        let url = self.resolve(href)?;
        let body = self.get(url.clone()).await?;
        let action = CancelAction::parse(&body)?;

        let response = self.handler.on_cancel_action(&action).await;

        let feedback_url = Self::feedback_href(&url);
        let feedback_body = response.to_feedback_body(&action.id);
        let status = self.post_json(feedback_url, &feedback_body).await?;
        Self::notify_delivery(status, response.delivery_listener());
        Ok(response.ignore_sleep())
    }

    /// Deployment-base flow. Returns whether the next cycle's sleep
    /// should be skipped.
    async fn handle_deployment_base(&self, href: &str) -> Result<bool, RequestError> {
        let url = self.resolve(href)?;
        let body = self.get(url.clone()).await?;
        let session = DownloadSession {
            base_url: self.base_uri.clone(),
            base_is_tls: self.base_is_tls,
            auth: self.auth.clone(),
            default_headers: self.default_headers.clone(),
            verify_server_certificate: self.verify_server_certificate,
            timeout: self.request_timeout,
        };
        let dp = DeploymentBase::parse(&body)?.with_session(session);

        let response = match self.handler.on_deployment_action(&dp).await {
            Ok(response) => response,
            Err(e) => {
                // The controller synthesizes a failure feedback on the
                // handler's behalf; this is the only such path.
                tracing::error!(error = %e, "deployment handler raised an error");
                Response::synthetic_failure(e.to_string())
            }
        };

        let feedback_url = Self::feedback_href(&url);
        let feedback_body = response.to_feedback_body(&dp.id);
        let status = self.post_json(feedback_url, &feedback_body).await?;
        Self::notify_delivery(status, response.delivery_listener());
        Ok(response.ignore_sleep())
    }

    /// Config-data flow. Returns whether the next cycle's sleep should
    /// be skipped.
    async fn handle_config_data(&self, href: &str) -> Result<bool, RequestError> {
        let url = self.resolve(href)?;
        let response: ConfigResponse = self.handler.on_config_request().await;
        let feedback_body = response.to_feedback_body();
        let status = self.put_json(url, &feedback_body).await?;
        Self::notify_delivery(status, response.delivery_listener());
        Ok(response.ignore_sleep())
    }
}

/// Lets an embedder register the polling loop on a [`meltdown::Meltdown`]
/// runtime alongside its other long-running services, so a process-wide
/// shutdown signal stops the loop cleanly instead of the whole process
/// needing to be killed. Grounded on
/// `ai-gateway::control_plane::websocket::ControlPlaneClient`'s own
/// `impl meltdown::Service`, which races its forever-loop against `&mut
/// token` the same way. This is a different concern from `run`'s own
/// lack of in-band cancellation of an in-flight install: it governs when
/// the *polling loop task* stops, not whether a dispatched deployment
/// action can be interrupted mid-install.
impl meltdown::Service for Controller {
    type Future = futures::future::BoxFuture<'static, Result<(), std::convert::Infallible>>;

    fn run(self, mut token: meltdown::Token) -> Self::Future {
        Box::pin(async move {
            tokio::select! {
                _ = self.run() => unreachable!("the polling loop never returns on its own"),
                () = &mut token => {
                    tracing::debug!("ddi-client polling loop shutting down");
                }
            }
            Ok(())
        })
    }
}
