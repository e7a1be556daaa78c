//! Capability interfaces the embedding device implements. Each is a small,
//! independently mockable trait rather than a class hierarchy, following
//! `ai-gateway`'s preference for narrow traits like `ProviderClient` over
//! inheritance.

use async_trait::async_trait;

use crate::model::{
    cancel::CancelAction,
    deployment::DeploymentBase,
    response::{ConfigResponse, Response},
};

/// Domain-specific behavior the controller invokes once per dispatched
/// action.
#[async_trait]
pub trait EventHandler {
    async fn on_config_request(&self) -> ConfigResponse;

    /// Typically iterates `dp.chunks()` and downloads each artifact
    /// synchronously inside this call. Any error raised here is
    /// caught by the controller, which synthesizes a failure `Response` on
    /// the handler's behalf.
    async fn on_deployment_action(
        &self,
        dp: &DeploymentBase,
    ) -> Result<Response, Box<dyn std::error::Error + Send + Sync>>;

    async fn on_cancel_action(&self, action: &CancelAction) -> Response;

    /// Invoked when a poll cycle returns no action links at all.
    async fn on_no_actions(&self) {}
}

/// What the retry wrapper should do after a 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorAction {
    /// Rotate/refresh credentials were applied; retry the request once.
    Retry,
    /// Give up; propagate `AuthFailure` for this cycle.
    Fail,
}

/// Lets an [`AuthErrorHandler`] install a freshly fetched token in place of
/// the currently configured one, so the retry the handler requests actually
/// uses the rotated credential. A no-op if the active `AuthStrategy` has no
/// rotatable token (`None`, `MutualTls`).
pub trait TokenRotator: Send + Sync {
    fn set_token(&self, token: String);
}

/// Invoked by the retry wrapper when a request receives a 401.
/// Implementations typically fetch a fresh token and hand it to `rotate`
/// before returning [`AuthErrorAction::Retry`].
#[async_trait]
pub trait AuthErrorHandler {
    async fn on_auth_error(&self, rotate: &dyn TokenRotator) -> AuthErrorAction;
}

/// Notified with the outcome of posting a `Response` or `ConfigResponse`.
/// Implementations must not block the controller thread.
pub trait ResponseDeliveryListener {
    fn on_successful_delivery(&self) {}
    fn on_error(&self) {}
}
