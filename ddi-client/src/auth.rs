//! Authentication variants for talking to the hawkBit server.
//!
//! Exactly one variant is active at a time; the builder rejects a second
//! assignment immediately, the same way the original
//! `DefaultClientBuilderImpl::setGatewayToken` throws the moment a second
//! auth call is made rather than waiting for `build()`.

use std::sync::{Arc, RwLock};

use crate::types::secret::Secret;

/// A token behind a lock so an [`crate::handler::AuthErrorHandler`] can
/// rotate it in place after a 401 without the controller needing to
/// rebuild `AuthStrategy` itself — the next request simply reads the
/// current value.
#[derive(Clone)]
pub(crate) struct TokenCell(Arc<RwLock<Secret<String>>>);

impl TokenCell {
    fn new(token: String) -> Self {
        Self(Arc::new(RwLock::new(token.into())))
    }

    fn current(&self) -> String {
        self.0.read().expect("token lock poisoned").expose().clone()
    }

    fn set(&self, token: String) {
        *self.0.write().expect("token lock poisoned") = token.into();
    }
}

#[derive(Clone)]
pub enum AuthStrategy {
    None,
    GatewayToken(TokenCell),
    DeviceToken(TokenCell),
    MutualTls { cert_pem: Secret<Vec<u8>>, key_pem: Secret<Vec<u8>> },
}

impl std::fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::GatewayToken(_) => write!(f, "GatewayToken(*****)"),
            Self::DeviceToken(_) => write!(f, "DeviceToken(*****)"),
            Self::MutualTls { .. } => write!(f, "MutualTls(*****)"),
        }
    }
}

impl Default for AuthStrategy {
    fn default() -> Self {
        Self::None
    }
}

impl AuthStrategy {
    pub(crate) fn gateway_token(token: String) -> Self {
        Self::GatewayToken(TokenCell::new(token))
    }

    pub(crate) fn device_token(token: String) -> Self {
        Self::DeviceToken(TokenCell::new(token))
    }

    /// Installs the `Authorization` header for the token-based variants.
    /// mTLS installs no header; its credentials are presented during the TLS
    /// handshake instead (see `dispatcher::client::build_http_client`).
    pub(crate) fn apply_header(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> reqwest::RequestBuilder {
        match self {
            Self::None | Self::MutualTls { .. } => builder,
            Self::GatewayToken(cell) => builder.header(
                reqwest::header::AUTHORIZATION,
                format!("GatewayToken {}", cell.current()),
            ),
            Self::DeviceToken(cell) => builder.header(
                reqwest::header::AUTHORIZATION,
                format!("TargetToken {}", cell.current()),
            ),
        }
    }

    /// Installs a freshly fetched token in place, e.g. from an
    /// `AuthErrorHandler` after a 401. A no-op for `None`/`MutualTls`, which
    /// have no rotatable token.
    pub(crate) fn rotate_token(&self, token: String) {
        match self {
            Self::GatewayToken(cell) | Self::DeviceToken(cell) => cell.set(token),
            Self::None | Self::MutualTls { .. } => {}
        }
    }

    /// Token-based auth can be safely replayed across hosts; client
    /// certificates cannot.
    #[must_use]
    pub fn is_replayable(&self) -> bool {
        matches!(self, Self::None | Self::GatewayToken(_) | Self::DeviceToken(_))
    }
}
