use displaydoc::Display;
use thiserror::Error;

/// Fatal errors raised while assembling a [`crate::ClientBuilder`] or
/// building [`crate::model::response::Response`] / [`crate::model::response::ConfigResponse`].
///
/// These never surface once the polling loop is running; they end the
/// process at startup, the same way a malformed `ai-gateway` config ends
/// the gateway before it ever accepts a request.
#[derive(Debug, Error, Display)]
pub enum ConfigurationError {
    /// another auth variant is already configured
    AuthAlreadySet,
    /// hawkbit endpoint was not set
    MissingEndpoint,
    /// event handler was not set
    MissingEventHandler,
    /// failed to parse endpoint URL: {0}
    InvalidUrl(#[from] url::ParseError),
    /// failed to load mTLS identity: {0}
    InvalidIdentity(String),
}

/// Fatal errors raised by a response builder's `build()` when a required
/// field was never set.
#[derive(Debug, Error, Display)]
pub enum IncompleteResponse {
    /// `execution` was not set on the response
    MissingExecution,
    /// `finished` was not set on the response
    MissingFinished,
    /// at least one attribute is required for a config response
    NoAttributes,
}
