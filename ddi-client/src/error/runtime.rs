use displaydoc::Display;
use thiserror::Error;

/// Errors that can occur while executing a single logical HTTP request
/// through the retry wrapper. All of these are recoverable at the
/// polling-cycle level: the controller logs them and moves on to the sleep
/// step rather than terminating, mirroring how `ai-gateway`'s dispatcher
/// bubbles per-request failures up to its caller instead of crashing the
/// whole gateway task.
#[derive(Debug, Error, Display)]
pub enum RequestError {
    /// the server payload did not match the expected schema: {0}
    UnexpectedPayload(#[from] serde_json::Error),
    /// authentication failed and could not be recovered: {0}
    AuthFailure(String),
    /// transport error after exhausting the retry budget: {0}
    TransportError(#[from] reqwest::Error),
    /// unexpected client error status {0}
    ClientError(reqwest::StatusCode),
    /// unexpected response status {0}
    UnexpectedStatus(reqwest::StatusCode),
    /// local I/O error while streaming an artifact: {0}
    Io(#[from] std::io::Error),
}

impl RequestError {
    /// Whether this is a transient transport failure (already retried with
    /// backoff by `dispatcher::retry::execute_with_retry` before reaching
    /// here) rather than a definitive rejection such as a bad auth or
    /// schema mismatch. Used by the controller to pick a log severity for
    /// a failed cycle: transient failures are worth only a `warn`, since
    /// the next poll cycle may simply succeed on its own.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransportError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_is_not_transient() {
        let e = RequestError::from(std::io::Error::other("boom"));
        assert!(!e.is_transient());
        assert!(matches!(e, RequestError::Io(_)));
    }

    #[test]
    fn client_error_is_not_transient() {
        let e = RequestError::ClientError(reqwest::StatusCode::NOT_FOUND);
        assert!(!e.is_transient());
    }

    #[test]
    fn auth_failure_is_not_transient() {
        let e = RequestError::AuthFailure("nope".to_string());
        assert!(!e.is_transient());
    }
}
