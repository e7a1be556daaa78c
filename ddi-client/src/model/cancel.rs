//! `CancelAction`, as returned by `GET {cancelAction}`.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct CancelActionInner {
    #[serde(rename = "stopId")]
    stop_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelAction {
    pub id: String,
    #[serde(rename = "cancelAction")]
    cancel_action: CancelActionInner,
}

impl CancelAction {
    /// Parses the body of a `GET {cancelAction}` response.
    ///
    /// # Errors
    /// Returns the `serde_json` error on schema mismatch.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// The identifier of the action being canceled.
    #[must_use]
    pub fn stop_id(&self) -> &str {
        &self.cancel_action.stop_id
    }
}
