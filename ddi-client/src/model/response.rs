//! Outbound feedback payloads: `Response` (posted for cancel/deployment
//! actions) and `ConfigResponse` (PUT for the config-data flow), and their
//! staged builders.

use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::{error::init::IncompleteResponse, handler::ResponseDeliveryListener};

/// Serializes as a JSON object in insertion order, unlike `BTreeMap` (which
/// would sort keys) or the default `HashMap` (which has no stable order).
struct OrderedMap(Vec<(String, String)>);

impl Serialize for OrderedMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    Closed,
    Proceeding,
    Canceled,
    Scheduled,
    Rejected,
    Resumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Finished {
    None,
    Success,
    Failure,
}

#[derive(Serialize)]
struct FeedbackResult {
    finished: Finished,
}

#[derive(Serialize)]
struct FeedbackStatus {
    execution: Execution,
    result: FeedbackResult,
    details: Vec<String>,
}

#[derive(Serialize)]
pub(crate) struct FeedbackBody {
    id: String,
    status: FeedbackStatus,
}

/// Outbound feedback for the cancel and deployment flows.
pub struct Response {
    execution: Execution,
    finished: Finished,
    details: Vec<String>,
    ignore_sleep: bool,
    delivery_listener: Option<Box<dyn ResponseDeliveryListener + Send + Sync>>,
}

impl Response {
    #[must_use]
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::default()
    }

    #[must_use]
    pub fn ignore_sleep(&self) -> bool {
        self.ignore_sleep
    }

    pub(crate) fn delivery_listener(
        &self,
    ) -> Option<&(dyn ResponseDeliveryListener + Send + Sync)> {
        self.delivery_listener.as_deref()
    }

    pub(crate) fn to_feedback_body(&self, action_id: &str) -> FeedbackBody {
        FeedbackBody {
            id: action_id.to_string(),
            status: FeedbackStatus {
                execution: self.execution,
                result: FeedbackResult { finished: self.finished },
                details: self.details.clone(),
            },
        }
    }

    /// Synthesizes the failure feedback the controller posts on the
    /// handler's behalf when `onDeploymentAction` raises an error.
    #[must_use]
    pub(crate) fn synthetic_failure(message: impl Into<String>) -> Self {
        Self {
            execution: Execution::Closed,
            finished: Finished::Failure,
            details: vec![message.into()],
            ignore_sleep: false,
            delivery_listener: None,
        }
    }
}

#[derive(Default)]
pub struct ResponseBuilder {
    execution: Option<Execution>,
    finished: Option<Finished>,
    details: Vec<String>,
    ignore_sleep: bool,
    delivery_listener: Option<Box<dyn ResponseDeliveryListener + Send + Sync>>,
}

impl ResponseBuilder {
    #[must_use]
    pub fn execution(mut self, execution: Execution) -> Self {
        self.execution = Some(execution);
        self
    }

    #[must_use]
    pub fn finished(mut self, finished: Finished) -> Self {
        self.finished = Some(finished);
        self
    }

    #[must_use]
    pub fn detail(mut self, line: impl Into<String>) -> Self {
        self.details.push(line.into());
        self
    }

    #[must_use]
    pub fn ignore_sleep(mut self, ignore_sleep: bool) -> Self {
        self.ignore_sleep = ignore_sleep;
        self
    }

    #[must_use]
    pub fn delivery_listener(
        mut self,
        listener: impl ResponseDeliveryListener + Send + Sync + 'static,
    ) -> Self {
        self.delivery_listener = Some(Box::new(listener));
        self
    }

    /// # Errors
    /// Returns [`IncompleteResponse`] if `execution` or `finished` was never
    /// set.
    pub fn build(self) -> Result<Response, IncompleteResponse> {
        Ok(Response {
            execution: self.execution.ok_or(IncompleteResponse::MissingExecution)?,
            finished: self.finished.ok_or(IncompleteResponse::MissingFinished)?,
            details: self.details,
            ignore_sleep: self.ignore_sleep,
            delivery_listener: self.delivery_listener,
        })
    }
}

#[derive(Serialize)]
pub(crate) struct ConfigFeedbackBody {
    mode: &'static str,
    data: OrderedMap,
    status: FeedbackStatus,
}

/// Outbound config-data push.
pub struct ConfigResponse {
    attrs: Vec<(String, String)>,
    ignore_sleep: bool,
    delivery_listener: Option<Box<dyn ResponseDeliveryListener + Send + Sync>>,
}

impl ConfigResponse {
    #[must_use]
    pub fn builder() -> ConfigResponseBuilder {
        ConfigResponseBuilder::default()
    }

    #[must_use]
    pub fn ignore_sleep(&self) -> bool {
        self.ignore_sleep
    }

    pub(crate) fn delivery_listener(
        &self,
    ) -> Option<&(dyn ResponseDeliveryListener + Send + Sync)> {
        self.delivery_listener.as_deref()
    }

    pub(crate) fn to_feedback_body(&self) -> ConfigFeedbackBody {
        ConfigFeedbackBody {
            mode: "merge",
            data: OrderedMap(self.attrs.clone()),
            status: FeedbackStatus {
                execution: Execution::Closed,
                result: FeedbackResult { finished: Finished::Success },
                details: Vec::new(),
            },
        }
    }
}

#[derive(Default)]
pub struct ConfigResponseBuilder {
    attrs: Vec<(String, String)>,
    ignore_sleep: bool,
    delivery_listener: Option<Box<dyn ResponseDeliveryListener + Send + Sync>>,
}

impl ConfigResponseBuilder {
    /// Inserts or overwrites an attribute, preserving the position of the
    /// first insertion for deterministic serialization.
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        if let Some(existing) = self.attrs.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
        } else {
            self.attrs.push((key, value));
        }
        self
    }

    #[must_use]
    pub fn ignore_sleep(mut self, ignore_sleep: bool) -> Self {
        self.ignore_sleep = ignore_sleep;
        self
    }

    #[must_use]
    pub fn delivery_listener(
        mut self,
        listener: impl ResponseDeliveryListener + Send + Sync + 'static,
    ) -> Self {
        self.delivery_listener = Some(Box::new(listener));
        self
    }

    /// # Errors
    /// Returns [`IncompleteResponse`] if no attribute was ever set.
    pub fn build(self) -> Result<ConfigResponse, IncompleteResponse> {
        if self.attrs.is_empty() {
            return Err(IncompleteResponse::NoAttributes);
        }
        Ok(ConfigResponse {
            attrs: self.attrs,
            ignore_sleep: self.ignore_sleep,
            delivery_listener: self.delivery_listener,
        })
    }
}
