//! End-to-end exercise of one polling cycle against a mocked hawkBit server:
//! base poll -> deploymentBase dispatch -> handler invocation -> feedback
//! POST, the full loop `Controller::run` drives forever in production.

use std::time::Duration;

use async_trait::async_trait;
use ddi_client::{
    CancelAction, ClientBuilder, ConfigResponse, DeploymentBase, EventHandler, Execution,
    Finished, Response,
};
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

struct RecordingHandler {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn on_config_request(&self) -> ConfigResponse {
        ConfigResponse::builder().attribute("unused", "unused").build().unwrap()
    }

    async fn on_deployment_action(
        &self,
        dp: &DeploymentBase,
    ) -> Result<Response, Box<dyn std::error::Error + Send + Sync>> {
        let _ = self.tx.send(dp.id.clone());
        Ok(Response::builder().execution(Execution::Closed).finished(Finished::Success).build()?)
    }

    async fn on_cancel_action(&self, _action: &CancelAction) -> Response {
        Response::builder().execution(Execution::Closed).finished(Finished::Success).build().unwrap()
    }
}

#[tokio::test]
async fn deployment_base_is_dispatched_and_feedback_is_posted() {
    let server = MockServer::start().await;

    // Real hawkBit servers always return absolute hrefs, so the mock does too.
    let deployment_href = format!("{}/DEFAULT/controller/v1/dev1/deploymentBase/1", server.uri());

    Mock::given(method("GET"))
        .and(path("/DEFAULT/controller/v1/dev1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "config": {"polling": {"sleep": "00:00:00"}},
            "_links": {"deploymentBase": {"href": deployment_href}}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/DEFAULT/controller/v1/dev1/deploymentBase/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "1",
            "deployment": {"update": "forced", "chunks": []}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/DEFAULT/controller/v1/dev1/deploymentBase/1/feedback"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let controller = ClientBuilder::new()
        .target(&server.uri(), "dev1", None)
        .unwrap()
        .default_polling_timeout(Duration::from_millis(10))
        .event_handler(RecordingHandler { tx })
        .build()
        .unwrap();

    let handle = tokio::spawn(controller.run());

    let dispatched_id = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("deployment action should be dispatched within the timeout")
        .expect("handler channel should still be open");
    assert_eq!(dispatched_id, "1");

    handle.abort();
}

#[tokio::test]
async fn no_action_links_calls_on_no_actions_and_keeps_polling() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/DEFAULT/controller/v1/dev2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "config": {"polling": {"sleep": "00:00:00"}},
            "_links": {}
        })))
        .mount(&server)
        .await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let controller = ClientBuilder::new()
        .target(&server.uri(), "dev2", None)
        .unwrap()
        .default_polling_timeout(Duration::from_millis(10))
        .event_handler(RecordingHandler { tx })
        .build()
        .unwrap();

    let handle = tokio::spawn(controller.run());
    tokio::time::sleep(Duration::from_millis(200)).await;

    let requests = server.received_requests().await.unwrap();
    assert!(!requests.is_empty(), "the base endpoint should have been polled at least once");

    handle.abort();
}
