//! Example device: polls a hawkBit server, prints every dispatched action,
//! and downloads + hash-verifies deployment artifacts into a local
//! directory. Mirrors the reference `basic_handler`/`main` example device
//! shipped with the original hawkBit C++ client.

use std::path::PathBuf;

use async_trait::async_trait;
use clap::Parser;
use ddi_client::{
    AuthErrorAction, AuthErrorHandler, CancelAction, ClientBuilder, ConfigResponse,
    DeploymentBase, EventHandler, Response, ResponseDeliveryListener, TokenRotator,
};

#[derive(Debug, Parser)]
#[command(version, about = "Example hawkBit DDI device")]
struct Args {
    /// hawkBit base URL, e.g. https://example.com
    #[arg(short, long, env = "HAWKBIT_ENDPOINT")]
    endpoint: String,

    /// Controller (device) id this client identifies as.
    #[arg(short, long, env = "HAWKBIT_CONTROLLER_ID")]
    controller_id: String,

    /// hawkBit tenant; defaults to "DEFAULT" if omitted.
    #[arg(short, long, env = "HAWKBIT_TENANT")]
    tenant: Option<String>,

    /// Gateway token, if this device authenticates that way.
    #[arg(long, env = "HAWKBIT_GATEWAY_TOKEN")]
    gateway_token: Option<String>,

    /// Target (device) token, if this device authenticates that way.
    #[arg(long, env = "HAWKBIT_DEVICE_TOKEN")]
    device_token: Option<String>,

    /// Skip TLS certificate verification (testing against self-signed servers only).
    #[arg(long)]
    insecure: bool,

    /// Directory artifacts are downloaded into, one subdirectory per chunk.
    #[arg(long, default_value = "./downloads")]
    download_dir: PathBuf,
}

struct CancelFeedbackListener;

impl ResponseDeliveryListener for CancelFeedbackListener {
    fn on_successful_delivery(&self) {
        println!(">> Successfully delivered cancelAction response");
    }

    fn on_error(&self) {
        println!(">> Error delivering cancelAction response");
    }
}

struct DeploymentFeedbackListener;

impl ResponseDeliveryListener for DeploymentFeedbackListener {
    fn on_successful_delivery(&self) {
        println!(">> Successfully delivered deploymentBase response");
    }

    fn on_error(&self) {
        println!(">> Error delivering deploymentBase response");
    }
}

/// This example device has no credential refresh path, so a 401 always ends
/// the cycle. A real device would fetch a fresh token here and apply it to
/// the next request.
struct NoRefreshAuthHandler;

#[async_trait]
impl AuthErrorHandler for NoRefreshAuthHandler {
    async fn on_auth_error(&self, _rotate: &dyn TokenRotator) -> AuthErrorAction {
        tracing::warn!("received 401 and this example device has no credential refresh path");
        AuthErrorAction::Fail
    }
}

struct Handler {
    download_dir: PathBuf,
}

#[async_trait]
impl EventHandler for Handler {
    async fn on_config_request(&self) -> ConfigResponse {
        println!(">> Sending config data");
        ConfigResponse::builder()
            .attribute("some", "config1")
            .attribute("some1", "new config")
            .attribute("some2", "RITMS123")
            .attribute("some3", "TEST_TEST_TEST")
            .ignore_sleep(true)
            .build()
            .expect("at least one attribute was set above")
    }

    async fn on_deployment_action(
        &self,
        dp: &DeploymentBase,
    ) -> Result<Response, Box<dyn std::error::Error + Send + Sync>> {
        println!(">> Got deploymentBase request");
        println!(
            " id: {} update: {:?} download: {:?} inWindow: {:?}",
            dp.id,
            dp.update_type(),
            dp.download_type(),
            dp.maintenance_window()
        );

        let mut builder = Response::builder().detail("Printed deployment base info");
        println!(" + CHUNKS:");

        for chunk in dp.chunks() {
            println!("  part: {}", chunk.part);
            println!("  name: {} version: {}", chunk.name, chunk.version);

            let chunk_dir = self.download_dir.join(format!("{}@{}", chunk.version, chunk.name));
            tokio::fs::create_dir_all(&chunk_dir).await?;

            println!("  + ARTIFACTS:");
            for artifact in &chunk.artifacts {
                println!("   filename: {} size: {}", artifact.filename, artifact.size);
                println!("   md5: {}", artifact.hashes.md5);
                println!("   sha1: {}", artifact.hashes.sha1);
                println!("   sha256: {}", artifact.hashes.sha256);

                let Some(download) = dp.artifact_download(artifact) else {
                    builder = builder.detail(format!("{}: no download link available", artifact.filename));
                    continue;
                };

                let path = chunk_dir.join(&artifact.filename);
                print!("  .. downloading {}...", path.display());
                download.download_to(&path).await?;

                let bytes = tokio::fs::read(&path).await?;
                if artifact.hashes.verify(&bytes).all_match() {
                    println!("[OK]");
                    builder = builder.detail(format!("{}: downloaded and verified", artifact.filename));
                } else {
                    println!("[HASH MISMATCH]");
                    builder = builder.detail(format!("{}: hash mismatch after download", artifact.filename));
                    return Ok(builder
                        .execution(ddi_client::Execution::Closed)
                        .finished(ddi_client::Finished::Failure)
                        .ignore_sleep(true)
                        .delivery_listener(DeploymentFeedbackListener)
                        .build()?);
                }
            }
            println!(" + ---------------------------");
        }

        Ok(builder
            .detail("Work done. Sending response")
            .execution(ddi_client::Execution::Closed)
            .finished(ddi_client::Finished::Success)
            .ignore_sleep(true)
            .delivery_listener(DeploymentFeedbackListener)
            .build()?)
    }

    async fn on_cancel_action(&self, action: &CancelAction) -> Response {
        println!(">> cancelAction: id {}, stopId {}", action.id, action.stop_id());

        Response::builder()
            .execution(ddi_client::Execution::Closed)
            .finished(ddi_client::Finished::Success)
            .detail("Some feedback")
            .detail("One more feedback")
            .detail("Really important feedback")
            .ignore_sleep(true)
            .delivery_listener(CancelFeedbackListener)
            .build()
            .expect("execution and finished were set above")
    }

    async fn on_no_actions(&self) {
        println!("No actions from hawkBit");
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter("info,ddi_client=debug").init();

    let args = Args::parse();
    println!("hawkBit Rust client started...");

    let mut builder = ClientBuilder::new()
        .target(&args.endpoint, &args.controller_id, args.tenant.as_deref())
        .unwrap_or_else(|e| {
            eprintln!("invalid endpoint: {e}");
            std::process::exit(2);
        });

    if args.insecure {
        builder = builder.not_verify_server_certificate();
    }

    builder = match (args.gateway_token, args.device_token) {
        (Some(token), None) => builder.gateway_token(token).unwrap_or_else(auth_conflict),
        (None, Some(token)) => builder.device_token(token).unwrap_or_else(auth_conflict),
        (None, None) => builder,
        (Some(_), Some(_)) => {
            eprintln!("only one of --gateway-token / --device-token may be set");
            std::process::exit(2);
        }
    };

    let handler = Handler { download_dir: args.download_dir };

    let controller = builder
        .event_handler(handler)
        .auth_error_handler(NoRefreshAuthHandler)
        .build()
        .unwrap_or_else(|e| {
            eprintln!("failed to build client: {e}");
            std::process::exit(2);
        });

    controller.run().await;
}

fn auth_conflict(e: ddi_client::error::init::ConfigurationError) -> ClientBuilder {
    eprintln!("failed to configure auth: {e}");
    std::process::exit(2);
}
