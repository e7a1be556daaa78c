//! Client implementation of the Eclipse hawkBit Direct Device Integration
//! (DDI) API: a polling controller embedded devices run to discover and act
//! on server-initiated configuration pushes, cancellations, and deployments.
//!
//! The entry point is [`ClientBuilder`], which assembles a [`Controller`]
//! whose [`Controller::run`] drives the polling loop forever. Callers
//! implement [`EventHandler`] to react to dispatched actions and,
//! optionally, [`AuthErrorHandler`] to recover from credential expiry and
//! [`ResponseDeliveryListener`] to observe feedback delivery. `Controller`
//! also implements `meltdown::Service`, for embedders that want the loop
//! registered on a shared graceful-shutdown runtime alongside other
//! long-running tasks instead of calling `run` directly.

pub mod auth;
pub mod config;
mod controller;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod model;
mod types;

pub use auth::AuthStrategy;
pub use config::RetryConfig;
pub use controller::{ClientBuilder, Controller};
pub use dispatcher::download::ArtifactDownload;
pub use handler::{
    AuthErrorAction, AuthErrorHandler, EventHandler, ResponseDeliveryListener, TokenRotator,
};
pub use model::{
    cancel::CancelAction,
    deployment::{
        ActionType, Artifact, Chunk, DeploymentBase, HashVerification, Hashes, MaintenanceWindow,
    },
    response::{ConfigResponse, Execution, Finished, Response},
};
pub use types::secret::Secret;
