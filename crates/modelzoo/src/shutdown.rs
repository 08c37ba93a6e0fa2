//! Graceful shutdown: on `SIGINT`/`SIGTERM`, fire a fire-and-forget
//! `SIGTERM` at every running backend's process group and let
//! `axum::serve` drain in-flight requests before exiting.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

use crate::registry::ModelRegistry;

/// Resolves once `SIGINT` or `SIGTERM` is received, then stops every
/// locally running model with `no_wait = true`: fire SIGTERM to the group
/// and move on, never wait for the 5-second grace period during a
/// control-plane shutdown. Pass the resulting future to
/// `axum::serve(..).with_graceful_shutdown(..)`.
pub async fn wait_and_stop_all(registry: Arc<ModelRegistry>) {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    let running = registry.running_snapshot().await;
    info!(count = running.len(), "stopping running models");
    for model in running {
        model.stop(true).await;
        registry.remove_running(&model.model.model_name).await;
    }
}
