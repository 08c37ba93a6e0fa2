//! Administrative API: the launch/stop/status/logs/running-models routes
//! `serve` mounts alongside the proxy, plus a thin reqwest client over the
//! same surface used by the `launch`/`stop`/`list`/`logs` CLI subcommands.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use modelzoo_types::{Environment, EnvironmentSet, Listener, ParamList, RunningModelsResponse};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::drivers::Driver;
use crate::error::{ModelZooError, Result};
use crate::history::{find_free_port, LaunchHistory};
use crate::registry::ModelRegistry;
use crate::supervisor::RunningModel;

/// Shared state for the admin surface, assembled once at `serve` startup
/// from the loaded [`crate::config::Config`].
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<ModelRegistry>,
    pub history: Arc<LaunchHistory>,
    pub runtimes: Arc<BTreeMap<String, Box<dyn Driver>>>,
    pub environments: Arc<BTreeMap<String, Environment>>,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/api/zoo/:name/toggle", post(toggle_zoo))
        .route("/api/model/launch", post(launch_model))
        .route("/api/model/:name/stop", post(stop_model))
        .route("/api/model/:name/status", get(model_status))
        .route("/api/model/:name/logs", get(model_logs))
        .route("/api/running_models", get(running_models))
        .with_state(state)
}

async fn toggle_zoo(State(state): State<AdminState>, Path(name): Path<String>) -> Result<Json<Value>> {
    let enabled = state.registry.toggle_zoo(&name).await;
    Ok(Json(json!({ "success": true, "enabled": enabled })))
}

#[derive(Debug, Deserialize)]
struct LaunchRequest {
    zoo_name: String,
    model_id: String,
    runtime: String,
    /// Named [`Environment`]s to compose, in order.
    #[serde(default)]
    environment: Vec<String>,
    /// Explicit bind port; a free one in `50000..60000` is picked if omitted.
    port: Option<u16>,
    /// Operator-supplied display name overriding the catalog's `model_name`
    /// for this launch.
    custom_name: Option<String>,
    #[serde(default)]
    params: ParamList,
}

#[derive(Debug, Serialize)]
struct LaunchResponse {
    success: bool,
    model_name: String,
    listener: Listener,
}

async fn launch_model(
    State(state): State<AdminState>,
    Json(req): Json<LaunchRequest>,
) -> Result<Json<LaunchResponse>> {
    let catalog = state.registry.get_catalog(&req.zoo_name).await;
    let model = catalog
        .into_iter()
        .find(|m| m.model_id == req.model_id)
        .ok_or_else(|| ModelZooError::NotFound(format!("model {} not found in zoo {}", req.model_id, req.zoo_name)))?;
    let model = match &req.custom_name {
        Some(alias) => model.with_alias(alias.clone()),
        None => model,
    };

    let driver = state
        .runtimes
        .get(&req.runtime)
        .ok_or_else(|| ModelZooError::BadRequest(format!("unknown runtime: {}", req.runtime)))?;

    let mut environment_set = EnvironmentSet::empty();
    for name in &req.environment {
        let env = state
            .environments
            .get(name)
            .ok_or_else(|| ModelZooError::BadRequest(format!("unknown environment: {name}")))?;
        environment_set.add(env.clone());
    }

    let port = match req.port {
        Some(p) => p,
        None => find_free_port().map_err(ModelZooError::Internal)?,
    };
    let placeholder_listener = Listener::new("http", "0.0.0.0", port);

    let plan = driver
        .build(placeholder_listener, model.clone(), &req.params)
        .map_err(ModelZooError::Internal)?;

    let running = RunningModel::spawn(
        req.runtime.clone(),
        plan.model,
        plan.listener.clone(),
        environment_set.combined_name(),
        environment_set.combined_vars(),
        plan.extra_environment,
        plan.argv,
        plan.working_directory,
    )
    .await
    .map_err(ModelZooError::Internal)?;

    let model_name = running.model.model_name.clone();
    let listener = running.listener.clone();
    state.registry.add_running(Arc::new(running)).await;

    state
        .history
        .update_model_launch(&req.zoo_name, &model_name, &req.runtime, req.environment, &req.params)
        .await
        .map_err(ModelZooError::Internal)?;

    info!(model = %model_name, runtime = %req.runtime, %listener, "launched model");

    Ok(Json(LaunchResponse {
        success: true,
        model_name,
        listener,
    }))
}

async fn stop_model(State(state): State<AdminState>, Path(name): Path<String>) -> Result<Json<Value>> {
    match state.registry.remove_running(&name).await {
        Some(model) => {
            model.stop(false).await;
            Ok(Json(json!({ "success": true })))
        }
        None => Err(ModelZooError::NotFound(format!("model {name} not found"))),
    }
}

async fn model_status(State(state): State<AdminState>, Path(name): Path<String>) -> Result<Response> {
    match state.registry.get_running(&name).await {
        Some(model) => Ok(Json(model.status().await).into_response()),
        None => Err(ModelZooError::NotFound(format!("model {name} not found"))),
    }
}

async fn model_logs(State(state): State<AdminState>, Path(name): Path<String>) -> Result<Json<Vec<String>>> {
    match state.registry.get_running(&name).await {
        Some(model) => Ok(Json(model.logs())),
        None => Err(ModelZooError::NotFound(format!("model {name} not found"))),
    }
}

/// `GET /api/running_models`: the shape this core both produces
/// (here) and consumes ([`crate::peers::fan_out`]).
async fn running_models(State(state): State<AdminState>) -> Json<RunningModelsResponse> {
    let running_models = state.registry.get_available_models(true, false).await;
    Json(RunningModelsResponse { running_models })
}

/// Thin HTTP client over the admin surface above, used by the `launch`,
/// `stop`, `list`, and `logs` CLI subcommands to talk to an already-running
/// `serve` process rather than touching the registry directly.
pub struct AdminClient {
    base_url: String,
    client: reqwest::Client,
}

impl AdminClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn launch(
        &self,
        zoo_name: &str,
        model_id: &str,
        runtime: &str,
        environment: Vec<String>,
        port: Option<u16>,
        custom_name: Option<String>,
        params: ParamList,
    ) -> anyhow::Result<Value> {
        let body = json!({
            "zoo_name": zoo_name,
            "model_id": model_id,
            "runtime": runtime,
            "environment": environment,
            "port": port,
            "custom_name": custom_name,
            "params": params,
        });
        let resp = self
            .client
            .post(format!("{}/api/model/launch", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    pub async fn stop(&self, model_name: &str) -> anyhow::Result<()> {
        self.client
            .post(format!("{}/api/model/{model_name}/stop", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn list(&self) -> anyhow::Result<RunningModelsResponse> {
        let resp = self
            .client
            .get(format!("{}/api/running_models", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    pub async fn logs(&self, model_name: &str) -> anyhow::Result<Vec<String>> {
        let resp = self
            .client
            .get(format!("{}/api/model/{model_name}/logs", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}
