//! Public HTTP surface and the routing algorithm that backs every
//! `/v1/*` and `/sdapi/v1/*` endpoint.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::Stream;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::error::{ModelZooError, Result};
use crate::protocol::{self, EndpointClass};
use crate::proxy::connections::{ConnectionCounter, ConnectionGuard};
use crate::registry::ModelRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub connections: Arc<ConnectionCounter>,
    pub http_client: reqwest::Client,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/models", get(list_text_models))
        .route("/v1/completions", post(completions))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/images/generations", post(images_generations))
        .route("/sdapi/v1/sd-models", get(list_image_models))
        .route("/sdapi/v1/txt2img", post(txt2img))
        .route("/sdapi/v1/img2img", post(img2img))
        .route("/health", get(health))
        .route("/.well-known/serviceinfo", get(serviceinfo))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn list_text_models(State(state): State<AppState>) -> Result<Json<Value>> {
    let models = state.registry.get_available_models(true, true).await;
    let mut seen = std::collections::HashSet::new();
    let mut entries = Vec::new();

    // Locals first so dedup-by-name keeps the local entry over a remote duplicate.
    let mut ordered = models;
    ordered.sort_by_key(|m| !m.is_local());

    for model in ordered {
        let Some(def) = protocol::get(&model.listener.protocol) else {
            continue;
        };
        let has_text = def.endpoint(EndpointClass::Completions).path.is_some()
            || def.endpoint(EndpointClass::ChatCompletions).path.is_some();
        if !has_text || !seen.insert(model.model_name.clone()) {
            continue;
        }
        let owned_by = if model.is_local() {
            "modelzoo".to_string()
        } else {
            model.source.clone()
        };
        entries.push(json!({ "id": model.model_name, "owned_by": owned_by }));
    }

    Ok(Json(json!({ "object": "list", "data": entries })))
}

async fn list_image_models(State(state): State<AppState>) -> Result<Json<Value>> {
    let models = state.registry.get_available_models(true, true).await;
    let mut seen = std::collections::HashSet::new();
    let mut ordered = models;
    ordered.sort_by_key(|m| !m.is_local());

    let mut entries = Vec::new();
    for model in ordered {
        let Some(def) = protocol::get(&model.listener.protocol) else {
            continue;
        };
        let has_image = def.endpoint(EndpointClass::Txt2Img).path.is_some()
            || def.endpoint(EndpointClass::Img2Img).path.is_some();
        if !has_image || !seen.insert(model.model_name.clone()) {
            continue;
        }
        entries.push(json!({
            "title": model.model_name,
            "model_name": model.model_name,
            "hash": "0000000000",
            "sha256": "0".repeat(64),
            "filename": model.model_id,
            "config": Value::Null,
        }));
    }

    Ok(Json(entries.into()))
}

async fn health(State(state): State<AppState>) -> StatusCode {
    let models = state.registry.get_available_models(true, false).await;
    if models.iter().any(|m| m.is_local()) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn serviceinfo() -> Json<Value> {
    Json(json!({
        "version": 1,
        "software": {
            "name": "modelzoo",
            "version": env!("CARGO_PKG_VERSION"),
            "repository": "https://github.com/example/modelzoo",
            "homepage": "https://github.com/example/modelzoo",
        },
        "api": {
            "openai": {
                "name": "ModelZoo",
                "rel_url": "/v1",
                "documentation": "https://github.com/example/modelzoo",
                "version": env!("CARGO_PKG_VERSION"),
            }
        }
    }))
}

async fn completions(state: State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response> {
    forward(state, EndpointClass::Completions, false, headers, body).await
}

async fn chat_completions(state: State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response> {
    forward(state, EndpointClass::ChatCompletions, false, headers, body).await
}

async fn images_generations(state: State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response> {
    forward(state, EndpointClass::Txt2Img, true, headers, body).await
}

async fn txt2img(state: State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response> {
    forward(state, EndpointClass::Txt2Img, true, headers, body).await
}

async fn img2img(state: State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response> {
    forward(state, EndpointClass::Img2Img, true, headers, body).await
}

struct Candidate {
    target_url: String,
    protocol: String,
    model_id: String,
}

/// The routing algorithm: parse, match candidates, pick the least-loaded
/// one, adapt the payload, forward, adapt the response back.
async fn forward(
    State(state): State<AppState>,
    class: EndpointClass,
    require_prompt: bool,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    // Step 1: parse body, extract model.
    let mut payload: Value = serde_json::from_slice(&body)
        .map_err(|_| ModelZooError::BadRequest("request body is not valid JSON".to_string()))?;

    let model_name = payload
        .get("model")
        .and_then(Value::as_str)
        .ok_or_else(|| ModelZooError::BadRequest("Model not specified in the request".to_string()))?
        .to_string();

    // Step 2: image endpoints require `prompt`.
    if require_prompt && payload.get("prompt").and_then(Value::as_str).is_none() {
        return Err(ModelZooError::BadRequest("prompt is required".to_string()));
    }

    // Step 3: candidate matching.
    let available = state.registry.get_available_models(true, true).await;
    let candidates: Vec<Candidate> = available
        .iter()
        .filter(|m| m.model_name == model_name)
        .filter_map(|m| {
            let def = protocol::get(&m.listener.protocol)?;
            let path = def.endpoint(class).path?;
            Some(Candidate {
                target_url: format!("{}{}", m.listener.base_url(), path),
                protocol: m.listener.protocol.clone(),
                model_id: m.model_id.clone(),
            })
        })
        .collect();

    // Step 4: empty candidate set -> 404.
    if candidates.is_empty() {
        return Err(ModelZooError::NotFound(format!(
            "Model {model_name} not found or not running"
        )));
    }

    // Step 5: least-connections selection.
    let urls: Vec<String> = candidates.iter().map(|c| c.target_url.clone()).collect();
    let (chosen_url, guard) = state
        .connections
        .acquire_least_loaded(&urls)
        .expect("candidates is non-empty");
    let candidate = candidates
        .iter()
        .find(|c| c.target_url == chosen_url)
        .expect("acquire_least_loaded only returns urls we gave it");
    let def = protocol::get(&candidate.protocol).expect("protocol validated during candidate matching");
    let endpoint = def.endpoint(class);

    info!(method = "POST", target_url = %chosen_url, protocol = %candidate.protocol, "routing proxied request");

    // Step 6: mutate a copy of the payload.
    if let Some(obj) = payload.as_object_mut() {
        if let Some(sampler) = obj.get("sampler_name").and_then(Value::as_str).map(str::to_string) {
            obj.insert("sampler_name".to_string(), json!(def.map_sampler(&sampler)));
        }
        obj.insert("model".to_string(), json!(candidate.model_id));
    }
    if let Some(adapter) = endpoint.request_adapter {
        payload = adapter(payload, &chosen_url);
    }

    let is_stream = payload.get("stream").and_then(Value::as_bool).unwrap_or(false);

    let mut outbound_headers = headers;
    outbound_headers.remove(axum::http::header::HOST);

    // Step 7: forward.
    let resp = state
        .http_client
        .post(&chosen_url)
        .headers(outbound_headers)
        .json(&payload)
        .send()
        .await
        .map_err(|e| {
            error!(target_url = %chosen_url, error = %e, "proxied request transport failure");
            ModelZooError::Transport(e.to_string())
        })?;

    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

    if is_stream {
        let content_type = resp
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .cloned();
        let stream = GuardedStream {
            inner: resp.bytes_stream(),
            _guard: guard,
        };
        let mut builder = Response::builder().status(status);
        if let Some(ct) = content_type {
            builder = builder.header(axum::http::header::CONTENT_TYPE, ct);
        }
        return builder
            .body(Body::from_stream(stream))
            .map_err(|e| ModelZooError::Internal(e.into()));
    }

    // Buffer the full body; step 8 (response adaptation) and step 9 (counter
    // release) both happen before this function returns.
    let content_type = resp
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let result = async {
        if content_type.contains("application/json") {
            let body: Value = resp.json().await.map_err(|e| ModelZooError::Transport(e.to_string()))?;
            let body = if let Some(response_adapter) = endpoint.response_adapter {
                response_adapter(body, &chosen_url, &state.http_client).await?
            } else {
                body
            };
            Ok((status, Json(body)).into_response())
        } else {
            let bytes = resp.bytes().await.map_err(|e| ModelZooError::Transport(e.to_string()))?;
            Ok((status, bytes).into_response())
        }
    }
    .await;

    // Step 9: release, regardless of outcome.
    drop(guard);
    result
}

/// Carries the connection-count guard alongside the streamed response body
/// so the decrement (step 9) fires whenever the stream is dropped —
/// completion, upstream close, or the client disconnecting mid-transfer.
struct GuardedStream<S> {
    inner: S,
    _guard: ConnectionGuard,
}

impl<S> Stream for GuardedStream<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}
