//! Integration-level coverage of the routing algorithm end-to-end: a real
//! axum server, a real (loopback) HTTP client, and wiremock standing in
//! for backend inference servers.
//!
//! Backends are injected through the peer fan-out path rather than the
//! supervisor: a `wiremock::MockServer` plays both "peer" (answers
//! `/api/running_models`) and "backend" (answers the forwarded request) at
//! once, since the proxy's routing algorithm treats every candidate
//! uniformly regardless of whether the registry learned about it locally
//! or from a peer.

use std::net::SocketAddr;
use std::sync::Arc;

use modelzoo::peers::Peer;
use modelzoo::proxy::{router, AppState, ConnectionCounter};
use modelzoo::registry::ModelRegistry;
use modelzoo::supervisor::RunningModel;
use modelzoo_types::{Listener, Model, ModelFormat};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Starts the proxy router against a fresh in-memory registry configured
/// with `peers`, bound to an ephemeral loopback port. Returns the base URL
/// the test client should call.
async fn spawn_server(peers: Vec<Peer>) -> String {
    let registry = Arc::new(ModelRegistry::new(peers));
    let state = AppState {
        registry,
        connections: ConnectionCounter::new(),
        http_client: reqwest::Client::new(),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn running_models_body(model_name: &str, protocol: &str, host: &str, port: u16) -> Value {
    json!({
        "running_models": [{
            "model_name": model_name,
            "model_id": format!("{model_name}-id"),
            "status": {"running": true, "ready": true},
            "listener": {"protocol": protocol, "host": host, "port": port},
            "source": "local",
            "environment": null,
        }]
    })
}

fn peer_from_mock_server(server: &MockServer) -> Peer {
    let addr = server.uri();
    let stripped = addr.trim_start_matches("http://");
    let (host, port) = stripped.split_once(':').unwrap();
    Peer {
        host: host.to_string(),
        port: port.parse().unwrap(),
    }
}

#[tokio::test]
async fn s5_unknown_model_returns_404_with_exact_message() {
    let base = spawn_server(vec![]).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/v1/completions"))
        .json(&json!({"model": "ghost"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Model ghost not found or not running");
}

#[tokio::test]
async fn missing_model_field_is_a_bad_request() {
    let base = spawn_server(vec![]).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/v1/completions"))
        .json(&json!({"prompt": "hi"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Model not specified in the request");
}

#[tokio::test]
async fn image_endpoint_without_prompt_is_a_bad_request() {
    let server = MockServer::start().await;
    let peer = peer_from_mock_server(&server);
    Mock::given(method("GET"))
        .and(path("/api/running_models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(running_models_body(
            "sd", "a1111", &peer.host, peer.port,
        )))
        .mount(&server)
        .await;

    let base = spawn_server(vec![peer]).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/sdapi/v1/txt2img"))
        .json(&json!({"model": "sd"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn s6_health_is_unavailable_with_no_local_models() {
    let base = spawn_server(vec![]).await;
    let client = reqwest::Client::new();
    let resp = client.get(format!("{base}/health")).send().await.unwrap();
    assert_ne!(resp.status(), 200);
}

#[tokio::test]
async fn peer_only_model_does_not_count_toward_health() {
    // /health only counts *local* running models; a model visible only
    // via peer fan-out must not flip it to healthy.
    let server = MockServer::start().await;
    let peer = peer_from_mock_server(&server);
    Mock::given(method("GET"))
        .and(path("/api/running_models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(running_models_body(
            "foo", "openai", &peer.host, peer.port,
        )))
        .mount(&server)
        .await;

    let base = spawn_server(vec![peer]).await;
    let client = reqwest::Client::new();
    let resp = client.get(format!("{base}/health")).send().await.unwrap();
    assert_ne!(resp.status(), 200);
}

#[tokio::test]
async fn s3_dalle_request_adapter_strips_and_renames_fields_end_to_end() {
    let server = MockServer::start().await;
    let peer = peer_from_mock_server(&server);
    Mock::given(method("GET"))
        .and(path("/api/running_models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(running_models_body(
            "flux", "dall-e", &peer.host, peer.port,
        )))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(body_json(json!({
            "prompt": "cat",
            "response_format": "b64_json",
            "quality": "hd",
            "size": "512x512",
            // the proxy applies the protocol's `image_sampler_map` to
            // `sampler_name` before handing off to the request adapter, so
            // the DALL-E-facing `style` carries the mapped value.
            "style": "natural",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"b64_json": "aGVsbG8="}]
        })))
        .mount(&server)
        .await;

    let base = spawn_server(vec![peer]).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/v1/images/generations"))
        .json(&json!({
            "model": "flux",
            "prompt": "cat",
            "sampler_name": "Euler",
            "width": 512,
            "height": 512,
            "steps": 4,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["images"], json!(["aGVsbG8="]));
}

#[tokio::test]
async fn s4_sd_server_txt2img_renames_and_polls_until_done() {
    let server = MockServer::start().await;
    let peer = peer_from_mock_server(&server);
    Mock::given(method("GET"))
        .and(path("/api/running_models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(running_models_body(
            "sd", "sd-server", &peer.host, peer.port,
        )))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/txt2img"))
        .and(body_json(json!({"prompt": "p", "sample_method": "euler", "sample_steps": 8})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "abc"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Done",
            "data": [{"data": "imgbytes"}],
        })))
        .mount(&server)
        .await;

    let base = spawn_server(vec![peer]).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/sdapi/v1/txt2img"))
        .json(&json!({"model": "sd", "prompt": "p", "sampler_name": "Euler", "steps": 8}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["images"], json!(["imgbytes"]));
}

#[tokio::test]
async fn s2_least_connections_spreads_concurrent_requests_across_two_instances() {
    let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;
    let peer_a = peer_from_mock_server(&server_a);
    let peer_b = peer_from_mock_server(&server_b);

    for (server, peer) in [(&server_a, &peer_a), (&server_b, &peer_b)] {
        Mock::given(method("GET"))
            .and(path("/api/running_models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(running_models_body(
                "foo", "openai", &peer.host, peer.port,
            )))
            .mount(server)
            .await;
        // A small delay means all three requests are in flight
        // concurrently, so the counter must actually distinguish them
        // rather than serializing through one instance.
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})).set_delay(
                std::time::Duration::from_millis(150),
            ))
            .mount(server)
            .await;
    }

    let base = spawn_server(vec![peer_a, peer_b]).await;
    let client = reqwest::Client::new();

    let requests = (0..3).map(|_| {
        let client = client.clone();
        let base = base.clone();
        tokio::spawn(async move {
            client
                .post(format!("{base}/v1/completions"))
                .json(&json!({"model": "foo"}))
                .send()
                .await
                .unwrap()
                .status()
        })
    });

    let statuses = futures::future::join_all(requests).await;
    for status in statuses {
        assert_eq!(status.unwrap(), 200);
    }

    // Both mock backends must have received at least one request: three
    // requests split over two least-loaded candidates can never collapse
    // onto a single instance.
    assert!(!server_a.received_requests().await.unwrap().is_empty());
    assert!(!server_b.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn s5_property_local_model_wins_over_remote_model_with_the_same_name() {
    // get_available_models merges local + remote; /v1/models dedups with
    // locals winning. A real `RunningModel` (no
    // backend behind it - /v1/models only cares whether it's in the
    // running list, not whether it's ready) stands in for "local", and a
    // peer advertises the same model_name.
    let server = MockServer::start().await;
    let peer = peer_from_mock_server(&server);
    Mock::given(method("GET"))
        .and(path("/api/running_models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(running_models_body(
            "shared", "openai", &peer.host, peer.port,
        )))
        .mount(&server)
        .await;

    let registry = Arc::new(ModelRegistry::new(vec![peer]));
    let local_model = Model {
        zoo_name: "z".into(),
        model_id: "/models/shared.gguf".into(),
        model_format: ModelFormat::Gguf,
        model_name: "shared".into(),
        model_size: None,
        api_url: None,
        api_key: None,
    };
    let running = RunningModel::spawn(
        "llama.cpp".into(),
        local_model,
        Listener::new("openai", "0.0.0.0", 50123),
        "empty".into(),
        Default::default(),
        Default::default(),
        vec!["sleep".into(), "30".into()],
        None,
    )
    .await
    .unwrap();
    let running = Arc::new(running);
    registry.add_running(running.clone()).await;

    let state = AppState {
        registry,
        connections: ConnectionCounter::new(),
        http_client: reqwest::Client::new(),
    };
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/v1/models"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"], "shared");
    assert_eq!(entries[0]["owned_by"], "modelzoo");

    running.stop(true).await;
}
