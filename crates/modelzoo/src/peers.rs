//! Peer fan-out: federates `GET /api/running_models` from configured peer
//! nodes, tolerating per-peer failure.

use futures::future::join_all;
use modelzoo_types::{AvailableModel, PeerSnapshot, RunningModelsResponse};
use tracing::{debug, warn};

const PEER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// One configured peer control plane.
#[derive(Debug, Clone)]
pub struct Peer {
    pub host: String,
    pub port: u16,
}

/// Fetches every peer concurrently; one slow or failing peer never delays
/// the others past its own 5-second timeout.
pub async fn fan_out(peers: &[Peer]) -> Vec<PeerSnapshot> {
    let client = reqwest::Client::new();
    join_all(peers.iter().map(|peer| fetch_one(&client, peer))).await
}

async fn fetch_one(client: &reqwest::Client, peer: &Peer) -> PeerSnapshot {
    let url = format!("http://{}:{}/api/running_models", peer.host, peer.port);

    let result = async {
        let resp = client
            .get(&url)
            .timeout(PEER_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        resp.json::<RunningModelsResponse>().await
    }
    .await;

    match result {
        Ok(body) => {
            debug!(host = %peer.host, port = peer.port, count = body.running_models.len(), "peer fan-out ok");
            let models = body
                .running_models
                .into_iter()
                .map(|mut m| {
                    m.listener.host = peer.host.clone();
                    m.source = format!("remote:{}", peer.host);
                    m
                })
                .collect::<Vec<AvailableModel>>();
            PeerSnapshot {
                host: peer.host.clone(),
                port: peer.port,
                models,
                error: None,
            }
        }
        Err(e) => {
            warn!(host = %peer.host, port = peer.port, error = %e, "peer fan-out failed");
            PeerSnapshot {
                host: peer.host.clone(),
                port: peer.port,
                models: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn successful_peer_contributes_rewritten_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/running_models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "running_models": [{
                    "model_name": "foo",
                    "model_id": "foo-id",
                    "status": {"running": true, "ready": true},
                    "listener": {"protocol": "openai", "host": "0.0.0.0", "port": 9000},
                    "source": "local",
                    "environment": null,
                }]
            })))
            .mount(&server)
            .await;

        let uri = server.uri();
        let addr = uri.trim_start_matches("http://");
        let (host, port) = addr.split_once(':').unwrap();
        let peers = vec![Peer {
            host: host.to_string(),
            port: port.parse().unwrap(),
        }];

        let snapshots = fan_out(&peers).await;
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].error.is_none());
        assert_eq!(snapshots[0].models[0].listener.host, host);
        assert_eq!(snapshots[0].models[0].source, format!("remote:{host}"));
    }

    #[tokio::test]
    async fn one_failing_peer_does_not_affect_isolation() {
        let peers = vec![Peer {
            host: "127.0.0.1".to_string(),
            port: 1, // nothing listens here
        }];
        let snapshots = fan_out(&peers).await;
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].error.is_some());
        assert!(snapshots[0].models.is_empty());
    }
}
