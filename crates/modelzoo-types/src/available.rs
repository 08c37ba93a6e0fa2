use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::listener::Listener;

/// Running/ready status of a model instance, as returned by
/// `RunningModel::status()` and embedded in [`AvailableModel`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelStatus {
    pub running: bool,
    pub ready: bool,
}

/// A unified registry entry: the shape the model registry hands to the
/// proxy and to peers, whether the instance is local or federated from a
/// peer node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableModel {
    pub model_name: String,
    pub model_id: String,
    pub status: ModelStatus,
    pub listener: Listener,
    /// `"local"` or `"remote:<host>"`.
    pub source: String,
    pub environment: Option<String>,
}

impl AvailableModel {
    pub fn is_local(&self) -> bool {
        self.source == "local"
    }
}

/// The wire shape of `GET /api/running_models`, both produced and consumed
/// by the core (local federation endpoint + peer fan-out client).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunningModelsResponse {
    pub running_models: Vec<AvailableModel>,
}

/// One peer's contribution to a fan-out round. Lifetime is exactly one
/// `get_available_models` call; the core never caches this across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSnapshot {
    pub host: String,
    pub port: u16,
    pub models: Vec<AvailableModel>,
    pub error: Option<String>,
}

/// Launch-history record for one `(zoo, model_name)` pair. The file this
/// serializes to/from is owned by the glue layer, but the shape itself is
/// load-bearing for the core's sort-by-recency helper, so it lives here
/// rather than behind an opaque blob type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelLaunchInfo {
    pub launch_count: u64,
    pub last_launch: Option<chrono::DateTime<chrono::Utc>>,
    pub last_runtime: Option<String>,
    /// Always a list on write; legacy single-string values are coerced to a
    /// one-element list on read (see `modelzoo::history`).
    pub last_environment: Vec<String>,
    pub last_params: BTreeMap<String, serde_json::Value>,
}

impl Default for ModelLaunchInfo {
    fn default() -> Self {
        Self {
            launch_count: 0,
            last_launch: None,
            last_runtime: None,
            last_environment: Vec::new(),
            last_params: BTreeMap::new(),
        }
    }
}
