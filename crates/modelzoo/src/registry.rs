//! Model registry: the single join point between locally supervised
//! backends and peer-federated snapshots.

use std::sync::Arc;

use modelzoo_types::{AvailableModel, Model, ZooHandle};
use tokio::sync::RwLock;

use crate::peers::{self, Peer};
use crate::supervisor::RunningModel;

/// A source of advertisable models, consumed only through this one
/// operation. Implementations live in the glue layer — the core never
/// scans a filesystem or calls a remote API itself.
pub trait ZooCatalog: Send + Sync {
    fn catalog(&self) -> Vec<Model>;
}

struct ZooEntry {
    handle: ZooHandle,
    catalog: Box<dyn ZooCatalog>,
}

/// Owns the live list of locally supervised backends plus the configured
/// zoo catalogs and peer list, and answers the registry's two queries
/// (available models, per-zoo catalog). The running list is the only
/// thing mutated after startup
/// (launch/stop); reads (every proxy request, every registry call) see a
/// consistent point-in-time snapshot via the `RwLock`.
pub struct ModelRegistry {
    running: RwLock<Vec<Arc<RunningModel>>>,
    zoos: RwLock<Vec<ZooEntry>>,
    peers: Vec<Peer>,
}

impl ModelRegistry {
    pub fn new(peers: Vec<Peer>) -> Self {
        Self {
            running: RwLock::new(Vec::new()),
            zoos: RwLock::new(Vec::new()),
            peers,
        }
    }

    pub async fn register_zoo(&self, name: impl Into<String>, catalog: Box<dyn ZooCatalog>) {
        self.zoos.write().await.push(ZooEntry {
            handle: ZooHandle::new(name),
            catalog,
        });
    }

    pub async fn add_running(&self, model: Arc<RunningModel>) {
        self.running.write().await.push(model);
    }

    /// Removes and returns the running model named `model_name`, if any.
    /// Does not stop it — callers are responsible for calling `stop()`.
    pub async fn remove_running(&self, model_name: &str) -> Option<Arc<RunningModel>> {
        let mut running = self.running.write().await;
        let index = running.iter().position(|r| r.model.model_name == model_name)?;
        Some(running.remove(index))
    }

    pub async fn running_snapshot(&self) -> Vec<Arc<RunningModel>> {
        self.running.read().await.clone()
    }

    /// Looks up a running model by name without removing it, for the
    /// admin `status`/`logs` endpoints.
    pub async fn get_running(&self, model_name: &str) -> Option<Arc<RunningModel>> {
        self.running
            .read()
            .await
            .iter()
            .find(|r| r.model.model_name == model_name)
            .cloned()
    }

    async fn local_models(&self) -> Vec<AvailableModel> {
        let running = self.running.read().await;
        let mut out = Vec::with_capacity(running.len());
        for model in running.iter() {
            let status = model.status().await;
            let mut listener = model.listener.clone();
            listener.host = "127.0.0.1".to_string();
            out.push(AvailableModel {
                model_name: model.model.model_name.clone(),
                model_id: model.model.model_id.clone(),
                status,
                listener,
                source: "local".to_string(),
                environment: Some(model.environment_name.clone()),
            });
        }
        out
    }

    /// The single join point: local contributions (host rewritten to
    /// `127.0.0.1`) plus peer-federated snapshots, recomputed fresh on
    /// every call. Duplicates are preserved — the proxy resolves them by
    /// least-connections, not the registry.
    pub async fn get_available_models(&self, local: bool, remote: bool) -> Vec<AvailableModel> {
        let mut out = Vec::new();
        if local {
            out.extend(self.local_models().await);
        }
        if remote && !self.peers.is_empty() {
            let snapshots = peers::fan_out(&self.peers).await;
            out.extend(snapshots.into_iter().flat_map(|s| s.models));
        }
        out
    }

    /// Enumerates advertisable (not necessarily running) models from one
    /// zoo's catalog, for the dashboard only. Disabled zoos contribute
    /// nothing.
    pub async fn get_catalog(&self, zoo_name: &str) -> Vec<Model> {
        self.zoos
            .read()
            .await
            .iter()
            .find(|entry| entry.handle.name == zoo_name && entry.handle.enabled)
            .map(|entry| entry.catalog.catalog())
            .unwrap_or_default()
    }

    pub async fn toggle_zoo(&self, zoo_name: &str) -> bool {
        let mut zoos = self.zoos.write().await;
        if let Some(entry) = zoos.iter_mut().find(|e| e.handle.name == zoo_name) {
            entry.handle.toggle();
            entry.handle.enabled
        } else {
            false
        }
    }
}
