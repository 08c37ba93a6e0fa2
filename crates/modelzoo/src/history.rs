//! Launch history: a JSON-file-backed record of `(zoo, model) -> launch
//! stats`, used by the dashboard glue layer to order its catalog by
//! recency. The persistence format itself is owned by the glue layer, but
//! this crate speaks its exact on-disk shape so the two stay compatible.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use modelzoo_types::{Model, ModelLaunchInfo, ParamList};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;

fn history_key(zoo_name: &str, model_name: &str) -> String {
    format!("{zoo_name}:{model_name}")
}

/// Coerces a legacy single-string `last_environment` to a one-element list
/// before the record is deserialized into [`ModelLaunchInfo`], whose typed
/// field is always a `Vec<String>`.
fn normalize_legacy_environment(record: &mut Value) {
    let Some(obj) = record.as_object_mut() else {
        return;
    };
    if let Some(env) = obj.get("last_environment") {
        if let Some(s) = env.as_str() {
            obj.insert("last_environment".to_string(), Value::Array(vec![Value::String(s.to_string())]));
        } else if env.is_null() {
            obj.insert("last_environment".to_string(), Value::Array(Vec::new()));
        }
    } else {
        obj.insert("last_environment".to_string(), Value::Array(Vec::new()));
    }
}

/// A JSON-file-backed store of per-model launch history, keyed by
/// `"<zoo>:<model_name>"`.
pub struct LaunchHistory {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, ModelLaunchInfo>>,
}

impl LaunchHistory {
    /// Loads `path` if it exists; a missing file starts empty, matching
    /// the original's `FileNotFoundError -> pass`.
    pub async fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => parse_history(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub async fn update_model_launch(
        &self,
        zoo_name: &str,
        model_name: &str,
        runtime: &str,
        environment_names: Vec<String>,
        params: &ParamList,
    ) -> anyhow::Result<()> {
        let key = history_key(zoo_name, model_name);
        let params: BTreeMap<String, Value> = params
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(Value::Null)))
            .collect();

        {
            let mut entries = self.entries.write().await;
            let entry = entries.entry(key).or_default();
            entry.launch_count += 1;
            entry.last_launch = Some(Utc::now());
            entry.last_runtime = Some(runtime.to_string());
            entry.last_environment = environment_names;
            entry.last_params = params;
        }

        self.save().await
    }

    pub async fn get(&self, zoo_name: &str, model_name: &str) -> ModelLaunchInfo {
        self.entries
            .read()
            .await
            .get(&history_key(zoo_name, model_name))
            .cloned()
            .unwrap_or_default()
    }

    async fn save(&self) -> anyhow::Result<()> {
        let entries = self.entries.read().await;
        let serialized = serde_json::to_string_pretty(&*entries)?;
        drop(entries);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, serialized).await?;
        Ok(())
    }
}

/// Sorts `models` by `(launch_count, last_launch)` descending, most
/// recently/frequently launched first. Used only by the dashboard glue
/// layer's `get_catalog`, never by the proxy's routing algorithm.
pub async fn get_sorted_models(history: &LaunchHistory, models: Vec<Model>) -> Vec<Model> {
    let mut with_info = Vec::with_capacity(models.len());
    for model in models {
        let info = history.get(&model.zoo_name, &model.model_name).await;
        with_info.push((model, info));
    }
    with_info.sort_by(|(_, a), (_, b)| {
        b.launch_count
            .cmp(&a.launch_count)
            .then_with(|| b.last_launch.cmp(&a.last_launch))
    });
    with_info.into_iter().map(|(m, _)| m).collect()
}

fn parse_history(contents: &str) -> anyhow::Result<BTreeMap<String, ModelLaunchInfo>> {
    let raw: BTreeMap<String, Value> = serde_json::from_str(contents)?;
    let mut out = BTreeMap::new();
    for (key, mut record) in raw {
        normalize_legacy_environment(&mut record);
        match serde_json::from_value::<ModelLaunchInfo>(record) {
            Ok(info) => {
                out.insert(key, info);
            }
            Err(e) => warn!(key = %key, error = %e, "skipping unreadable launch history entry"),
        }
    }
    Ok(out)
}

/// Picks a free port in `50000..60000` by bind-and-release probing on
/// `127.0.0.1`.
pub fn find_free_port() -> anyhow::Result<u16> {
    use rand::Rng;
    use std::net::TcpListener;
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let port = rng.gen_range(50000..60000);
        if TcpListener::bind(("127.0.0.1", port)).is_ok() {
            return Ok(port);
        }
    }
    anyhow::bail!("no free port found in 50000..60000 after 20 attempts")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_string_environment_becomes_one_element_list() {
        let mut record = serde_json::json!({
            "launch_count": 3,
            "last_launch": null,
            "last_runtime": "llama.cpp",
            "last_environment": "gpu0",
            "last_params": {}
        });
        normalize_legacy_environment(&mut record);
        let info: ModelLaunchInfo = serde_json::from_value(record).unwrap();
        assert_eq!(info.last_environment, vec!["gpu0".to_string()]);
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let history = LaunchHistory::load("/tmp/modelzoo-history-does-not-exist.json")
            .await
            .unwrap();
        let info = history.get("zoo", "model").await;
        assert_eq!(info.launch_count, 0);
    }

    #[tokio::test]
    async fn update_then_get_round_trips() {
        let path = std::env::temp_dir().join(format!("modelzoo-history-test-{}.json", std::process::id()));
        let history = LaunchHistory::load(&path).await.unwrap();
        history
            .update_model_launch("zoo", "model", "llama.cpp", vec!["gpu0".to_string()], &ParamList::new())
            .await
            .unwrap();
        let info = history.get("zoo", "model").await;
        assert_eq!(info.launch_count, 1);
        assert_eq!(info.last_runtime.as_deref(), Some("llama.cpp"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn sorted_models_prefers_higher_launch_count() {
        let path = std::env::temp_dir().join(format!(
            "modelzoo-history-sort-test-{}.json",
            std::process::id()
        ));
        let history = LaunchHistory::load(&path).await.unwrap();

        let popular = Model {
            zoo_name: "zoo".into(),
            model_id: "/models/popular.gguf".into(),
            model_format: modelzoo_types::ModelFormat::Gguf,
            model_name: "popular".into(),
            model_size: None,
            api_url: None,
            api_key: None,
        };
        let rare = Model {
            zoo_name: "zoo".into(),
            model_id: "/models/rare.gguf".into(),
            model_format: modelzoo_types::ModelFormat::Gguf,
            model_name: "rare".into(),
            model_size: None,
            api_url: None,
            api_key: None,
        };

        for _ in 0..3 {
            history
                .update_model_launch("zoo", "popular", "llama.cpp", vec![], &ParamList::new())
                .await
                .unwrap();
        }
        history
            .update_model_launch("zoo", "rare", "llama.cpp", vec![], &ParamList::new())
            .await
            .unwrap();

        let sorted = get_sorted_models(&history, vec![rare.clone(), popular.clone()]).await;
        assert_eq!(sorted[0].model_name, "popular");
        assert_eq!(sorted[1].model_name, "rare");

        let _ = std::fs::remove_file(&path);
    }
}
