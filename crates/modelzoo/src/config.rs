//! Configuration loading: `serde_yaml` over a typed `Config`, validated
//! against the static driver registry at load time — an unknown `class`
//! string is a `ConfigError`, never a runtime `eval`.

use std::collections::BTreeMap;
use std::path::Path;

use modelzoo_types::{Environment, ParamValue};
use serde::Deserialize;
use thiserror::Error;

use crate::drivers::{self, Driver};
use crate::peers::Peer;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("runtime '{name}': {source}")]
    InvalidRuntime {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Deserialize)]
struct RawRuntime {
    name: String,
    class: String,
    params: RuntimeParams,
}

#[derive(Debug, Deserialize)]
struct RuntimeParams {
    /// Every driver takes exactly one backend path (binary, script, or
    /// venv) at construction time.
    path: String,
}

#[derive(Debug, Deserialize)]
struct RawEnvironment {
    name: String,
    vars: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawPeer {
    host: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct RawZoo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    zoos: Vec<RawZoo>,
    #[serde(default)]
    runtimes: Vec<RawRuntime>,
    #[serde(default)]
    envs: Vec<RawEnvironment>,
    #[serde(default)]
    peers: Vec<RawPeer>,
}

/// The fully-constructed, validated configuration: driver instances, named
/// environments, the peer list, and the zoo names to register (catalog
/// implementations themselves are a glue-layer concern).
pub struct Config {
    pub zoo_names: Vec<String>,
    pub runtimes: BTreeMap<String, Box<dyn Driver>>,
    pub environments: BTreeMap<String, Environment>,
    pub peers: Vec<Peer>,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(contents)?;

        let mut runtimes = BTreeMap::new();
        for runtime in raw.runtimes {
            let driver = drivers::construct(&runtime.class, runtime.name.clone(), runtime.params.path)
                .map_err(|source| ConfigError::InvalidRuntime {
                    name: runtime.name.clone(),
                    source,
                })?;
            runtimes.insert(runtime.name, driver);
        }

        let environments = raw
            .envs
            .into_iter()
            .map(|e| (e.name.clone(), Environment::new(e.name, e.vars)))
            .collect();

        let peers = raw
            .peers
            .into_iter()
            .map(|p| Peer {
                host: p.host,
                port: p.port,
            })
            .collect();

        let zoo_names = raw.zoos.into_iter().map(|z| z.name).collect();

        Ok(Self {
            zoo_names,
            runtimes,
            environments,
            peers,
        })
    }
}

/// Coerces a loosely-typed YAML launch-params mapping (as supplied by the
/// CLI `launch` subcommand or the dashboard) into a [`modelzoo_types::ParamList`].
pub fn params_from_yaml(value: serde_yaml::Value) -> modelzoo_types::ParamList {
    let mut out = modelzoo_types::ParamList::new();
    let Some(mapping) = value.as_mapping() else {
        return out;
    };
    for (key, value) in mapping {
        let Some(key) = key.as_str() else { continue };
        let param_value = if let Some(b) = value.as_bool() {
            ParamValue::Bool(b)
        } else if let Some(i) = value.as_i64() {
            ParamValue::Int(i)
        } else if let Some(f) = value.as_f64() {
            ParamValue::Float(f)
        } else if let Some(s) = value.as_str() {
            ParamValue::Str(s.to_string())
        } else {
            continue;
        };
        out.insert(key.to_string(), param_value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_runtime_class_is_rejected() {
        let yaml = r#"
runtimes:
  - name: broken
    class: not-a-real-class
    params:
      path: /bin/x
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRuntime { .. }));
    }

    #[test]
    fn full_config_parses() {
        let yaml = r#"
zoos:
  - name: local-gguf
runtimes:
  - name: llama
    class: llama.cpp
    params:
      path: /usr/local/bin/llama-server
envs:
  - name: gpu0
    vars:
      CUDA_VISIBLE_DEVICES: "0"
peers:
  - host: 10.0.0.2
    port: 9696
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.zoo_names, vec!["local-gguf".to_string()]);
        assert!(config.runtimes.contains_key("llama"));
        assert!(config.environments.contains_key("gpu0"));
        assert_eq!(config.peers.len(), 1);
    }
}
