//! Runtime drivers: translate `(Model, Listener, params)` into a concrete
//! argv + env + cwd, then hand off to the supervisor.
//!
//! Each driver is a small, stateless-except-for-its-own-binary-path value
//! implementing [`Driver`]. `build()` is synchronous and pure — it never
//! touches a process or socket itself (`SDServerDriver` reads the
//! checkpoint JSON, which is the one exception: resolving model asset
//! paths requires it). Spawning the resulting [`SpawnPlan`] is the
//! caller's job via [`RunningModel::spawn`]. `class` strings resolve
//! through a static table in [`construct`], never through runtime `eval`.

mod kcppt;
mod koboldcpp;
mod litellm;
mod llama_cpp;
mod llama_srb;
mod sd_server;
mod tabby;
mod vllm;

pub use kcppt::KcpptConfig;
pub use koboldcpp::KoboldCppDriver;
pub use litellm::LiteLLMDriver;
pub use llama_cpp::LlamaCppDriver;
pub use llama_srb::LlamaSrbDriver;
pub use sd_server::SDServerDriver;
pub use tabby::TabbyDriver;
pub use vllm::VLLMDriver;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use modelzoo_types::{Listener, Model, ParamList, RuntimeParameter};

use crate::error::ModelZooError;

/// Everything [`crate::supervisor::RunningModel::spawn`] needs, decided by
/// a driver ahead of time. `listener.protocol` is always set by `build()` —
/// it is how the proxy later knows which adapters apply to this backend.
pub struct SpawnPlan {
    pub model: Model,
    pub listener: Listener,
    pub argv: Vec<String>,
    pub extra_environment: BTreeMap<String, String>,
    pub working_directory: Option<PathBuf>,
}

/// A factory turning `(listener, model, params)` into a [`SpawnPlan`].
///
/// Implementations are synchronous: composing an argv and reading a small
/// checkpoint JSON never need the async runtime. The one async step —
/// actually spawning the child — happens once, generically, in
/// [`crate::supervisor::RunningModel::spawn`].
pub trait Driver: Send + Sync {
    fn runtime_name(&self) -> &str;

    /// Model formats this driver accepts. `build()` rejects anything else
    /// with [`ModelZooError::UnsupportedFormat`].
    fn supported_formats(&self) -> &'static [&'static str];

    /// The configurable knobs this driver exposes, for introspection by the
    /// dashboard glue layer. Not consulted by `build()` itself — only
    /// `param_list` is.
    fn params(&self) -> Vec<RuntimeParameter>;

    fn build(&self, listener: Listener, model: Model, params: &ParamList) -> Result<SpawnPlan>;
}

fn check_format(driver: &dyn Driver, model: &Model) -> Result<()> {
    let format = model.model_format.to_string();
    if driver.supported_formats().contains(&format.as_str()) {
        Ok(())
    } else {
        Err(ModelZooError::UnsupportedFormat(format).into())
    }
}

/// Resolves an enum [`RuntimeParameter`]'s label (or its default label, if
/// the operator didn't specify one, or if the specified label isn't in the
/// map) to its underlying integer value.
fn enum_i64(param: &RuntimeParameter, label: Option<&str>) -> i64 {
    param
        .resolve_enum(label)
        .and_then(modelzoo_types::ParamValue::as_i64)
        .or_else(|| param.resolve_enum(None).and_then(modelzoo_types::ParamValue::as_i64))
        .unwrap_or_default()
}

fn enum_str(param: &RuntimeParameter, label: Option<&str>) -> String {
    param
        .resolve_enum(label)
        .or_else(|| param.resolve_enum(None))
        .map(modelzoo_types::ParamValue::as_str)
        .unwrap_or_default()
}

/// Constructs a driver instance from a config-supplied `class` tag, name,
/// and backend path. An unknown `class` is a load-time error, never a
/// runtime `eval`.
pub fn construct(class: &str, name: String, path: String) -> Result<Box<dyn Driver>> {
    let driver: Box<dyn Driver> = match class {
        "llama.cpp" => Box::new(LlamaCppDriver::new(name, path)),
        "koboldcpp" => Box::new(KoboldCppDriver::new(name, path)),
        "tabbyapi" => Box::new(TabbyDriver::new(name, path)),
        "vllm" => Box::new(VLLMDriver::new(name, path)),
        "llama-srb" => Box::new(LlamaSrbDriver::new(name, path)),
        "litellm" => Box::new(LiteLLMDriver::new(name, path)),
        "sd-server" => Box::new(SDServerDriver::new(name, path)),
        other => anyhow::bail!("unknown runtime driver class: {other}"),
    };
    Ok(driver)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_class_is_rejected_at_construction() {
        let err = construct("not-a-real-runtime", "x".into(), "/bin/x".into()).unwrap_err();
        assert!(err.to_string().contains("unknown runtime driver class"));
    }

    #[test]
    fn known_classes_construct() {
        for class in [
            "llama.cpp",
            "koboldcpp",
            "tabbyapi",
            "vllm",
            "llama-srb",
            "litellm",
            "sd-server",
        ] {
            assert!(construct(class, "n".into(), "/bin/n".into()).is_ok());
        }
    }
}
