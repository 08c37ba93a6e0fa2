use std::collections::BTreeMap;

use modelzoo_types::{Listener, Model, ParamList, ParamType, ParamValue, RuntimeParameter};

use super::{check_format, Driver, SpawnPlan};

const FORMATS: &[&str] = &["litellm"];

/// LiteLLM: `-m <model_id> --alias <name> --host --port`,
/// optional `--api_base`, `--drop_params`, `--max_tokens`; injects
/// `OPENAI_API_KEY` from `model.api_key`. Protocol: `openai`.
pub struct LiteLLMDriver {
    runtime_name: String,
    bin_path: String,
}

impl LiteLLMDriver {
    pub fn new(runtime_name: String, bin_path: String) -> Self {
        Self {
            runtime_name,
            bin_path,
        }
    }
}

impl Driver for LiteLLMDriver {
    fn runtime_name(&self) -> &str {
        &self.runtime_name
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        FORMATS
    }

    fn params(&self) -> Vec<RuntimeParameter> {
        vec![
            RuntimeParameter::new(
                "drop_params",
                "Drop unmapped parameters",
                ParamType::Bool,
                ParamValue::Bool(false),
            ),
            RuntimeParameter::new(
                "max_tokens",
                "Set max tokens for the model",
                ParamType::Str,
                ParamValue::Str(String::new()),
            ),
        ]
    }

    fn build(&self, mut listener: Listener, model: Model, params: &ParamList) -> anyhow::Result<SpawnPlan> {
        check_format(self, &model)?;

        let mut argv = vec![
            self.bin_path.clone(),
            "-m".to_string(),
            model.model_id.clone(),
            "--alias".to_string(),
            model.model_name.clone(),
            "--host".to_string(),
            listener.host.clone(),
            "--port".to_string(),
            listener.port.to_string(),
        ];

        if let Some(api_url) = &model.api_url {
            argv.push("--api_base".to_string());
            argv.push(api_url.clone());
        }

        if modelzoo_types::param_bool(params, "drop_params", false) {
            argv.push("--drop_params".to_string());
        }

        let max_tokens = modelzoo_types::param_str(params, "max_tokens", "");
        if !max_tokens.is_empty() {
            argv.push("--max_tokens".to_string());
            argv.push(max_tokens);
        }

        let mut extra_environment = BTreeMap::new();
        if let Some(api_key) = &model.api_key {
            extra_environment.insert("OPENAI_API_KEY".to_string(), api_key.clone());
        }

        listener.protocol = "openai".to_string();

        Ok(SpawnPlan {
            model,
            listener,
            argv,
            extra_environment,
            working_directory: None,
        })
    }
}
