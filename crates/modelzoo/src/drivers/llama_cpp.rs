use modelzoo_types::{Listener, Model, ParamList, ParamType, ParamValue, RuntimeParameter};

use super::{check_format, enum_i64, Driver, SpawnPlan};

const FORMATS: &[&str] = &["gguf"];

fn context_param() -> RuntimeParameter {
    let mut map = std::collections::BTreeMap::new();
    map.insert("4K".to_string(), ParamValue::Int(4096));
    map.insert("6K".to_string(), ParamValue::Int(6144));
    map.insert("8K".to_string(), ParamValue::Int(8192));
    map.insert("16K".to_string(), ParamValue::Int(16384));
    map.insert("32K".to_string(), ParamValue::Int(32768));
    RuntimeParameter::new(
        "context",
        "Context size",
        ParamType::Enum,
        ParamValue::Str("4K".to_string()),
    )
    .with_enum(map)
}

/// llama.cpp server: `-m`, `-c` (enum-mapped context), `-ngl`,
/// `-sm`, `--host`, `--port`, optional `-fa`. Protocol: `openai`.
pub struct LlamaCppDriver {
    runtime_name: String,
    bin_path: String,
}

impl LlamaCppDriver {
    pub fn new(runtime_name: String, bin_path: String) -> Self {
        Self {
            runtime_name,
            bin_path,
        }
    }
}

impl Driver for LlamaCppDriver {
    fn runtime_name(&self) -> &str {
        &self.runtime_name
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        FORMATS
    }

    fn params(&self) -> Vec<RuntimeParameter> {
        vec![
            context_param(),
            RuntimeParameter::new(
                "num_gpu_layers",
                "Number of GPU layers",
                ParamType::Int,
                ParamValue::Int(999),
            ),
            RuntimeParameter::new(
                "split_mode",
                "Split mode for model",
                ParamType::Str,
                ParamValue::Str("row".to_string()),
            ),
            RuntimeParameter::new(
                "flash_attention",
                "Enable flash attention",
                ParamType::Bool,
                ParamValue::Bool(true),
            ),
            RuntimeParameter::new(
                "extra_args",
                "Optional additional arguments to the binary",
                ParamType::Str,
                ParamValue::Str(String::new()),
            ),
        ]
    }

    fn build(&self, mut listener: Listener, model: Model, params: &ParamList) -> anyhow::Result<SpawnPlan> {
        check_format(self, &model)?;

        let context = context_param();
        let context_value = enum_i64(&context, params.get("context").map(ParamValue::as_str).as_deref());

        let num_gpu_layers = modelzoo_types::param_i64(params, "num_gpu_layers", 999);
        let split_mode = modelzoo_types::param_str(params, "split_mode", "row");

        let mut argv = vec![
            self.bin_path.clone(),
            "-m".to_string(),
            model.model_id.clone(),
            "-c".to_string(),
            context_value.to_string(),
            "-ngl".to_string(),
            num_gpu_layers.to_string(),
            "-sm".to_string(),
            split_mode,
            "--host".to_string(),
            listener.host.clone(),
            "--port".to_string(),
            listener.port.to_string(),
        ];

        if modelzoo_types::param_bool(params, "flash_attention", true) {
            argv.push("-fa".to_string());
        }

        let extra_args = modelzoo_types::param_str(params, "extra_args", "");
        argv.extend(extra_args.split_whitespace().map(str::to_string));

        listener.protocol = "openai".to_string();

        Ok(SpawnPlan {
            model,
            listener,
            argv,
            extra_environment: Default::default(),
            working_directory: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelzoo_types::ModelFormat;

    fn model() -> Model {
        Model {
            zoo_name: "z".into(),
            model_id: "/models/x.gguf".into(),
            model_format: ModelFormat::Gguf,
            model_name: "x".into(),
            model_size: None,
            api_url: None,
            api_key: None,
        }
    }

    #[test]
    fn context_8k_maps_to_8192() {
        let driver = LlamaCppDriver::new("llama".into(), "/usr/bin/llama-server".into());
        let mut params = ParamList::new();
        params.insert("context".into(), ParamValue::Str("8K".into()));
        let plan = driver
            .build(Listener::new("", "0.0.0.0", 50001), model(), &params)
            .unwrap();
        let c_index = plan.argv.iter().position(|a| a == "-c").unwrap();
        assert_eq!(plan.argv[c_index + 1], "8192");
        assert_eq!(plan.listener.protocol, "openai");
    }

    #[test]
    fn rejects_unsupported_format() {
        let driver = LlamaCppDriver::new("llama".into(), "/bin/x".into());
        let mut m = model();
        m.model_format = ModelFormat::Gptq;
        let err = driver
            .build(Listener::new("", "0.0.0.0", 1), m, &ParamList::new())
            .unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }
}
