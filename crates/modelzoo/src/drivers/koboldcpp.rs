use std::collections::BTreeMap;
use std::path::Path;

use modelzoo_types::{Listener, Model, ModelFormat, ParamList, ParamType, ParamValue, RuntimeParameter};

use super::kcppt::KcpptConfig;
use super::{check_format, enum_i64, Driver, SpawnPlan};

const FORMATS: &[&str] = &["gguf", "kcppt"];

fn context_param() -> RuntimeParameter {
    let mut map = BTreeMap::new();
    for (label, value) in [
        ("4K", 4096),
        ("6K", 6144),
        ("8K", 8192),
        ("16K", 16384),
        ("32K", 32768),
    ] {
        map.insert(label.to_string(), ParamValue::Int(value));
    }
    RuntimeParameter::new(
        "contextsize",
        "Context size",
        ParamType::Enum,
        ParamValue::Str("4K".to_string()),
    )
    .with_enum(map)
}

fn quantkv_param() -> RuntimeParameter {
    let mut map = BTreeMap::new();
    map.insert("f16".to_string(), ParamValue::Int(0));
    map.insert("q8".to_string(), ParamValue::Int(1));
    map.insert("q4".to_string(), ParamValue::Int(2));
    RuntimeParameter::new(
        "quantkv",
        "KV cache data type quantization",
        ParamType::Enum,
        ParamValue::Str("f16".to_string()),
    )
    .with_enum(map)
}

/// KoboldCpp: `--model`/positional, `--contextsize`,
/// `--gpulayers`, `--host`, `--port`, `--usecublas`, optional
/// `--flashattention`, `--quantkv`. A `kcppt` checkpoint naming an
/// `sdmodel` speaks `a1111`; everything else speaks `openai`.
pub struct KoboldCppDriver {
    runtime_name: String,
    bin_path: String,
}

impl KoboldCppDriver {
    pub fn new(runtime_name: String, bin_path: String) -> Self {
        Self {
            runtime_name,
            bin_path,
        }
    }
}

impl Driver for KoboldCppDriver {
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
                "gpulayers",
                "Number of GPU layers",
                ParamType::Int,
                ParamValue::Int(-1),
            ),
            RuntimeParameter::new(
                "flashattention",
                "Enable flash attention",
                ParamType::Bool,
                ParamValue::Bool(true),
            ),
            quantkv_param(),
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
        let context_value = enum_i64(
            &context,
            params.get("contextsize").map(ParamValue::as_str).as_deref(),
        );

        let model_spec: Vec<String> = if model.model_format == ModelFormat::Gguf {
            vec!["--model".to_string(), model.model_id.clone()]
        } else {
            vec![model.model_id.clone()]
        };

        let mut argv = vec![self.bin_path.clone()];
        argv.extend(model_spec);
        argv.extend([
            "--contextsize".to_string(),
            context_value.to_string(),
            "--gpulayers".to_string(),
            modelzoo_types::param_i64(params, "gpulayers", -1).to_string(),
            "--host".to_string(),
            listener.host.clone(),
            "--port".to_string(),
            listener.port.to_string(),
            "--usecublas".to_string(),
        ]);

        if modelzoo_types::param_bool(params, "flashattention", false) {
            argv.push("--flashattention".to_string());
        }

        let quantkv = quantkv_param();
        let quantkv_value = enum_i64(&quantkv, params.get("quantkv").map(ParamValue::as_str).as_deref());
        argv.push("--quantkv".to_string());
        argv.push(quantkv_value.to_string());

        let extra_args = modelzoo_types::param_str(params, "extra_args", "");
        argv.extend(extra_args.split_whitespace().map(str::to_string));

        let checkpoint_path = Path::new(&model.model_id);
        let working_directory = checkpoint_path.parent().map(|p| p.to_path_buf());

        listener.protocol = if model.model_format == ModelFormat::Kcppt {
            let config = KcpptConfig::load(checkpoint_path)?;
            if config.is_diffusion_checkpoint() {
                "a1111".to_string()
            } else {
                "openai".to_string()
            }
        } else {
            "openai".to_string()
        };

        Ok(SpawnPlan {
            model,
            listener,
            argv,
            extra_environment: Default::default(),
            working_directory,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(format: ModelFormat, model_id: &str) -> Model {
        Model {
            zoo_name: "z".into(),
            model_id: model_id.into(),
            model_format: format,
            model_name: "x".into(),
            model_size: None,
            api_url: None,
            api_key: None,
        }
    }

    #[test]
    fn gguf_uses_model_flag_and_openai_protocol() {
        let driver = KoboldCppDriver::new("kobold".into(), "/bin/koboldcpp".into());
        let plan = driver
            .build(
                Listener::new("", "0.0.0.0", 5000),
                model(ModelFormat::Gguf, "/models/x.gguf"),
                &ParamList::new(),
            )
            .unwrap();
        assert_eq!(plan.argv[1], "--model");
        assert_eq!(plan.listener.protocol, "openai");
    }
}
