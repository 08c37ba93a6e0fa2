use std::collections::BTreeMap;

use modelzoo_types::{Listener, Model, ParamList, ParamType, ParamValue, RuntimeParameter};

use super::{check_format, enum_i64, Driver, SpawnPlan};

const FORMATS: &[&str] = &["gptq", "exl2"];

fn max_seq_len_param() -> RuntimeParameter {
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
        "max_seq_len",
        "Context size",
        ParamType::Enum,
        ParamValue::Str("4K".to_string()),
    )
    .with_enum(map)
}

/// TabbyAPI: script invocation, `--model-name`,
/// `--max-seq-len`, `--cache-mode`, optional `--tensor-parallel`,
/// `--disable-auth`, `--gpu-split` + `--gpu-split-auto False`. Protocol:
/// `openai`.
pub struct TabbyDriver {
    runtime_name: String,
    script_path: String,
}

impl TabbyDriver {
    pub fn new(runtime_name: String, script_path: String) -> Self {
        Self {
            runtime_name,
            script_path,
        }
    }
}

impl Driver for TabbyDriver {
    fn runtime_name(&self) -> &str {
        &self.runtime_name
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        FORMATS
    }

    fn params(&self) -> Vec<RuntimeParameter> {
        vec![
            max_seq_len_param(),
            RuntimeParameter::new(
                "tensor_parallel",
                "Enable tensor parallelism",
                ParamType::Bool,
                ParamValue::Bool(false),
            ),
            RuntimeParameter::new(
                "cache_mode",
                "KV Cache mode for VRAM savings",
                ParamType::Str,
                ParamValue::Str("FP16".to_string()),
            ),
            RuntimeParameter::new(
                "disable_auth",
                "Disable authentication",
                ParamType::Bool,
                ParamValue::Bool(true),
            ),
            RuntimeParameter::new(
                "gpu_split",
                "GPU split configuration",
                ParamType::Str,
                ParamValue::Str(String::new()),
            ),
            RuntimeParameter::new(
                "extra_args",
                "Optional additional arguments to the script",
                ParamType::Str,
                ParamValue::Str(String::new()),
            ),
        ]
    }

    fn build(&self, mut listener: Listener, model: Model, params: &ParamList) -> anyhow::Result<SpawnPlan> {
        check_format(self, &model)?;

        let max_seq_len = max_seq_len_param();
        let max_seq_len_value = enum_i64(
            &max_seq_len,
            params.get("max_seq_len").map(ParamValue::as_str).as_deref(),
        );

        let mut argv = vec![
            self.script_path.clone(),
            "--model-name".to_string(),
            model.model_id.clone(),
            "--max-seq-len".to_string(),
            max_seq_len_value.to_string(),
            "--host".to_string(),
            listener.host.clone(),
            "--port".to_string(),
            listener.port.to_string(),
            "--cache-mode".to_string(),
            modelzoo_types::param_str(params, "cache_mode", "FP16"),
        ];

        if modelzoo_types::param_bool(params, "tensor_parallel", false) {
            argv.push("--tensor-parallel".to_string());
            argv.push("True".to_string());
        }

        if modelzoo_types::param_bool(params, "disable_auth", true) {
            argv.push("--disable-auth".to_string());
            argv.push("True".to_string());
        }

        let gpu_split = modelzoo_types::param_str(params, "gpu_split", "");
        if !gpu_split.trim().is_empty() {
            argv.push("--gpu-split".to_string());
            argv.push(gpu_split);
            argv.push("--gpu-split-auto".to_string());
            argv.push("False".to_string());
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
