use std::collections::BTreeMap;
use std::path::Path;

use modelzoo_types::{Listener, Model, ParamList, ParamType, ParamValue, RuntimeParameter};

use super::{check_format, enum_i64, Driver, SpawnPlan};

const FORMATS: &[&str] = &["gguf"];

fn ctx_param() -> RuntimeParameter {
    let mut map = BTreeMap::new();
    for (label, value) in [
        ("4K", 4096),
        ("6K", 6144),
        ("8K", 8192),
        ("12K", 12 * 1024),
        ("16K", 16 * 1024),
        ("24K", 24 * 1024),
        ("32K", 32 * 1024),
    ] {
        map.insert(label.to_string(), ParamValue::Int(value));
    }
    RuntimeParameter::new(
        "ctx",
        "Total Context size",
        ParamType::Enum,
        ParamValue::Str("8K".to_string()),
    )
    .with_enum(map)
}

/// llama-srb: `<script> --model --port --ctx --n`; working dir
/// = script's directory. Protocol: `openai`.
pub struct LlamaSrbDriver {
    runtime_name: String,
    script_path: String,
}

impl LlamaSrbDriver {
    pub fn new(runtime_name: String, script_path: String) -> Self {
        Self {
            runtime_name,
            script_path,
        }
    }
}

impl Driver for LlamaSrbDriver {
    fn runtime_name(&self) -> &str {
        &self.runtime_name
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        FORMATS
    }

    fn params(&self) -> Vec<RuntimeParameter> {
        vec![
            ctx_param(),
            RuntimeParameter::new(
                "batch_size",
                "Number of completions to run in parallel",
                ParamType::Int,
                ParamValue::Int(4),
            ),
        ]
    }

    fn build(&self, mut listener: Listener, model: Model, params: &ParamList) -> anyhow::Result<SpawnPlan> {
        check_format(self, &model)?;

        let ctx = ctx_param();
        let ctx_value = enum_i64(&ctx, params.get("ctx").map(ParamValue::as_str).as_deref());

        let argv = vec![
            self.script_path.clone(),
            "--model".to_string(),
            model.model_id.clone(),
            "--port".to_string(),
            listener.port.to_string(),
            "--ctx".to_string(),
            ctx_value.to_string(),
            "--n".to_string(),
            modelzoo_types::param_i64(params, "batch_size", 4).to_string(),
        ];

        let working_directory = Path::new(&self.script_path)
            .parent()
            .map(|p| p.to_path_buf());

        listener.protocol = "openai".to_string();

        Ok(SpawnPlan {
            model,
            listener,
            argv,
            extra_environment: Default::default(),
            working_directory,
        })
    }
}
