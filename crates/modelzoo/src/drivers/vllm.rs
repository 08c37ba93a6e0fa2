use std::collections::BTreeMap;
use std::io::Write;

use modelzoo_types::{Listener, Model, ParamList, ParamType, ParamValue, RuntimeParameter};

use super::{check_format, enum_i64, Driver, SpawnPlan};

const FORMATS: &[&str] = &["gguf", "fp16", "awq", "gptq"];

fn max_model_len_param() -> RuntimeParameter {
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
        "max_model_len",
        "Maximum sequence length",
        ParamType::Enum,
        ParamValue::Str("4K".to_string()),
    )
    .with_enum(map)
}

/// vLLM: launched via a generated shell script that sources a
/// virtualenv and execs `vllm serve …`. Protocol: `openai`.
pub struct VLLMDriver {
    runtime_name: String,
    venv_path: String,
}

impl VLLMDriver {
    pub fn new(runtime_name: String, venv_path: String) -> Self {
        Self {
            runtime_name,
            venv_path,
        }
    }

    /// Writes the launch script under the system temp directory and marks
    /// it executable. Returns the script's path.
    fn write_launch_script(&self, vllm_cmd: &str) -> anyhow::Result<std::path::PathBuf> {
        let path = std::env::temp_dir().join(format!("vllm_{}.sh", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path)?;
        write!(
            file,
            "#!/bin/bash\nsource {}/bin/activate\necho env: $CUDA_VISIBLE_DEVICES $CUDA_DEVICE_ORDER\n{}\n",
            self.venv_path, vllm_cmd
        )?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        }

        Ok(path)
    }
}

impl Driver for VLLMDriver {
    fn runtime_name(&self) -> &str {
        &self.runtime_name
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        FORMATS
    }

    fn params(&self) -> Vec<RuntimeParameter> {
        vec![
            max_model_len_param(),
            RuntimeParameter::new(
                "tensor_parallel_size",
                "Number of GPUs for tensor parallelism",
                ParamType::Int,
                ParamValue::Int(1),
            ),
            RuntimeParameter::new(
                "gpu_memory_utilization",
                "Target GPU memory utilization",
                ParamType::Float,
                ParamValue::Float(0.95),
            ),
            RuntimeParameter::new(
                "enforce_eager",
                "Enforce eager execution mode",
                ParamType::Bool,
                ParamValue::Bool(true),
            ),
        ]
    }

    fn build(&self, mut listener: Listener, model: Model, params: &ParamList) -> anyhow::Result<SpawnPlan> {
        check_format(self, &model)?;

        let max_model_len = max_model_len_param();
        let max_model_len_value = enum_i64(
            &max_model_len,
            params.get("max_model_len").map(ParamValue::as_str).as_deref(),
        );

        let mut vllm_cmd = format!(
            "vllm serve {} --host {} --port {} --tensor-parallel-size {} --max-model-len {} --gpu-memory-utilization {}",
            model.model_id,
            listener.host,
            listener.port,
            modelzoo_types::param_i64(params, "tensor_parallel_size", 1),
            max_model_len_value,
            modelzoo_types::param_f64(params, "gpu_memory_utilization", 0.95),
        );

        if modelzoo_types::param_bool(params, "enforce_eager", true) {
            vllm_cmd.push_str(" --enforce-eager");
        }

        let script_path = self.write_launch_script(&vllm_cmd)?;

        listener.protocol = "openai".to_string();

        Ok(SpawnPlan {
            model,
            listener,
            argv: vec![script_path.display().to_string()],
            extra_environment: Default::default(),
            working_directory: None,
        })
    }
}
