use std::collections::BTreeMap;
use std::path::Path;

use modelzoo_types::{Listener, Model, ParamList, ParamType, ParamValue, RuntimeParameter};

use super::kcppt::{resolve_asset_path, KcpptConfig};
use super::{check_format, Driver, SpawnPlan};
use crate::error::ModelZooError;

const FORMATS: &[&str] = &["kcppt"];

fn sampler_param() -> RuntimeParameter {
    let mut map = BTreeMap::new();
    for (label, value) in [
        ("Euler", "euler"),
        ("Euler A", "euler_a"),
        ("Heun", "heun"),
        ("DPM2", "dpm2"),
        ("DPM++", "dpmpp_2m"),
        ("LCM", "lcm"),
    ] {
        map.insert(label.to_string(), ParamValue::Str(value.to_string()));
    }
    RuntimeParameter::new(
        "sampler_name",
        "Sampling method",
        ParamType::Enum,
        ParamValue::Str("Euler".to_string()),
    )
    .with_enum(map)
}

/// SDServer: parses the `kcppt` checkpoint for `sdmodel`
/// (required) plus optional `sdt5xxl`/`sdclipl`/`sdvae`, each resolved
/// relative to the checkpoint's directory. Protocol: `sd-server`.
pub struct SDServerDriver {
    runtime_name: String,
    bin_path: String,
}

impl SDServerDriver {
    pub fn new(runtime_name: String, bin_path: String) -> Self {
        Self {
            runtime_name,
            bin_path,
        }
    }
}

impl Driver for SDServerDriver {
    fn runtime_name(&self) -> &str {
        &self.runtime_name
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        FORMATS
    }

    fn params(&self) -> Vec<RuntimeParameter> {
        vec![
            sampler_param(),
            RuntimeParameter::new(
                "cfg_scale",
                "CFG Scale",
                ParamType::Float,
                ParamValue::Float(1.0),
            ),
            RuntimeParameter::new(
                "steps",
                "Number of sampling steps",
                ParamType::Int,
                ParamValue::Int(1),
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

        let checkpoint_path = Path::new(&model.model_id);
        let config = KcpptConfig::load(checkpoint_path)?;
        let base_dir = checkpoint_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default();

        let diffusion_model = config
            .sdmodel
            .as_deref()
            .and_then(|reference| resolve_asset_path(reference, &base_dir))
            .ok_or(ModelZooError::MissingDiffusionModel)?;
        let diffusion_model = diffusion_model.display().to_string();

        let mut argv = vec![
            self.bin_path.clone(),
            "--host".to_string(),
            listener.host.clone(),
            "--port".to_string(),
            listener.port.to_string(),
            "-v".to_string(),
        ];

        if diffusion_model.contains("flux") {
            argv.push("--diffusion-model".to_string());
            argv.push(diffusion_model);
        } else {
            argv.push("-m".to_string());
            argv.push(diffusion_model);
        }

        if let Some(t5xxl) = config.sdt5xxl.as_deref().and_then(|r| resolve_asset_path(r, &base_dir)) {
            argv.push("--t5xxl".to_string());
            argv.push(t5xxl.display().to_string());
        }
        if let Some(clip_l) = config.sdclipl.as_deref().and_then(|r| resolve_asset_path(r, &base_dir)) {
            argv.push("--clip_l".to_string());
            argv.push(clip_l.display().to_string());
        }
        if let Some(vae) = config.sdvae.as_deref().and_then(|r| resolve_asset_path(r, &base_dir)) {
            argv.push("--vae".to_string());
            argv.push(vae.display().to_string());
        }

        let sampler = sampler_param();
        let sampler_value = sampler
            .resolve_enum(params.get("sampler_name").map(ParamValue::as_str).as_deref())
            .or_else(|| sampler.resolve_enum(None))
            .map(ParamValue::as_str)
            .unwrap_or_else(|| "euler".to_string());
        argv.push("--sampling-method".to_string());
        argv.push(sampler_value);

        argv.push("--cfg-scale".to_string());
        argv.push(modelzoo_types::param_f64(params, "cfg_scale", 1.0).to_string());
        argv.push("--steps".to_string());
        argv.push(modelzoo_types::param_i64(params, "steps", 1).to_string());
        argv.push("-p".to_string());
        argv.push("default prompt".to_string());

        let extra_args = modelzoo_types::param_str(params, "extra_args", "");
        argv.extend(extra_args.split_whitespace().map(str::to_string));

        listener.protocol = "sd-server".to_string();

        Ok(SpawnPlan {
            model,
            listener,
            argv,
            extra_environment: Default::default(),
            working_directory: None,
        })
    }
}
