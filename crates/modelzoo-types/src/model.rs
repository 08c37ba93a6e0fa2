use serde::{Deserialize, Serialize};

/// The on-disk / on-wire representation of a model's weight format.
///
/// Runtime drivers declare which of these they accept; a driver refuses to
/// spawn a [`Model`] whose format isn't in its `supported_formats` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Gguf,
    Gptq,
    Exl2,
    Awq,
    Fp16,
    Kcppt,
    Litellm,
    Unknown,
}

impl std::fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModelFormat::Gguf => "gguf",
            ModelFormat::Gptq => "gptq",
            ModelFormat::Exl2 => "exl2",
            ModelFormat::Awq => "awq",
            ModelFormat::Fp16 => "fp16",
            ModelFormat::Kcppt => "kcppt",
            ModelFormat::Litellm => "litellm",
            ModelFormat::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// An advertisable inference target, as produced by a zoo's `catalog()`.
///
/// Immutable except for `model_name`, which the operator may override with a
/// custom alias before launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub zoo_name: String,
    /// Opaque locator: a filesystem path, a checkpoint file, or an
    /// `openai/...`-style API URI, depending on `model_format`.
    pub model_id: String,
    pub model_format: ModelFormat,
    pub model_name: String,
    pub model_size: Option<u64>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

impl Model {
    /// Applies an operator-supplied alias, the only mutation a `Model`
    /// undergoes between `catalog()` and launch.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.model_name = alias.into();
        self
    }
}
