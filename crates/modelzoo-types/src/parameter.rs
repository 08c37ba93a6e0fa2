use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The primitive type a [`RuntimeParameter`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Float,
    Str,
    Bool,
    Enum,
}

/// A concrete value supplied for a [`RuntimeParameter`] at launch time.
///
/// Operators pass these in loosely-typed form (e.g. from a JSON request
/// body or a dashboard form field); drivers coerce via the accessor
/// methods below rather than matching on the variant directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl ParamValue {
    pub fn as_str(&self) -> String {
        match self {
            ParamValue::Int(v) => v.to_string(),
            ParamValue::Float(v) => v.to_string(),
            ParamValue::Str(v) => v.clone(),
            ParamValue::Bool(v) => v.to_string(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Str(v) => v.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Str(v) => v.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            ParamValue::Str(v) => v.parse().ok(),
            _ => None,
        }
    }
}

/// A typed descriptor for one configurable knob a runtime driver exposes
/// (e.g. llama.cpp's `context` enum, or vLLM's `gpu_memory_utilization`
/// float). Enum parameters resolve a label (what the operator picks) to an
/// underlying value (what gets passed on the command line) via `enum_map`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeParameter {
    pub name: String,
    pub description: String,
    pub param_type: ParamType,
    pub default: ParamValue,
    /// label -> underlying value, populated only when `param_type` is
    /// `ParamType::Enum`.
    pub enum_map: Option<BTreeMap<String, ParamValue>>,
}

impl RuntimeParameter {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        param_type: ParamType,
        default: ParamValue,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type,
            default,
            enum_map: None,
        }
    }

    pub fn with_enum(mut self, enum_map: BTreeMap<String, ParamValue>) -> Self {
        self.enum_map = Some(enum_map);
        self
    }

    /// Resolves an enum parameter's label to its underlying value, falling
    /// back to the default label when the caller didn't pick one.
    pub fn resolve_enum<'a>(&'a self, label: Option<&str>) -> Option<&'a ParamValue> {
        let map = self.enum_map.as_ref()?;
        let default_label = self.default.as_str();
        let label = label.unwrap_or(&default_label);
        map.get(label)
    }
}

/// A loosely-typed bag of launch parameters keyed by [`RuntimeParameter::name`],
/// as supplied by the operator (dashboard form, CLI flags, or API call).
pub type ParamList = BTreeMap<String, ParamValue>;

/// Looks up `key` in `params`, falling back to `default` when absent.
pub fn param_i64(params: &ParamList, key: &str, default: i64) -> i64 {
    params.get(key).and_then(ParamValue::as_i64).unwrap_or(default)
}

pub fn param_f64(params: &ParamList, key: &str, default: f64) -> f64 {
    params.get(key).and_then(ParamValue::as_f64).unwrap_or(default)
}

pub fn param_bool(params: &ParamList, key: &str, default: bool) -> bool {
    params.get(key).and_then(ParamValue::as_bool).unwrap_or(default)
}

pub fn param_str<'a>(params: &'a ParamList, key: &str, default: &'a str) -> String {
    params
        .get(key)
        .map(ParamValue::as_str)
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_resolution_falls_back_to_default_label() {
        let mut map = BTreeMap::new();
        map.insert("4K".to_string(), ParamValue::Int(4096));
        map.insert("8K".to_string(), ParamValue::Int(8192));
        let param = RuntimeParameter::new(
            "context",
            "Context size",
            ParamType::Enum,
            ParamValue::Str("4K".to_string()),
        )
        .with_enum(map);

        assert_eq!(param.resolve_enum(None).unwrap().as_i64(), Some(4096));
        assert_eq!(param.resolve_enum(Some("8K")).unwrap().as_i64(), Some(8192));
    }
}
