use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The key every combined environment gets forced to, regardless of what
/// the constituent `Environment`s set, so that multi-GPU stacking
/// (`CUDA_VISIBLE_DEVICES`) always sees a stable PCI enumeration order.
pub const CUDA_DEVICE_ORDER_KEY: &str = "CUDA_DEVICE_ORDER";
pub const CUDA_DEVICE_ORDER_VALUE: &str = "PCI_BUS_ID";

/// A named bag of environment-variable key/value pairs, as configured by
/// the glue layer (e.g. one `Environment` per GPU, or per CUDA toolkit
/// version).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    pub vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new(name: impl Into<String>, vars: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            vars,
        }
    }
}

/// An ordered list of [`Environment`]s composed at launch time.
///
/// Combination rules:
/// - combined name = `+`-joined member names, or `"empty"` if none.
/// - combined vars = left-to-right merge; on key collision, values are
///   concatenated with a comma (required for stacking
///   `CUDA_VISIBLE_DEVICES`-style lists across environments).
/// - `CUDA_DEVICE_ORDER=PCI_BUS_ID` is always present in the result,
///   regardless of what the member environments declare.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentSet {
    pub environments: Vec<Environment>,
}

impl EnvironmentSet {
    pub fn new(environments: Vec<Environment>) -> Self {
        Self { environments }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn add(&mut self, environment: Environment) {
        self.environments.push(environment);
    }

    /// `+`-joined member names, or `"empty"` for an empty set.
    pub fn combined_name(&self) -> String {
        if self.environments.is_empty() {
            return "empty".to_string();
        }
        self.environments
            .iter()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>()
            .join("+")
    }

    /// Left-to-right merge of all member environments' vars, comma-joining
    /// on key collision, with `CUDA_DEVICE_ORDER` forced afterwards.
    pub fn combined_vars(&self) -> BTreeMap<String, String> {
        let mut combined: BTreeMap<String, String> = BTreeMap::new();
        for env in &self.environments {
            for (key, value) in &env.vars {
                combined
                    .entry(key.clone())
                    .and_modify(|existing| *existing = format!("{existing},{value}"))
                    .or_insert_with(|| value.clone());
            }
        }
        combined.insert(
            CUDA_DEVICE_ORDER_KEY.to_string(),
            CUDA_DEVICE_ORDER_VALUE.to_string(),
        );
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str, pairs: &[(&str, &str)]) -> Environment {
        Environment::new(
            name,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn empty_set_has_empty_name_and_forced_device_order() {
        let set = EnvironmentSet::empty();
        assert_eq!(set.combined_name(), "empty");
        let vars = set.combined_vars();
        assert_eq!(vars.get(CUDA_DEVICE_ORDER_KEY).unwrap(), "PCI_BUS_ID");
    }

    #[test]
    fn disjoint_keys_pass_through_unchanged() {
        let set = EnvironmentSet::new(vec![
            env("gpu0", &[("CUDA_VISIBLE_DEVICES", "0")]),
            env("quiet", &[("LLAMA_LOG", "0")]),
        ]);
        assert_eq!(set.combined_name(), "gpu0+quiet");
        let vars = set.combined_vars();
        assert_eq!(vars.get("CUDA_VISIBLE_DEVICES").unwrap(), "0");
        assert_eq!(vars.get("LLAMA_LOG").unwrap(), "0");
    }

    #[test]
    fn colliding_keys_are_comma_joined_in_order() {
        let set = EnvironmentSet::new(vec![
            env("gpu0", &[("CUDA_VISIBLE_DEVICES", "0")]),
            env("gpu1", &[("CUDA_VISIBLE_DEVICES", "1")]),
        ]);
        let vars = set.combined_vars();
        assert_eq!(vars.get("CUDA_VISIBLE_DEVICES").unwrap(), "0,1");
    }

    #[test]
    fn cuda_device_order_is_forced_even_if_member_sets_something_else() {
        let set = EnvironmentSet::new(vec![env(
            "weird",
            &[(CUDA_DEVICE_ORDER_KEY, "FASTEST_FIRST")],
        )]);
        let vars = set.combined_vars();
        assert_eq!(vars.get(CUDA_DEVICE_ORDER_KEY).unwrap(), "PCI_BUS_ID");
    }
}
