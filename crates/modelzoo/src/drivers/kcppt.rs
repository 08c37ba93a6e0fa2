//! Shared checkpoint-JSON handling for drivers that accept the `kcppt`
//! format (KoboldCpp SD checkpoints, SDServer).

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// The subset of a `.kcppt` checkpoint file this crate cares about: the
/// diffusion model plus its optional companion assets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KcpptConfig {
    pub sdmodel: Option<String>,
    pub sdt5xxl: Option<String>,
    pub sdclipl: Option<String>,
    pub sdvae: Option<String>,
}

impl KcpptConfig {
    pub fn load(checkpoint_path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(checkpoint_path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// True when the checkpoint names a `sdmodel` — the signal the
    /// KoboldCpp driver uses to pick `a1111` over `openai` as the protocol.
    pub fn is_diffusion_checkpoint(&self) -> bool {
        self.sdmodel.is_some()
    }
}

/// Resolves a model asset reference (absolute path, or a URL/bare filename
/// to look up relative to the checkpoint's directory) to a usable path.
/// Returns `None` when nothing on disk matches.
pub fn resolve_asset_path(reference: &str, base_dir: &Path) -> Option<PathBuf> {
    if reference.is_empty() {
        return None;
    }

    let filename = reference
        .rsplit('/')
        .next()
        .unwrap_or(reference)
        .split('?')
        .next()
        .unwrap_or(reference);

    let as_absolute = Path::new(reference);
    if as_absolute.is_absolute() && as_absolute.exists() {
        return Some(as_absolute.to_path_buf());
    }

    let relative = base_dir.join(filename);
    if relative.exists() {
        return Some(relative);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reference_resolves_to_none() {
        assert!(resolve_asset_path("", Path::new("/tmp")).is_none());
    }

    #[test]
    fn missing_asset_resolves_to_none() {
        assert!(resolve_asset_path("definitely-not-there.safetensors", Path::new("/tmp")).is_none());
    }
}
