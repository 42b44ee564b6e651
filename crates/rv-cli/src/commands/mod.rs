//! Command handler modules for the `rv` binary.
//!
//! Shared utilities used by multiple command paths live here.
//! Each handler returns the process exit code; `OK:` lines go to stdout,
//! `FAIL:` / `NOT GREEN:` / `WARN:` lines to stderr.

pub mod health;
pub mod housekeeping;
pub mod run;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use rv_config::{report_unused_keys, LoadedConfig, PipelineConfig, UnusedKeyPolicy};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub struct LoadedPipeline {
    pub loaded: LoadedConfig,
    pub cfg: PipelineConfig,
    /// Directory relative file-provider paths resolve against.
    pub base_dir: PathBuf,
}

/// Load layered config files, warn about unused keys, and build the typed view.
pub fn load_pipeline(config_paths: &[String]) -> Result<LoadedPipeline> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = rv_config::load_layered_yaml(&path_refs)?;

    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        eprintln!(
            "WARN: CONFIG_UNUSED_KEYS unused_leaf_keys={}",
            report.unused_leaf_pointers.len()
        );
        for p in report.unused_leaf_pointers.iter().take(50) {
            eprintln!("  unused={}", p);
        }
        let extra = report.unused_leaf_pointers.len().saturating_sub(50);
        if extra > 0 {
            eprintln!("  ... and {} more", extra);
        }
    }

    let cfg = loaded.pipeline()?;
    let base_dir = config_paths
        .first()
        .and_then(|p| Path::new(p).parent())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(LoadedPipeline {
        loaded,
        cfg,
        base_dir,
    })
}

/// `--root` / `RV_ARTIFACT_ROOT` first, then the config's `artifact_root`.
pub fn resolve_root(root: Option<&Path>, cfg: Option<&PipelineConfig>) -> Result<PathBuf> {
    if let Some(r) = root {
        return Ok(r.to_path_buf());
    }
    if let Some(r) = cfg.and_then(|c| c.artifact_root.as_ref()) {
        return Ok(r.clone());
    }
    bail!("artifact root not set: pass --root, set RV_ARTIFACT_ROOT, or set artifact_root in config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_root_wins_over_config() {
        let cfg = PipelineConfig::from_json(&serde_json::json!({"artifact_root": "/srv/public"})).unwrap();
        let r = resolve_root(Some(Path::new("/tmp/x")), Some(&cfg)).unwrap();
        assert_eq!(r, PathBuf::from("/tmp/x"));
        let r = resolve_root(None, Some(&cfg)).unwrap();
        assert_eq!(r, PathBuf::from("/srv/public"));
        assert!(resolve_root(None, None).is_err());
    }
}
