//! `rv run` and `rv produce`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rv_artifacts::{ArtifactStore, FsStore};
use rv_config::ResolvedSecrets;
use rv_contract::{EXIT_FAIL, EXIT_OK};
use rv_producer::{produce_from_payload, run_pipeline, ModuleOutcome, ModuleStatus};
use serde_json::Value;
use tracing::info;

use super::{load_pipeline, resolve_root};

fn describe(o: &ModuleOutcome) -> String {
    let mut s = format!("{} status={:?} records={}", o.module, o.status, o.record_count);
    if let Some(code) = &o.code {
        s.push_str(&format!(" code={code}"));
    }
    if let Some(msg) = &o.message {
        s.push_str(&format!(" message={msg}"));
    }
    s
}

/// Blocked modules fail the command; placeholders only warn.
fn report_outcome(o: &ModuleOutcome) -> bool {
    match o.status {
        ModuleStatus::Blocked => {
            eprintln!("FAIL: {}", describe(o));
            false
        }
        ModuleStatus::Placeholder => {
            eprintln!("WARN: {}", describe(o));
            true
        }
        ModuleStatus::Published | ModuleStatus::Unchanged => true,
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

pub async fn run(root: Option<&Path>, config_paths: &[String]) -> Result<i32> {
    let lp = load_pipeline(config_paths)?;
    let root = resolve_root(root, Some(&lp.cfg))?;
    let secrets = ResolvedSecrets::from_config(&lp.cfg);
    let store: Arc<dyn ArtifactStore> = Arc::new(FsStore::new(&root));
    info!(root = %root.display(), config_hash = %lp.loaded.config_hash, "run starting");

    let report = run_pipeline(&lp.cfg, store, &secrets, &lp.base_dir).await?;

    let mut ok = true;
    for o in &report.modules {
        ok &= report_outcome(o);
    }
    if !ok {
        return Ok(EXIT_FAIL);
    }
    println!(
        "OK: run {} config_hash={} published={} unchanged={} placeholders={}",
        report.run_id,
        lp.loaded.config_hash,
        report.count(ModuleStatus::Published),
        report.count(ModuleStatus::Unchanged),
        report.count(ModuleStatus::Placeholder),
    );
    Ok(EXIT_OK)
}

// ---------------------------------------------------------------------------
// produce
// ---------------------------------------------------------------------------

pub fn produce(root: Option<&Path>, config_paths: &[String], module: &str, input: &Path) -> Result<i32> {
    let lp = load_pipeline(config_paths)?;
    let root = resolve_root(root, Some(&lp.cfg))?;
    let store = FsStore::new(&root);

    let bytes = fs::read(input).with_context(|| format!("read input failed: {}", input.display()))?;
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
    let raw: Value = serde_json::from_slice(bytes)
        .with_context(|| format!("input must contain valid JSON: {}", input.display()))?;

    let outcome = produce_from_payload(&lp.cfg, module, raw, &store)?;
    if !report_outcome(&outcome) {
        return Ok(EXIT_FAIL);
    }
    println!(
        "OK: produce {} digest={}",
        describe(&outcome),
        outcome.digest.as_deref().unwrap_or("-")
    );
    Ok(EXIT_OK)
}
