//! `rv orphan scan|guard` and `rv retention`.

use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use rv_artifacts::FsStore;
use rv_contract::{EXIT_FAIL, EXIT_OK};
use rv_guard::{run_orphan_guard, run_retention, GuardMode};

use super::{load_pipeline, resolve_root};

pub fn orphan(root: Option<&Path>, mode: GuardMode) -> Result<i32> {
    let root = resolve_root(root, None)?;
    let store = FsStore::new(&root);
    let report = run_orphan_guard(&store, mode, Utc::now())?;

    for o in &report.orphans {
        eprintln!("WARN: orphan {:?} {}", o.kind, o.path);
    }
    if !report.passes() {
        for q in &report.quarantine_failures {
            eprintln!("FAIL: quarantine failed for {q}");
        }
        for d in &report.dangling_intents {
            eprintln!("FAIL: {} at {}: {}", d.code, d.path, d.description);
        }
        return Ok(EXIT_FAIL);
    }
    let mode_name = match mode {
        GuardMode::Scan => "scan",
        GuardMode::Guard => "guard",
    };
    println!(
        "OK: orphan {} orphans={} quarantined={}",
        mode_name,
        report.orphans.len(),
        report.quarantined.len()
    );
    Ok(EXIT_OK)
}

pub fn retention(root: Option<&Path>, config_paths: &[String]) -> Result<i32> {
    let lp = load_pipeline(config_paths)?;
    let root = resolve_root(root, Some(&lp.cfg))?;
    let store = FsStore::new(&root);

    let report = run_retention(&store, &lp.cfg.retention, Utc::now())?;
    println!(
        "OK: retention strategy={} removed_mirrors={} removed_drift_reports={}",
        report.policy.strategy, report.removed.mirrors, report.removed.drift_reports
    );
    Ok(EXIT_OK)
}
