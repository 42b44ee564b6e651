//! `rv aggregate`, `rv envelope-check` and `rv gate`.

use std::io;
use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use rv_artifacts::{layout, FsStore};
use rv_contract::{EXIT_FAIL, EXIT_OK};
use rv_gate::{emit_gate, gate_health};
use rv_health::{
    aggregate as build_aggregate, run_envelope_check, write_aggregate, AggregateArgs,
    EnvelopeCheckArgs, EnvelopeIssue, RowRegistry,
};

use super::{load_pipeline, resolve_root};

// ---------------------------------------------------------------------------
// aggregate
// ---------------------------------------------------------------------------

pub fn aggregate(root: Option<&Path>, config_paths: &[String]) -> Result<i32> {
    let lp = load_pipeline(config_paths)?;
    let root = resolve_root(root, Some(&lp.cfg))?;
    let store = FsStore::new(&root);

    let agg = build_aggregate(AggregateArgs {
        store: &store,
        modules: &lp.cfg.modules,
        schema_version: &lp.cfg.schema_version,
        now: Utc::now(),
    })?;
    write_aggregate(&store, &agg)?;

    let s = &agg.health.summary;
    println!(
        "OK: aggregate status={:?} modules={} ok={} stale={} stub={} error={} critical_ok={}",
        agg.health.status, s.modules_total, s.ok, s.stale, s.stub, s.error, s.critical_ok
    );
    Ok(EXIT_OK)
}

// ---------------------------------------------------------------------------
// envelope-check
// ---------------------------------------------------------------------------

pub struct EnvelopeOpts<'a> {
    pub root: Option<&'a Path>,
    pub config_paths: &'a [String],
    pub mirrors: Option<&'a str>,
    pub strict: bool,
    pub max_critical: usize,
}

fn describe_issue(i: &EnvelopeIssue) -> String {
    let mut s = format!("{}: {} status={}", i.file, i.problem, i.status.as_deref().unwrap_or("-"));
    if let Some(n) = i.items_count {
        s.push_str(&format!(" items={n}"));
    }
    if let Some(e) = &i.error {
        s.push_str(&format!(" error={e}"));
    }
    s
}

pub fn envelope_check(opts: EnvelopeOpts<'_>) -> Result<i32> {
    let cfg = if opts.config_paths.is_empty() {
        None
    } else {
        Some(load_pipeline(opts.config_paths)?.cfg)
    };
    let root = resolve_root(opts.root, cfg.as_ref())?;
    let store = FsStore::new(&root);
    let registry = cfg
        .as_ref()
        .map(|c| RowRegistry::from_modules(&c.modules))
        .unwrap_or_default();
    let mirrors_dir = opts
        .mirrors
        .map(str::to_string)
        .or_else(|| cfg.as_ref().map(|c| c.retention.mirrors_dir.clone()))
        .unwrap_or_else(|| layout::MIRRORS_DIR.to_string());

    let report = run_envelope_check(EnvelopeCheckArgs {
        store: &store,
        mirrors_dir: &mirrors_dir,
        registry: &registry,
        strict: opts.strict,
        max_critical: opts.max_critical,
        now: Utc::now(),
    })?;

    for w in &report.warnings {
        eprintln!("WARN: {}", describe_issue(w));
    }
    if report.passes() {
        for f in &report.failures {
            eprintln!("WARN: {}", describe_issue(f));
        }
        println!(
            "OK: envelope check mirrors={} failures={} warnings={}",
            report.total_mirrors, report.failures_count, report.warnings_count
        );
        return Ok(EXIT_OK);
    }
    for f in &report.failures {
        eprintln!("FAIL: {}", describe_issue(f));
    }
    Ok(EXIT_FAIL)
}

// ---------------------------------------------------------------------------
// gate
// ---------------------------------------------------------------------------

pub fn gate(root: Option<&Path>, config_paths: &[String], strict: bool) -> Result<i32> {
    let lp = load_pipeline(config_paths)?;
    let root = resolve_root(root, Some(&lp.cfg))?;
    let store = FsStore::new(&root);

    let result = gate_health(&store, &lp.cfg.severity)?;
    Ok(emit_gate(&result, strict, &mut io::stdout(), &mut io::stderr())?)
}
